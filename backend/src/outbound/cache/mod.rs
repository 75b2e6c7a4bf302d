//! Redis adapter for the `CacheBackend` port.
//!
//! Uses `bb8-redis` for connection pooling. Every command is bounded by a
//! short timeout so a wedged backend degrades into a connectivity error the
//! retry wrapper understands instead of hanging a handler. The presence
//! upsert uses an atomic `MULTI`/`EXEC` pipeline so the field write and the
//! TTL refresh land together.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::{self, AsyncCommands};
use bb8_redis::{RedisConnectionManager, bb8};

use crate::domain::caching::CacheKey;
use crate::domain::ports::{CacheBackend, CacheBackendError};

/// Per-command network timeout; also bounds pool checkout.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);

/// Classify a redis error into the port's connectivity/command split.
fn map_redis_error(error: &redis::RedisError) -> CacheBackendError {
    if error.is_io_error()
        || error.is_timeout()
        || error.is_connection_refusal()
        || error.is_connection_dropped()
    {
        CacheBackendError::unreachable(error.to_string())
    } else {
        CacheBackendError::command(error.to_string())
    }
}

/// Connection-pooled Redis implementation of the cache backend port.
#[derive(Clone)]
pub struct RedisCacheBackend {
    pool: bb8::Pool<RedisConnectionManager>,
}

impl RedisCacheBackend {
    /// Build a lazily connecting pool against the given Redis URL.
    ///
    /// Connections are established on first use, so a cache outage at boot
    /// only degrades the service instead of failing startup.
    pub fn new(url: &str, max_connections: u32) -> Result<Self, CacheBackendError> {
        let manager = RedisConnectionManager::new(url)
            .map_err(|err| CacheBackendError::command(format!("invalid redis url: {err}")))?;
        let pool = bb8::Pool::builder()
            .max_size(max_connections)
            .connection_timeout(COMMAND_TIMEOUT)
            .build_unchecked(manager);
        Ok(Self { pool })
    }

    async fn conn(
        &self,
    ) -> Result<bb8::PooledConnection<'_, RedisConnectionManager>, CacheBackendError> {
        match self.pool.get().await {
            Ok(conn) => Ok(conn),
            Err(bb8::RunError::User(err)) => Err(map_redis_error(&err)),
            Err(bb8::RunError::TimedOut) => Err(CacheBackendError::unreachable(
                "connection pool checkout timed out",
            )),
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, CacheBackendError> {
        match tokio::time::timeout(COMMAND_TIMEOUT, fut).await {
            Ok(result) => result.map_err(|err| map_redis_error(&err)),
            Err(_) => Err(CacheBackendError::unreachable("cache command timed out")),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisCacheBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheBackendError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = self.bounded(conn.get(key.as_str())).await?;
        Ok(value)
    }

    async fn set_with_ttl(
        &self,
        key: &CacheKey,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        let mut conn = self.conn().await?;
        let () = self
            .bounded(conn.set_ex(key.as_str(), value, ttl.as_secs().max(1)))
            .await?;
        Ok(())
    }

    async fn delete(&self, keys: &[CacheKey]) -> Result<(), CacheBackendError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let raw: Vec<&str> = keys.iter().map(CacheKey::as_str).collect();
        let () = self.bounded(conn.del(raw)).await?;
        Ok(())
    }

    async fn hash_set(
        &self,
        key: &CacheKey,
        field: &str,
        value: &str,
    ) -> Result<(), CacheBackendError> {
        let mut conn = self.conn().await?;
        let () = self.bounded(conn.hset(key.as_str(), field, value)).await?;
        Ok(())
    }

    async fn hash_set_with_expiry(
        &self,
        key: &CacheKey,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(key.as_str(), field, value)
            .ignore()
            .expire(key.as_str(), i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX))
            .ignore();
        let () = self.bounded(pipe.query_async(&mut *conn)).await?;
        Ok(())
    }

    async fn hash_get_all(
        &self,
        key: &CacheKey,
    ) -> Result<HashMap<String, String>, CacheBackendError> {
        let mut conn = self.conn().await?;
        let fields: HashMap<String, String> = self.bounded(conn.hgetall(key.as_str())).await?;
        Ok(fields)
    }

    async fn hash_delete(
        &self,
        key: &CacheKey,
        fields: &[String],
    ) -> Result<(), CacheBackendError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let () = self
            .bounded(conn.hdel(key.as_str(), fields.to_vec()))
            .await?;
        Ok(())
    }

    async fn expire(&self, key: &CacheKey, ttl: Duration) -> Result<(), CacheBackendError> {
        let mut conn = self.conn().await?;
        let () = self
            .bounded(conn.expire(
                key.as_str(),
                i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            ))
            .await?;
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheBackendError> {
        let mut conn = self.conn().await?;
        let keys: Vec<String> = self.bounded(conn.keys(pattern)).await?;
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), CacheBackendError> {
        let mut conn = self.conn().await?;
        let pong: String = self.bounded(redis::cmd("PING").query_async(&mut *conn)).await?;
        if pong == "PONG" {
            Ok(())
        } else {
            Err(CacheBackendError::command(format!(
                "unexpected ping reply: {pong}"
            )))
        }
    }
}
