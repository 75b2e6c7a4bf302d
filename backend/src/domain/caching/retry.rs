//! Retry/backoff client for the cache backend.
//!
//! Explicit composition rather than decoration: components hold a
//! `RetryingCache` and call its methods, which internally apply bounded
//! retries with exponential backoff to connectivity-class failures. Command
//! errors are surfaced immediately. Nothing else in the crate talks to the
//! backend directly.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{error, warn};

use crate::domain::caching::CacheKey;
use crate::domain::ports::{CacheBackend, CacheBackendError};

/// Attempts per operation, the first one included.
pub const MAX_ATTEMPTS: u32 = 3;

/// Backoff before retry `n` is `BASE_BACKOFF * 2^n`.
pub const BASE_BACKOFF: Duration = Duration::from_millis(100);

/// Cache client applying the retry/backoff policy to every operation.
#[derive(Clone)]
pub struct RetryingCache {
    backend: Arc<dyn CacheBackend>,
}

impl RetryingCache {
    /// Wrap a backend with the retry policy.
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self { backend }
    }

    async fn run<T, F, Fut>(&self, op: &'static str, mut attempt_fn: F) -> Result<T, CacheBackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CacheBackendError>>,
    {
        let mut attempt = 0;
        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                    let backoff = BASE_BACKOFF * 2_u32.pow(attempt);
                    warn!(
                        op,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "cache operation failed; retrying"
                    );
                    time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        error!(
                            op,
                            attempts = MAX_ATTEMPTS,
                            error = %err,
                            "cache operation failed after retries"
                        );
                    } else {
                        error!(op, error = %err, "cache operation failed");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Read a string value.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheBackendError> {
        self.run("get", || self.backend.get(key)).await
    }

    /// Write a string value with an expiry.
    pub async fn set_with_ttl(
        &self,
        key: &CacheKey,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        self.run("set_with_ttl", || self.backend.set_with_ttl(key, value, ttl))
            .await
    }

    /// Delete the given keys.
    pub async fn delete(&self, keys: &[CacheKey]) -> Result<(), CacheBackendError> {
        self.run("delete", || self.backend.delete(keys)).await
    }

    /// Set one hash field.
    pub async fn hash_set(
        &self,
        key: &CacheKey,
        field: &str,
        value: &str,
    ) -> Result<(), CacheBackendError> {
        self.run("hash_set", || self.backend.hash_set(key, field, value))
            .await
    }

    /// Set one hash field and refresh the hash TTL atomically.
    pub async fn hash_set_with_expiry(
        &self,
        key: &CacheKey,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        self.run("hash_set_with_expiry", || {
            self.backend.hash_set_with_expiry(key, field, value, ttl)
        })
        .await
    }

    /// Read all fields of a hash.
    pub async fn hash_get_all(
        &self,
        key: &CacheKey,
    ) -> Result<HashMap<String, String>, CacheBackendError> {
        self.run("hash_get_all", || self.backend.hash_get_all(key))
            .await
    }

    /// Remove hash fields as one batched operation.
    pub async fn hash_delete(
        &self,
        key: &CacheKey,
        fields: &[String],
    ) -> Result<(), CacheBackendError> {
        self.run("hash_delete", || self.backend.hash_delete(key, fields))
            .await
    }

    /// Refresh a key's expiry.
    pub async fn expire(&self, key: &CacheKey, ttl: Duration) -> Result<(), CacheBackendError> {
        self.run("expire", || self.backend.expire(key, ttl)).await
    }

    /// List keys matching a glob-style pattern.
    pub async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheBackendError> {
        self.run("keys_matching", || self.backend.keys_matching(pattern))
            .await
    }

    /// Probe backend liveness, retrying like any other operation.
    pub async fn check_health(&self) -> bool {
        self.run("ping", || self.backend.ping()).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RoomId;
    use crate::domain::caching::keys;
    use crate::domain::ports::{CacheBackend, FixtureCacheBackend};
    use rstest::rstest;
    use std::sync::Arc;

    fn harness() -> (Arc<FixtureCacheBackend>, RetryingCache) {
        let backend = Arc::new(FixtureCacheBackend::new());
        let cache = RetryingCache::new(backend.clone());
        (backend, cache)
    }

    fn key() -> CacheKey {
        keys::drawing_key(&RoomId::new("r1").expect("valid room id"))
    }

    #[rstest]
    #[tokio::test]
    async fn recovers_when_backend_heals_within_three_attempts() {
        let (backend, cache) = harness();
        backend
            .set_with_ttl(&key(), "v", Duration::from_secs(60))
            .await
            .expect("seed value");
        backend.fail_for_next(2);

        let value = cache.get(&key()).await.expect("third attempt succeeds");
        assert_eq!(value, Some("v".to_owned()));
        // Seed write plus three read attempts.
        assert_eq!(backend.operations(), 4);
    }

    #[rstest]
    #[tokio::test]
    async fn surfaces_the_terminal_connectivity_error_after_three_attempts() {
        let (backend, cache) = harness();
        backend.fail_for_next(5);

        let err = cache.get(&key()).await.expect_err("all attempts fail");
        assert!(err.is_retryable());
        assert_eq!(backend.operations(), 3);
    }

    #[rstest]
    #[tokio::test]
    async fn command_errors_are_not_retried() {
        let (backend, cache) = harness();
        backend
            .set_with_ttl(&key(), "v", Duration::from_secs(60))
            .await
            .expect("seed value");
        let before = backend.operations();

        let err = cache
            .hash_set(&key(), "f", "v")
            .await
            .expect_err("wrong type surfaces");
        assert!(!err.is_retryable());
        assert_eq!(backend.operations(), before + 1);
    }

    #[rstest]
    #[tokio::test]
    async fn health_check_reports_after_bounded_probing() {
        let (backend, cache) = harness();
        assert!(cache.check_health().await);

        backend.fail_for_next(3);
        assert!(!cache.check_health().await);

        backend.fail_for_next(1);
        assert!(cache.check_health().await);
    }
}
