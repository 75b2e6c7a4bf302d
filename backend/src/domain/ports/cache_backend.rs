//! Port interface for the key-value cache backend.
//!
//! The backend is a Redis-shaped store: per-key expiry, hash substructures,
//! pattern listing, and an atomic multi-op submission used by the presence
//! upsert. It is reachable over a network connection that may transiently
//! fail, so the error type distinguishes the connectivity class (retryable)
//! from command failures (surfaced immediately).

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::caching::CacheKey;

/// Errors surfaced by the cache backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheBackendError {
    /// The backend could not be reached or timed out; safe to retry.
    #[error("cache backend unreachable: {message}")]
    Unreachable { message: String },

    /// The backend rejected the command; retrying will not help.
    #[error("cache command failed: {message}")]
    Command { message: String },
}

impl CacheBackendError {
    /// Create a connectivity-class error with the given message.
    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    /// Create a command error with the given message.
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Whether the retry wrapper should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// Key-value cache operations consumed by the coordination layer.
///
/// Callers never use this trait directly; every call goes through
/// [`RetryingCache`](crate::domain::caching::RetryingCache), which owns the
/// retry/backoff policy.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a string value; `None` on absent or expired keys.
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheBackendError>;

    /// Write a string value with an expiry.
    async fn set_with_ttl(
        &self,
        key: &CacheKey,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError>;

    /// Delete the given keys; missing keys are not an error.
    async fn delete(&self, keys: &[CacheKey]) -> Result<(), CacheBackendError>;

    /// Set one field in a hash, creating the hash if absent.
    async fn hash_set(
        &self,
        key: &CacheKey,
        field: &str,
        value: &str,
    ) -> Result<(), CacheBackendError>;

    /// Set one field in a hash and refresh the hash's expiry as one atomic
    /// unit, so the hash cannot expire between the field write and the TTL
    /// bump.
    async fn hash_set_with_expiry(
        &self,
        key: &CacheKey,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError>;

    /// Read all fields of a hash; empty map on absent or expired keys.
    async fn hash_get_all(
        &self,
        key: &CacheKey,
    ) -> Result<HashMap<String, String>, CacheBackendError>;

    /// Remove the given fields from a hash as one batched operation.
    async fn hash_delete(&self, key: &CacheKey, fields: &[String])
    -> Result<(), CacheBackendError>;

    /// Refresh a key's expiry; a no-op on missing keys.
    async fn expire(&self, key: &CacheKey, ttl: Duration) -> Result<(), CacheBackendError>;

    /// List keys matching a glob-style pattern (`*` wildcards).
    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheBackendError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), CacheBackendError>;
}

#[derive(Debug, Clone)]
struct FixtureEntry {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Default)]
struct FixtureHash {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct FixtureState {
    strings: HashMap<String, FixtureEntry>,
    hashes: HashMap<String, FixtureHash>,
}

/// In-memory cache backend for tests.
///
/// Supports the full port surface plus two test controls: a virtual clock
/// (`advance`) so TTL expiry can be observed without sleeping, and failure
/// injection (`fail_for_next`) so retry and degradation paths can be driven
/// deterministically.
#[derive(Debug, Default)]
pub struct FixtureCacheBackend {
    state: Mutex<FixtureState>,
    clock_skew_ms: AtomicU64,
    outage_remaining: AtomicUsize,
    operations: AtomicUsize,
}

impl FixtureCacheBackend {
    /// Create an empty fixture backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the fixture's clock forward, expiring entries whose TTL elapsed.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.clock_skew_ms.fetch_add(millis, Ordering::SeqCst);
    }

    /// Make the next `count` operations fail with a connectivity error.
    pub fn fail_for_next(&self, count: usize) {
        self.outage_remaining.store(count, Ordering::SeqCst);
    }

    /// Total operations attempted against the backend, failed ones included.
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    fn now(&self) -> Instant {
        Instant::now() + Duration::from_millis(self.clock_skew_ms.load(Ordering::SeqCst))
    }

    fn check_outage(&self) -> Result<(), CacheBackendError> {
        self.operations.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outage_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            });
        match outcome {
            Ok(_) => Err(CacheBackendError::unreachable("injected outage")),
            Err(_) => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FixtureState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn purge_expired(state: &mut FixtureState, now: Instant) {
        state.strings.retain(|_, entry| entry.expires_at > now);
        state
            .hashes
            .retain(|_, hash| hash.expires_at.is_none_or(|at| at > now));
    }
}

/// Match a redis-style glob pattern supporting `*` wildcards.
fn glob_matches(pattern: &str, candidate: &str) -> bool {
    fn matches(pattern: &[u8], candidate: &[u8]) -> bool {
        match (pattern.split_first(), candidate.split_first()) {
            (None, None) => true,
            (Some((&b'*', rest)), _) => {
                matches(rest, candidate)
                    || !candidate.is_empty() && matches(pattern, &candidate[1..])
            }
            (Some((p, p_rest)), Some((c, c_rest))) if p == c => matches(p_rest, c_rest),
            _ => false,
        }
    }
    matches(pattern.as_bytes(), candidate.as_bytes())
}

#[async_trait]
impl CacheBackend for FixtureCacheBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheBackendError> {
        self.check_outage()?;
        let now = self.now();
        let mut state = self.lock();
        Self::purge_expired(&mut state, now);
        Ok(state.strings.get(key.as_str()).map(|e| e.value.clone()))
    }

    async fn set_with_ttl(
        &self,
        key: &CacheKey,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        self.check_outage()?;
        let expires_at = self.now() + ttl;
        let mut state = self.lock();
        state.strings.insert(
            key.as_str().to_owned(),
            FixtureEntry {
                value: value.to_owned(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[CacheKey]) -> Result<(), CacheBackendError> {
        self.check_outage()?;
        let mut state = self.lock();
        for key in keys {
            state.strings.remove(key.as_str());
            state.hashes.remove(key.as_str());
        }
        Ok(())
    }

    async fn hash_set(
        &self,
        key: &CacheKey,
        field: &str,
        value: &str,
    ) -> Result<(), CacheBackendError> {
        self.check_outage()?;
        let now = self.now();
        let mut state = self.lock();
        Self::purge_expired(&mut state, now);
        if state.strings.contains_key(key.as_str()) {
            return Err(CacheBackendError::command(
                "WRONGTYPE operation against a key holding the wrong kind of value",
            ));
        }
        state
            .hashes
            .entry(key.as_str().to_owned())
            .or_default()
            .fields
            .insert(field.to_owned(), value.to_owned());
        Ok(())
    }

    async fn hash_set_with_expiry(
        &self,
        key: &CacheKey,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        self.check_outage()?;
        let now = self.now();
        let mut state = self.lock();
        Self::purge_expired(&mut state, now);
        let hash = state.hashes.entry(key.as_str().to_owned()).or_default();
        hash.fields.insert(field.to_owned(), value.to_owned());
        hash.expires_at = Some(now + ttl);
        Ok(())
    }

    async fn hash_get_all(
        &self,
        key: &CacheKey,
    ) -> Result<HashMap<String, String>, CacheBackendError> {
        self.check_outage()?;
        let now = self.now();
        let mut state = self.lock();
        Self::purge_expired(&mut state, now);
        Ok(state
            .hashes
            .get(key.as_str())
            .map(|hash| hash.fields.clone())
            .unwrap_or_default())
    }

    async fn hash_delete(
        &self,
        key: &CacheKey,
        fields: &[String],
    ) -> Result<(), CacheBackendError> {
        self.check_outage()?;
        let mut state = self.lock();
        if let Some(hash) = state.hashes.get_mut(key.as_str()) {
            for field in fields {
                hash.fields.remove(field);
            }
        }
        Ok(())
    }

    async fn expire(&self, key: &CacheKey, ttl: Duration) -> Result<(), CacheBackendError> {
        self.check_outage()?;
        let expires_at = self.now() + ttl;
        let mut state = self.lock();
        if let Some(entry) = state.strings.get_mut(key.as_str()) {
            entry.expires_at = expires_at;
        }
        if let Some(hash) = state.hashes.get_mut(key.as_str()) {
            hash.expires_at = Some(expires_at);
        }
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> Result<Vec<String>, CacheBackendError> {
        self.check_outage()?;
        let now = self.now();
        let mut state = self.lock();
        Self::purge_expired(&mut state, now);
        let mut keys: Vec<String> = state
            .strings
            .keys()
            .chain(state.hashes.keys())
            .filter(|key| glob_matches(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<(), CacheBackendError> {
        self.check_outage()?;
        Ok(())
    }
}
