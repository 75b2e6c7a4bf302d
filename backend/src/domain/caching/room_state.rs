//! Ephemeral room state cache.
//!
//! Pure overwrite semantics: every update replaces the whole snapshot for a
//! room. No read-modify-write is attempted, so two near-simultaneous writers
//! can clobber each other; the value is advisory, display-only data and the
//! lost update is acceptable.

use tracing::debug;

use crate::domain::RoomId;
use crate::domain::RoomStateSnapshot;
use crate::domain::caching::{ROOM_STATE_TTL, keys};
use crate::domain::ports::CacheBackendError;

/// Cache of derived room metadata with no durable backing.
#[derive(Clone)]
pub struct RoomStateCache {
    cache: super::RetryingCache,
}

impl RoomStateCache {
    pub fn new(cache: super::RetryingCache) -> Self {
        Self { cache }
    }

    /// Overwrite a room's state snapshot, refreshing the 24-hour TTL.
    pub async fn set(
        &self,
        room: &RoomId,
        state: &RoomStateSnapshot,
    ) -> Result<(), CacheBackendError> {
        let raw = serde_json::to_string(state)
            .map_err(|err| CacheBackendError::command(format!("serialize room state: {err}")))?;
        self.cache
            .set_with_ttl(&keys::room_state_key(room), &raw, ROOM_STATE_TTL)
            .await?;
        debug!(room = %room, user_count = state.user_count, "room state cached");
        Ok(())
    }

    /// Read a room's last snapshot; `None` means "unknown", not "empty".
    pub async fn get(&self, room: &RoomId) -> Result<Option<RoomStateSnapshot>, CacheBackendError> {
        let Some(raw) = self.cache.get(&keys::room_state_key(room)).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                debug!(room = %room, error = %err, "discarding malformed room state snapshot");
                Ok(None)
            }
        }
    }
}
