//! TTL-based participant presence per room.
//!
//! Presence is the cross-process, best-effort view of who is in a room; the
//! in-memory live-membership registry stays authoritative for broadcast
//! targeting. Records live in one hash per room whose TTL is refreshed
//! atomically with every upsert, and a cleanup sweep piggy-backs on each
//! write rather than running on a timer.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::domain::caching::{PRESENCE_TTL, keys};
use crate::domain::ports::CacheBackendError;
use crate::domain::{DisplayName, ParticipantId, PresenceRecord, RoomId};

/// Per-room participant presence tracker.
#[derive(Clone)]
pub struct PresenceTracker {
    cache: super::RetryingCache,
}

impl PresenceTracker {
    pub fn new(cache: super::RetryingCache) -> Self {
        Self { cache }
    }

    /// Upsert one participant's presence and refresh the room hash's TTL as
    /// one atomic unit, then opportunistically sweep stale entries.
    pub async fn record_presence(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        display_name: &DisplayName,
        joined_at: DateTime<Utc>,
    ) -> Result<(), CacheBackendError> {
        let record = PresenceRecord {
            display_name: display_name.to_string(),
            joined_at: Some(joined_at),
            last_seen: Some(Utc::now()),
        };
        let raw = serde_json::to_string(&record)
            .map_err(|err| CacheBackendError::command(format!("serialize presence: {err}")))?;

        self.cache
            .hash_set_with_expiry(
                &keys::presence_key(room),
                &participant.to_string(),
                &raw,
                PRESENCE_TTL,
            )
            .await?;
        debug!(room = %room, participant = %participant, "presence recorded");

        // Piggy-backed sweep; presence writes are frequent enough that
        // staleness bounded by inter-join intervals is tolerable.
        if let Err(err) = self.cleanup(room).await {
            warn!(room = %room, error = %err, "presence cleanup failed");
        }
        Ok(())
    }

    /// Return every parseable presence record for a room, keyed by
    /// participant id. Unparseable values are omitted, never fatal.
    pub async fn list_active(
        &self,
        room: &RoomId,
    ) -> Result<HashMap<String, PresenceRecord>, CacheBackendError> {
        let fields = self.cache.hash_get_all(&keys::presence_key(room)).await?;
        let mut active = HashMap::with_capacity(fields.len());
        for (participant, raw) in fields {
            match serde_json::from_str::<PresenceRecord>(&raw) {
                Ok(record) => {
                    active.insert(participant, record);
                }
                Err(err) => warn!(
                    room = %room,
                    participant = %participant,
                    error = %err,
                    "omitting unparseable presence record"
                ),
            }
        }
        Ok(active)
    }

    /// Remove every record older than the presence timeout in one batched
    /// delete. Records without a usable `last_seen` (missing, malformed, or
    /// the whole value unparseable) are maximally stale and get purged
    /// rather than retained indefinitely.
    pub async fn cleanup(&self, room: &RoomId) -> Result<usize, CacheBackendError> {
        let now = Utc::now();
        let timeout =
            TimeDelta::seconds(i64::try_from(PRESENCE_TTL.as_secs()).unwrap_or(i64::MAX));

        let fields = self.cache.hash_get_all(&keys::presence_key(room)).await?;
        let stale: Vec<String> = fields
            .into_iter()
            .filter(|(_, raw)| {
                let last_seen = serde_json::from_str::<PresenceRecord>(raw)
                    .ok()
                    .and_then(|record| record.last_seen)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                now.signed_duration_since(last_seen) > timeout
            })
            .map(|(participant, _)| participant)
            .collect();

        if stale.is_empty() {
            return Ok(0);
        }
        self.cache
            .hash_delete(&keys::presence_key(room), &stale)
            .await?;
        debug!(room = %room, purged = stale.len(), "purged stale presence records");
        Ok(stale.len())
    }
}
