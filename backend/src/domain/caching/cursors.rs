//! Very-short-TTL cursor position cache.
//!
//! One key per (room, participant) with a TTL shorter than any plausible
//! update interval during active dragging, so a cursor that stops moving
//! blinks out on its own without an explicit leave signal. Writes are
//! ambient, best-effort data: never worth erroring the caller over.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::caching::{CURSOR_TTL, CacheKey, keys};
use crate::domain::ports::CacheBackendError;
use crate::domain::{CursorRecord, ParticipantId, RoomId};

/// Cursor position broadcaster backed by expiring cache keys.
#[derive(Clone)]
pub struct CursorBroadcaster {
    cache: super::RetryingCache,
}

impl CursorBroadcaster {
    pub fn new(cache: super::RetryingCache) -> Self {
        Self { cache }
    }

    /// Record one participant's cursor position.
    ///
    /// Skipped entirely when the backend is unreachable; the position will
    /// be superseded by the next move within the TTL window anyway.
    pub async fn record(&self, room: &RoomId, participant: &ParticipantId, record: &CursorRecord) {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(room = %room, error = %err, "failed to serialize cursor position");
                return;
            }
        };
        if let Err(err) = self
            .cache
            .set_with_ttl(&keys::cursor_key(room, participant), &raw, CURSOR_TTL)
            .await
        {
            debug!(
                room = %room,
                participant = %participant,
                error = %err,
                "skipping cursor position write"
            );
        }
    }

    /// List every live cursor in a room, keyed by participant id.
    ///
    /// Keys that vanish mid-scan (TTL races) and unparseable values are
    /// skipped.
    pub async fn list_cursors(
        &self,
        room: &RoomId,
    ) -> Result<HashMap<String, CursorRecord>, CacheBackendError> {
        let cursor_keys = self.cache.keys_matching(&keys::cursor_pattern(room)).await?;
        let mut positions = HashMap::with_capacity(cursor_keys.len());

        for key in cursor_keys {
            let Some(participant) = keys::participant_from_cursor_key(&key, room) else {
                continue;
            };
            let participant = participant.to_owned();
            match self.cache.get(&CacheKey::from_raw(key)).await {
                Ok(Some(raw)) => match serde_json::from_str::<CursorRecord>(&raw) {
                    Ok(record) => {
                        positions.insert(participant, record);
                    }
                    Err(err) => warn!(
                        room = %room,
                        participant = %participant,
                        error = %err,
                        "omitting unparseable cursor record"
                    ),
                },
                Ok(None) => {}
                Err(err) => warn!(room = %room, error = %err, "cursor read failed mid-scan"),
            }
        }
        Ok(positions)
    }
}
