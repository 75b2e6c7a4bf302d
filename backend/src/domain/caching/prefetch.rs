//! Access-pattern-driven cache warming.
//!
//! Every drawing-cache read bumps a per-room access counter; rooms joined
//! often enough get their stroke history proactively re-read from the store
//! and rewritten into the cache, warm and fresh, even when the cache already
//! holds valid data. Losing the counter or failing a prefetch costs only a
//! missed optimisation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::RoomId;
use crate::domain::caching::{ACCESS_PATTERN_TTL, PREFETCH_THRESHOLD, keys};
use crate::domain::ports::StrokeRepository;

use super::drawing::{decode_stroke_paths, jittered_drawing_ttl};

/// Cached access heuristic for one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessPattern {
    last_access: DateTime<Utc>,
    access_count: u64,
}

/// Tracks room access frequency and warms the drawing cache past a
/// threshold.
#[derive(Clone)]
pub struct Prefetcher {
    cache: super::RetryingCache,
    strokes: Arc<dyn StrokeRepository>,
}

impl Prefetcher {
    pub fn new(cache: super::RetryingCache, strokes: Arc<dyn StrokeRepository>) -> Self {
        Self { cache, strokes }
    }

    /// Bump the room's access counter and refresh its TTL. Best-effort: a
    /// racing or failed update loses at worst one increment.
    pub async fn record_access(&self, room: &RoomId) {
        let count = self.access_count(room).await;
        let pattern = AccessPattern {
            last_access: Utc::now(),
            access_count: count + 1,
        };
        let raw = match serde_json::to_string(&pattern) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(room = %room, error = %err, "failed to serialize access pattern");
                return;
            }
        };
        if let Err(err) = self
            .cache
            .set_with_ttl(&keys::access_pattern_key(room), &raw, ACCESS_PATTERN_TTL)
            .await
        {
            warn!(room = %room, error = %err, "failed to update access pattern");
        }
    }

    /// Warm the drawing cache from the store when the room is accessed
    /// frequently enough. Failure is logged and otherwise ignored; this is
    /// an optimisation, never a correctness path.
    pub async fn maybe_prefetch(&self, room: &RoomId) {
        let count = self.access_count(room).await;
        if count <= PREFETCH_THRESHOLD {
            return;
        }
        info!(room = %room, access_count = count, "prefetching frequently accessed room");

        let records = match self.strokes.list_strokes(room).await {
            Ok(records) => records,
            Err(err) => {
                warn!(room = %room, error = %err, "prefetch store read failed");
                return;
            }
        };
        let paths = decode_stroke_paths(room, &records);
        let raw = match serde_json::to_string(&paths) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(room = %room, error = %err, "failed to serialize prefetched drawings");
                return;
            }
        };
        match self
            .cache
            .set_with_ttl(&keys::drawing_key(room), &raw, jittered_drawing_ttl())
            .await
        {
            Ok(()) => info!(room = %room, strokes = paths.len(), "prefetched room drawings"),
            Err(err) => warn!(room = %room, error = %err, "failed to warm drawing cache"),
        }
    }

    async fn access_count(&self, room: &RoomId) -> u64 {
        match self.cache.get(&keys::access_pattern_key(room)).await {
            Ok(Some(raw)) => match serde_json::from_str::<AccessPattern>(&raw) {
                Ok(pattern) => pattern.access_count,
                Err(err) => {
                    debug!(room = %room, error = %err, "resetting malformed access pattern");
                    0
                }
            },
            Ok(None) => 0,
            Err(err) => {
                debug!(room = %room, error = %err, "access pattern unavailable");
                0
            }
        }
    }
}
