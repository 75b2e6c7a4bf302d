//! Read-through/write-through cache of a room's ordered stroke list.
//!
//! Durability before visibility: the store write always happens first, and
//! every cache step afterwards is best-effort. A failed or racing cache
//! update can leave the cached list transiently short; the next read miss
//! repopulates wholesale from the store, which never loses data.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::domain::caching::{DRAWING_CACHE_TTL, WriteOutcome, keys};
use crate::domain::ports::{StrokeRepository, StrokeRepositoryError};
use crate::domain::{RoomId, StrokePath, StrokeRecord};

use super::prefetch::Prefetcher;

/// Upper bound of the random jitter added to the drawing-cache TTL so that
/// entries warmed in one burst do not expire in one burst.
const TTL_JITTER_SECS: u64 = 60;

pub(crate) fn jittered_drawing_ttl() -> Duration {
    let jitter = SmallRng::from_entropy().gen_range(0..=TTL_JITTER_SECS);
    DRAWING_CACHE_TTL + Duration::from_secs(jitter)
}

/// Decode stored stroke payloads, skipping records that fail to parse.
///
/// A single corrupt row must never poison a whole room's history.
pub(crate) fn decode_stroke_paths(room: &RoomId, records: &[StrokeRecord]) -> Vec<StrokePath> {
    let mut paths = Vec::with_capacity(records.len());
    for record in records {
        match serde_json::from_str::<StrokePath>(&record.payload) {
            Ok(path) => paths.push(path),
            Err(err) => warn!(
                room = %room,
                stroke_id = record.id,
                error = %err,
                "skipping stroke with malformed payload"
            ),
        }
    }
    paths
}

/// The drawing cache: serves reads cache-first and keeps the cached list in
/// step with appends where it cheaply can.
#[derive(Clone)]
pub struct DrawingCache {
    cache: super::RetryingCache,
    strokes: Arc<dyn StrokeRepository>,
    prefetcher: Prefetcher,
}

impl DrawingCache {
    /// Assemble the cache over its collaborators.
    pub fn new(
        cache: super::RetryingCache,
        strokes: Arc<dyn StrokeRepository>,
        prefetcher: Prefetcher,
    ) -> Self {
        Self {
            cache,
            strokes,
            prefetcher,
        }
    }

    /// Return a room's ordered stroke list, populating the cache on a miss.
    ///
    /// Only a store failure is an error; any cache trouble falls back to a
    /// direct store read.
    pub async fn room_drawings(
        &self,
        room: &RoomId,
    ) -> Result<Vec<StrokePath>, StrokeRepositoryError> {
        self.prefetcher.record_access(room).await;

        let key = keys::drawing_key(room);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<StrokePath>>(&raw) {
                Ok(paths) => {
                    debug!(room = %room, strokes = paths.len(), "drawing cache hit");
                    return Ok(paths);
                }
                Err(err) => {
                    warn!(room = %room, error = %err, "cached drawing list malformed; repopulating");
                }
            },
            Ok(None) => debug!(room = %room, "drawing cache miss"),
            Err(err) => {
                warn!(room = %room, error = %err, "drawing cache read failed; falling back to store");
            }
        }

        let records = self.strokes.list_strokes(room).await?;
        let paths = decode_stroke_paths(room, &records);

        match serde_json::to_string(&paths) {
            Ok(raw) => {
                if let Err(err) = self
                    .cache
                    .set_with_ttl(&key, &raw, jittered_drawing_ttl())
                    .await
                {
                    warn!(room = %room, error = %err, "failed to populate drawing cache");
                }
            }
            Err(err) => warn!(room = %room, error = %err, "failed to serialize drawing list"),
        }

        Ok(paths)
    }

    /// Persist one stroke, then append it to the cached list if one exists.
    ///
    /// Returns `Degraded` when the store write succeeded but a cache step
    /// failed; the caller must still broadcast, since the store remains
    /// authoritative and the cache self-heals on the next read miss.
    pub async fn append(
        &self,
        room: &RoomId,
        path: &StrokePath,
    ) -> Result<WriteOutcome, StrokeRepositoryError> {
        let payload = path
            .to_payload()
            .map_err(|err| StrokeRepositoryError::query(format!("serialize stroke: {err}")))?;
        let id = self.strokes.append_stroke(room, &payload).await?;
        debug!(room = %room, stroke_id = id, "stroke persisted");

        let key = keys::drawing_key(room);
        let outcome = match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<StrokePath>>(&raw) {
                Ok(mut paths) => {
                    paths.push(path.clone());
                    self.store_list(room, &key, &paths).await
                }
                Err(err) => {
                    warn!(room = %room, error = %err, "cached drawing list malformed; skipping append");
                    WriteOutcome::Degraded
                }
            },
            // Cold cache: leave it cold and let the next read repopulate the
            // full list, rather than caching a list of one.
            Ok(None) => WriteOutcome::Clean,
            Err(err) => {
                warn!(room = %room, error = %err, "drawing cache update failed after stroke persist");
                WriteOutcome::Degraded
            }
        };

        Ok(outcome)
    }

    /// Delete the cached list and every durable stroke for a room.
    ///
    /// The two deletes are independent: a cache failure only degrades (the
    /// next read-path repopulation will be empty anyway), while a store
    /// failure is a hard error for the caller to surface.
    pub async fn clear(&self, room: &RoomId) -> Result<WriteOutcome, StrokeRepositoryError> {
        let mut outcome = WriteOutcome::Clean;
        if let Err(err) = self.cache.delete(&[keys::drawing_key(room)]).await {
            warn!(room = %room, error = %err, "failed to invalidate drawing cache");
            outcome = WriteOutcome::Degraded;
        }

        let removed = self.strokes.delete_all_strokes(room).await?;
        info!(room = %room, removed, "cleared room drawings");
        Ok(outcome)
    }

    async fn store_list(
        &self,
        room: &RoomId,
        key: &keys::CacheKey,
        paths: &[StrokePath],
    ) -> WriteOutcome {
        let raw = match serde_json::to_string(paths) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(room = %room, error = %err, "failed to serialize drawing list");
                return WriteOutcome::Degraded;
            }
        };
        match self
            .cache
            .set_with_ttl(key, &raw, jittered_drawing_ttl())
            .await
        {
            Ok(()) => WriteOutcome::Clean,
            Err(err) => {
                warn!(room = %room, error = %err, "failed to refresh drawing cache");
                WriteOutcome::Degraded
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::caching::RetryingCache;
    use crate::domain::ports::{FixtureCacheBackend, FixtureStrokeRepository, StrokeRepository};
    use rstest::rstest;
    use serde_json::json;

    struct Harness {
        backend: Arc<FixtureCacheBackend>,
        strokes: Arc<FixtureStrokeRepository>,
        drawings: DrawingCache,
    }

    fn harness() -> Harness {
        let backend = Arc::new(FixtureCacheBackend::new());
        let strokes = Arc::new(FixtureStrokeRepository::new());
        let cache = RetryingCache::new(backend.clone());
        let prefetcher = Prefetcher::new(cache.clone(), strokes.clone());
        Harness {
            backend,
            strokes: strokes.clone(),
            drawings: DrawingCache::new(cache, strokes, prefetcher),
        }
    }

    fn room(id: &str) -> RoomId {
        RoomId::new(id).expect("valid room id")
    }

    fn path(n: u64) -> StrokePath {
        StrokePath::from(json!({"points": [n]}))
    }

    #[rstest]
    #[tokio::test]
    async fn reads_return_appends_in_call_order() {
        let h = harness();
        for n in 0..5 {
            let outcome = h
                .drawings
                .append(&room("r1"), &path(n))
                .await
                .expect("append succeeds");
            assert_eq!(outcome, WriteOutcome::Clean);
            // Interleave reads so both hit and miss paths are exercised.
            let drawings = h
                .drawings
                .room_drawings(&room("r1"))
                .await
                .expect("read succeeds");
            assert_eq!(drawings.len(), usize::try_from(n).expect("small") + 1);
        }

        let drawings = h
            .drawings
            .room_drawings(&room("r1"))
            .await
            .expect("read succeeds");
        assert_eq!(drawings, (0..5).map(path).collect::<Vec<_>>());
    }

    #[rstest]
    #[tokio::test]
    async fn repeated_reads_without_writes_are_idempotent() {
        let h = harness();
        h.drawings
            .append(&room("r1"), &path(1))
            .await
            .expect("append succeeds");

        let first = h
            .drawings
            .room_drawings(&room("r1"))
            .await
            .expect("read succeeds");
        let second = h
            .drawings
            .room_drawings(&room("r1"))
            .await
            .expect("read succeeds");
        assert_eq!(first, second);
    }

    #[rstest]
    #[tokio::test]
    async fn warm_cache_serves_reads_without_the_store() {
        let h = harness();
        h.drawings
            .append(&room("r1"), &path(1))
            .await
            .expect("append succeeds");
        h.drawings
            .room_drawings(&room("r1"))
            .await
            .expect("warming read succeeds");

        // A store outage no longer affects warm reads.
        h.strokes.fail_for_next(10);
        let drawings = h
            .drawings
            .room_drawings(&room("r1"))
            .await
            .expect("cache hit bypasses the store");
        assert_eq!(drawings, vec![path(1)]);
    }

    #[rstest]
    #[tokio::test]
    async fn malformed_store_records_are_skipped_not_fatal() {
        let h = harness();
        h.strokes
            .append_stroke(&room("r1"), "{\"points\":[1]}")
            .await
            .expect("append succeeds");
        h.strokes
            .append_stroke(&room("r1"), "{not json")
            .await
            .expect("append succeeds");
        h.strokes
            .append_stroke(&room("r1"), "{\"points\":[3]}")
            .await
            .expect("append succeeds");

        let drawings = h
            .drawings
            .room_drawings(&room("r1"))
            .await
            .expect("read succeeds");
        assert_eq!(drawings.len(), 2);
    }

    #[rstest]
    #[tokio::test]
    async fn append_is_degraded_when_cache_is_unreachable() {
        let h = harness();
        // Warm the cache first so the append path reaches the read step.
        h.drawings
            .append(&room("r1"), &path(1))
            .await
            .expect("append succeeds");
        h.drawings
            .room_drawings(&room("r1"))
            .await
            .expect("warming read succeeds");

        h.backend.fail_for_next(100);
        let outcome = h
            .drawings
            .append(&room("r1"), &path(2))
            .await
            .expect("store write still succeeds");
        assert_eq!(outcome, WriteOutcome::Degraded);

        // The store kept both strokes despite the cache outage.
        assert_eq!(
            h.strokes
                .list_strokes(&room("r1"))
                .await
                .expect("list succeeds")
                .len(),
            2
        );
    }

    #[rstest]
    #[tokio::test]
    async fn clear_then_read_returns_an_empty_fresh_sequence() {
        let h = harness();
        for n in 0..3 {
            h.drawings
                .append(&room("r1"), &path(n))
                .await
                .expect("append succeeds");
        }
        h.drawings
            .room_drawings(&room("r1"))
            .await
            .expect("warming read succeeds");

        let outcome = h.drawings.clear(&room("r1")).await.expect("clear succeeds");
        assert_eq!(outcome, WriteOutcome::Clean);
        assert!(
            h.drawings
                .room_drawings(&room("r1"))
                .await
                .expect("read succeeds")
                .is_empty()
        );

        // A subsequent draw starts a fresh visible sequence.
        h.drawings
            .append(&room("r1"), &path(9))
            .await
            .expect("append succeeds");
        assert_eq!(
            h.drawings
                .room_drawings(&room("r1"))
                .await
                .expect("read succeeds"),
            vec![path(9)]
        );
    }

    #[rstest]
    #[tokio::test]
    async fn clear_surfaces_store_failure() {
        let h = harness();
        h.drawings
            .append(&room("r1"), &path(1))
            .await
            .expect("append succeeds");

        h.strokes.fail_for_next(1);
        let err = h
            .drawings
            .clear(&room("r1"))
            .await
            .expect_err("store delete failure surfaces");
        assert!(matches!(err, StrokeRepositoryError::Connection { .. }));
    }
}
