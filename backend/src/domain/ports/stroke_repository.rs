//! Port interface for the durable stroke store.
//!
//! The durable store is the source of truth for a room's stroke history: the
//! caches hold derived, disposable copies and are allowed to be transiently
//! short, but the store is never allowed to be wrong.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{RoomId, StrokeRecord};

/// Errors surfaced by the stroke repository.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StrokeRepositoryError {
    /// The store could not be reached.
    #[error("stroke store unavailable: {message}")]
    Connection { message: String },

    /// The store rejected or failed the operation.
    #[error("stroke store error: {message}")]
    Query { message: String },
}

impl StrokeRepositoryError {
    /// Create a connection error with the given message.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a query error with the given message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }
}

/// Durable room and stroke operations consumed by the coordination layer.
#[async_trait]
pub trait StrokeRepository: Send + Sync {
    /// Ensure a room row exists, refreshing its last-active time.
    async fn create_room_if_absent(&self, room: &RoomId) -> Result<(), StrokeRepositoryError>;

    /// Append one stroke to a room's history and return its assigned id.
    async fn append_stroke(
        &self,
        room: &RoomId,
        payload: &str,
    ) -> Result<i64, StrokeRepositoryError>;

    /// List a room's strokes in creation order.
    async fn list_strokes(&self, room: &RoomId) -> Result<Vec<StrokeRecord>, StrokeRepositoryError>;

    /// Delete every stroke for a room, returning how many were removed.
    async fn delete_all_strokes(&self, room: &RoomId) -> Result<u64, StrokeRepositoryError>;
}

/// In-memory stroke repository for tests and database-less development runs.
///
/// Ids are assigned from one monotonically increasing counter shared across
/// rooms, matching the durable schema's sequence behaviour. `fail_for_next`
/// injects connection errors to drive degradation paths.
#[derive(Debug, Default)]
pub struct FixtureStrokeRepository {
    rooms: Mutex<HashMap<String, Vec<StrokeRecord>>>,
    next_id: AtomicI64,
    outage_remaining: AtomicUsize,
}

impl FixtureStrokeRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with a connection error.
    pub fn fail_for_next(&self, count: usize) {
        self.outage_remaining.store(count, Ordering::SeqCst);
    }

    fn check_outage(&self) -> Result<(), StrokeRepositoryError> {
        let outcome = self
            .outage_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            });
        match outcome {
            Ok(_) => Err(StrokeRepositoryError::connection("injected outage")),
            Err(_) => Ok(()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<StrokeRecord>>> {
        self.rooms
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[async_trait]
impl StrokeRepository for FixtureStrokeRepository {
    async fn create_room_if_absent(&self, room: &RoomId) -> Result<(), StrokeRepositoryError> {
        self.check_outage()?;
        self.lock().entry(room.as_str().to_owned()).or_default();
        Ok(())
    }

    async fn append_stroke(
        &self,
        room: &RoomId,
        payload: &str,
    ) -> Result<i64, StrokeRepositoryError> {
        self.check_outage()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.lock()
            .entry(room.as_str().to_owned())
            .or_default()
            .push(StrokeRecord {
                id,
                payload: payload.to_owned(),
                created_at: Utc::now(),
            });
        Ok(id)
    }

    async fn list_strokes(
        &self,
        room: &RoomId,
    ) -> Result<Vec<StrokeRecord>, StrokeRepositoryError> {
        self.check_outage()?;
        Ok(self.lock().get(room.as_str()).cloned().unwrap_or_default())
    }

    async fn delete_all_strokes(&self, room: &RoomId) -> Result<u64, StrokeRepositoryError> {
        self.check_outage()?;
        let mut rooms = self.lock();
        let removed = rooms
            .get_mut(room.as_str())
            .map(|strokes| {
                let count = strokes.len();
                strokes.clear();
                count
            })
            .unwrap_or(0);
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn room(id: &str) -> RoomId {
        RoomId::new(id).expect("valid room id")
    }

    #[rstest]
    #[tokio::test]
    async fn strokes_list_in_append_order() {
        let repo = FixtureStrokeRepository::new();
        for payload in ["a", "b", "c"] {
            repo.append_stroke(&room("r1"), payload)
                .await
                .expect("append succeeds");
        }

        let strokes = repo.list_strokes(&room("r1")).await.expect("list succeeds");
        let payloads: Vec<&str> = strokes.iter().map(|s| s.payload.as_str()).collect();
        assert_eq!(payloads, ["a", "b", "c"]);
        assert!(strokes.windows(2).all(|pair| pair[0].id < pair[1].id));
    }

    #[rstest]
    #[tokio::test]
    async fn delete_reports_removed_count_and_empties_room() {
        let repo = FixtureStrokeRepository::new();
        repo.append_stroke(&room("r1"), "a").await.expect("append");
        repo.append_stroke(&room("r1"), "b").await.expect("append");
        repo.append_stroke(&room("r2"), "x").await.expect("append");

        let removed = repo
            .delete_all_strokes(&room("r1"))
            .await
            .expect("delete succeeds");
        assert_eq!(removed, 2);
        assert!(
            repo.list_strokes(&room("r1"))
                .await
                .expect("list succeeds")
                .is_empty()
        );
        assert_eq!(
            repo.list_strokes(&room("r2"))
                .await
                .expect("list succeeds")
                .len(),
            1
        );
    }

    #[rstest]
    #[tokio::test]
    async fn injected_outage_surfaces_connection_errors() {
        let repo = FixtureStrokeRepository::new();
        repo.fail_for_next(1);

        let err = repo
            .append_stroke(&room("r1"), "a")
            .await
            .expect_err("outage surfaces");
        assert!(matches!(err, StrokeRepositoryError::Connection { .. }));
        assert!(repo.append_stroke(&room("r1"), "a").await.is_ok());
    }
}
