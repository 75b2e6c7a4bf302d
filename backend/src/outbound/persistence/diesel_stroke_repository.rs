//! PostgreSQL-backed `StrokeRepository` implementation using Diesel ORM.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use crate::domain::ports::{StrokeRepository, StrokeRepositoryError};
use crate::domain::{RoomId, StrokeRecord};

use super::models::{NewRoomRow, NewStrokeRow, StrokeRow};
use super::pool::{DbPool, PoolError};
use super::schema::{rooms, strokes};

/// Diesel-backed implementation of the stroke repository port.
#[derive(Clone)]
pub struct DieselStrokeRepository {
    pool: DbPool,
}

impl DieselStrokeRepository {
    /// Create a new repository over the given connection pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Map pool errors to domain repository errors.
fn map_pool_error(error: PoolError) -> StrokeRepositoryError {
    let message = match error {
        PoolError::Checkout { message } | PoolError::Build { message } => message,
    };
    StrokeRepositoryError::connection(message)
}

/// Map Diesel errors to domain repository errors.
fn map_diesel_error(error: diesel::result::Error) -> StrokeRepositoryError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        other => debug!(error = %other, "diesel operation failed"),
    }

    match error {
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            StrokeRepositoryError::connection("database connection error")
        }
        DieselError::NotFound => StrokeRepositoryError::query("record not found"),
        _ => StrokeRepositoryError::query("database error"),
    }
}

#[async_trait]
impl StrokeRepository for DieselStrokeRepository {
    async fn create_room_if_absent(&self, room: &RoomId) -> Result<(), StrokeRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(rooms::table)
            .values(&NewRoomRow { id: room.as_str() })
            .on_conflict(rooms::id)
            .do_update()
            .set(rooms::last_active.eq(diesel::dsl::now))
            .execute(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_diesel_error)
    }

    async fn append_stroke(
        &self,
        room: &RoomId,
        payload: &str,
    ) -> Result<i64, StrokeRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::insert_into(strokes::table)
            .values(&NewStrokeRow {
                room_id: room.as_str(),
                payload,
            })
            .returning(strokes::id)
            .get_result::<i64>(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn list_strokes(
        &self,
        room: &RoomId,
    ) -> Result<Vec<StrokeRecord>, StrokeRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let records = strokes::table
            .filter(strokes::room_id.eq(room.as_str()))
            .order(strokes::id.asc())
            .select(StrokeRow::as_select())
            .load::<StrokeRow>(&mut conn)
            .await
            .map_err(map_diesel_error)?;

        Ok(records
            .into_iter()
            .map(|row| StrokeRecord {
                id: row.id,
                payload: row.payload,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn delete_all_strokes(&self, room: &RoomId) -> Result<u64, StrokeRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        diesel::delete(strokes::table.filter(strokes::room_id.eq(room.as_str())))
            .execute(&mut conn)
            .await
            .map(|removed| removed as u64)
            .map_err(map_diesel_error)
    }
}
