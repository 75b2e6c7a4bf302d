//! Internal Diesel row structs for database operations.
//!
//! Implementation details of the persistence layer; never exposed to the
//! domain.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{rooms, strokes};

/// Row struct for reading from the strokes table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = strokes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct StrokeRow {
    pub id: i64,
    pub payload: String,
    pub created_at: DateTime<Utc>,
}

/// Insertable struct for appending strokes.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = strokes)]
pub(crate) struct NewStrokeRow<'a> {
    pub room_id: &'a str,
    pub payload: &'a str,
}

/// Insertable struct for lazily creating rooms.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = rooms)]
pub(crate) struct NewRoomRow<'a> {
    pub id: &'a str,
}
