//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match the migrations under `migrations/` exactly;
//! regenerate with `diesel print-schema` after schema changes.

diesel::table! {
    /// Collaboration rooms, created lazily on first reference.
    rooms (id) {
        /// Opaque room identifier (max 64 characters).
        id -> Varchar,
        /// Row creation timestamp.
        created_at -> Timestamptz,
        /// Last time the room was referenced.
        last_active -> Timestamptz,
    }
}

diesel::table! {
    /// Append-only stroke history per room.
    strokes (id) {
        /// Monotonically assigned stroke id.
        id -> Int8,
        /// Owning room.
        room_id -> Varchar,
        /// Serialized path payload, opaque to the backend.
        payload -> Text,
        /// Row creation timestamp.
        created_at -> Timestamptz,
    }
}

diesel::joinable!(strokes -> rooms (room_id));
diesel::allow_tables_to_appear_in_same_query!(rooms, strokes);
