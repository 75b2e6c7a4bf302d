//! Domain layer: value types, ports, the cache coordination components, and
//! the room broadcast protocol.

pub mod caching;
pub mod collab;
pub mod ports;
mod room;

pub use room::{
    CursorRecord, DisplayName, ParticipantId, PresenceRecord, RoomId, RoomIdError,
    RoomStateSnapshot, StrokePath, StrokeRecord,
};
