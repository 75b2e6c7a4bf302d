//! Room broadcast protocol: event types, live-membership registry, and the
//! protocol service tying the caches and the store together.

mod events;
mod registry;
mod service;

pub use events::{ClientEvent, ServerEvent};
pub use registry::{BroadcastScope, ConnectionHandle, RoomRegistry};
pub use service::CollabService;
