//! Inkboard backend: the cache-and-broadcast coordination layer behind a
//! collaborative drawing surface, plus its HTTP/WebSocket edges and the
//! Redis/PostgreSQL adapters.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod server;

/// Public OpenAPI surface used by tooling.
pub use doc::ApiDoc;
