//! Shared WebSocket adapter state.

use std::sync::Arc;

use crate::domain::collab::CollabService;

/// Dependency bundle for the WebSocket entry point.
#[derive(Clone)]
pub struct WsState {
    pub service: Arc<CollabService>,
}

impl WsState {
    /// Construct state over the protocol service.
    pub fn new(service: Arc<CollabService>) -> Self {
        Self { service }
    }
}
