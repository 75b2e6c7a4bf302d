//! Shared HTTP adapter state.

use std::sync::Arc;

use crate::domain::collab::CollabService;

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub service: Arc<CollabService>,
}

impl HttpState {
    /// Construct state over the protocol service.
    pub fn new(service: Arc<CollabService>) -> Self {
        Self { service }
    }
}
