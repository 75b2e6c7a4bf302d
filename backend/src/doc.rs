//! OpenAPI documentation configuration.
//!
//! Registers the REST surface (room drawings, health probe) and its response
//! schemas. The WebSocket protocol is not part of the OpenAPI document; only
//! the HTTP endpoints are covered.

use utoipa::OpenApi;

use crate::inbound::http::drawings::DrawingsResponse;
use crate::inbound::http::health::HealthResponse;

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Inkboard backend API",
        description = "HTTP interface for room stroke history and health probes."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::drawings::room_drawings,
        crate::inbound::http::health::health,
    ),
    components(schemas(DrawingsResponse, HealthResponse))
)]
pub struct ApiDoc;
