//! Health endpoint for orchestration and monitoring.
//!
//! Reports degraded (503) when the cache backend stops answering pings; the
//! service keeps running against the durable store either way, so this is a
//! signal, not a gate.

use actix_web::{HttpResponse, get, web};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::state::HttpState;

/// Response body for the health endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `degraded`.
    #[schema(value_type = String)]
    pub status: &'static str,
    /// Cache backend connectivity: `connected` or `disconnected`.
    #[schema(value_type = String)]
    pub cache: &'static str,
    /// When the probe ran.
    pub timestamp: DateTime<Utc>,
}

/// Probe the cache backend and report overall service health.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Cache backend reachable", body = HealthResponse),
        (status = 503, description = "Cache backend unreachable; running degraded", body = HealthResponse)
    ),
    tags = ["health"],
    operation_id = "healthCheck"
)]
#[get("/health")]
pub async fn health(state: web::Data<HttpState>) -> HttpResponse {
    let cache_up = state.service.cache_healthy().await;
    let body = HealthResponse {
        status: if cache_up { "healthy" } else { "degraded" },
        cache: if cache_up { "connected" } else { "disconnected" },
        timestamp: Utc::now(),
    };
    if cache_up {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
