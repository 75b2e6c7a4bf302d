//! Server wiring: adapter selection and actix-web app assembly.

pub mod config;

use std::sync::Arc;

use actix_web::web;

use crate::domain::collab::CollabService;
use crate::inbound::http::{drawings, health, state::HttpState};
use crate::inbound::ws::{self, state::WsState};

pub use config::AppConfig;

/// Register every endpoint and its state on an actix-web app.
///
/// Shared between `main` and the in-process test harnesses so both run the
/// same routing table.
pub fn configure_app(
    service: Arc<CollabService>,
) -> impl FnOnce(&mut web::ServiceConfig) + Clone {
    move |cfg: &mut web::ServiceConfig| {
        cfg.app_data(web::Data::new(HttpState::new(service.clone())))
            .app_data(web::Data::new(WsState::new(service.clone())))
            .service(drawings::room_drawings)
            .service(health::health)
            .service(ws::ws_entry);
    }
}
