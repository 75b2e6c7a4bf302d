//! WebSocket inbound adapter bridging client frames to the room protocol.
//!
//! Responsibilities:
//! - upgrade requests into per-connection sessions
//! - keep WebSocket-specific concerns at the edge of the system

use actix_web::web::{self, Payload};
use actix_web::{HttpRequest, HttpResponse, get, rt};
use tracing::error;

mod session;

pub mod state;

/// Handle WebSocket upgrade for the `/ws` endpoint.
#[get("/ws")]
pub async fn ws_entry(
    state: web::Data<state::WsState>,
    req: HttpRequest,
    body: Payload,
) -> actix_web::Result<HttpResponse> {
    let (response, session, stream) = actix_ws::handle(&req, body).map_err(|err| {
        error!(error = %err, "WebSocket upgrade failed");
        err
    })?;
    rt::spawn(session::handle_ws_session(
        state.service.clone(),
        session,
        stream,
    ));
    Ok(response)
}
