//! Room drawings endpoint.
//!
//! Cache-first read of a room's stroke history for late joiners and page
//! reloads. Unrecoverable failures come back as an empty list plus an error
//! string in the body rather than an error status, so a flaky backend never
//! blanks the client's board with an exception page.

use actix_web::{HttpResponse, get, web};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{RoomId, StrokePath};

use super::state::HttpState;

/// Response body for the room drawings endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct DrawingsResponse {
    /// Ordered stroke paths for the room.
    #[schema(value_type = Vec<Object>)]
    pub drawings: Vec<StrokePath>,
    /// Present when the history could not be loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Return a room's ordered stroke history.
#[utoipa::path(
    get,
    path = "/rooms/{room_id}/drawings",
    params(
        ("room_id" = String, Path, description = "Room identifier")
    ),
    responses(
        (status = 200, description = "Stroke history, possibly with an error note", body = DrawingsResponse)
    ),
    tags = ["rooms"],
    operation_id = "getRoomDrawings"
)]
#[get("/rooms/{room_id}/drawings")]
pub async fn room_drawings(state: web::Data<HttpState>, path: web::Path<String>) -> HttpResponse {
    let room = match RoomId::new(path.into_inner()) {
        Ok(room) => room,
        Err(err) => {
            return HttpResponse::Ok().json(DrawingsResponse {
                drawings: Vec::new(),
                error: Some(err.to_string()),
            });
        }
    };

    let (drawings, error) = state.service.room_drawings(&room).await;
    HttpResponse::Ok().json(DrawingsResponse { drawings, error })
}
