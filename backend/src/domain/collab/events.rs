//! Wire-level event types for the room broadcast protocol.
//!
//! Inbound events arrive as JSON frames tagged by `event`; outbound events
//! use the same envelope. Field names follow the client convention
//! (camelCase), event names stay snake_case.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::domain::{PresenceRecord, RoomId, StrokePath};

/// Events received from a connected client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// Enter a room, optionally under a display name.
    Join {
        room: RoomId,
        #[serde(default)]
        user_name: Option<String>,
    },
    /// Add one stroke to the room's board.
    Draw { room: RoomId, path: StrokePath },
    /// Relay a client-side undo to the rest of the room.
    Undo {
        room: RoomId,
        #[serde(default)]
        object_data: Option<serde_json::Value>,
    },
    /// Relay a client-side redo to the rest of the room.
    Redo {
        room: RoomId,
        #[serde(default)]
        object_data: Option<serde_json::Value>,
    },
    /// Report the sender's cursor position.
    CursorMove {
        room: RoomId,
        user_name: String,
        x: f64,
        y: f64,
    },
    /// Report the sender's viewport rectangle.
    ViewportUpdate {
        room: RoomId,
        viewport: serde_json::Value,
    },
    /// Wipe the room's board.
    Clear { room: RoomId },
}

/// Events sent to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Someone joined; `users` carries the presence snapshot when the
    /// caching steps succeeded, and is omitted on the degraded path.
    UserJoined {
        count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        users: Option<HashMap<String, PresenceRecord>>,
    },
    /// Someone left; `count` is the remaining live membership.
    UserLeft { count: usize },
    /// A stroke was added by another participant.
    DrawUpdate { room: RoomId, path: StrokePath },
    /// Another participant undid a step.
    UndoUpdate {
        room: RoomId,
        object_data: Option<serde_json::Value>,
    },
    /// Another participant redid a step.
    RedoUpdate {
        room: RoomId,
        object_data: Option<serde_json::Value>,
    },
    /// Another participant moved their cursor.
    CursorUpdate {
        room: RoomId,
        user_name: String,
        x: f64,
        y: f64,
    },
    /// Another participant changed their viewport.
    ViewportUpdate {
        room: RoomId,
        viewport: serde_json::Value,
    },
    /// The board was wiped by another participant.
    ClearBoard { room: RoomId },
    /// Requester-only failure notice.
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    fn join_parses_with_and_without_a_name() {
        let with_name: ClientEvent =
            serde_json::from_value(json!({"event": "join", "room": "r1", "userName": "Ada"}))
                .expect("join parses");
        assert_eq!(
            with_name,
            ClientEvent::Join {
                room: RoomId::new("r1").expect("valid room id"),
                user_name: Some("Ada".into()),
            }
        );

        let anonymous: ClientEvent = serde_json::from_value(json!({"event": "join", "room": "r1"}))
            .expect("nameless join parses");
        assert!(matches!(anonymous, ClientEvent::Join { user_name: None, .. }));
    }

    #[rstest]
    fn invalid_room_ids_fail_event_parsing() {
        let result = serde_json::from_value::<ClientEvent>(
            json!({"event": "join", "room": "not a room id"}),
        );
        assert!(result.is_err());
    }

    #[rstest]
    fn cursor_move_uses_camel_case_fields() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "cursor_move",
            "room": "r1",
            "userName": "Ada",
            "x": 10.5,
            "y": -3.0,
        }))
        .expect("cursor move parses");
        assert!(matches!(event, ClientEvent::CursorMove { x, .. } if x == 10.5));
    }

    #[rstest]
    fn user_joined_omits_users_on_the_degraded_path() {
        let degraded = serde_json::to_value(ServerEvent::UserJoined {
            count: 2,
            users: None,
        })
        .expect("serializes");
        assert_eq!(degraded, json!({"event": "user_joined", "count": 2}));
    }

    #[rstest]
    fn outbound_events_keep_the_wire_field_names() {
        let undo = serde_json::to_value(ServerEvent::UndoUpdate {
            room: RoomId::new("r1").expect("valid room id"),
            object_data: Some(json!({"id": 7})),
        })
        .expect("serializes");
        assert_eq!(
            undo,
            json!({"event": "undo_update", "room": "r1", "objectData": {"id": 7}})
        );

        let left = serde_json::to_value(ServerEvent::UserLeft { count: 1 }).expect("serializes");
        assert_eq!(left, json!({"event": "user_left", "count": 1}));
    }
}
