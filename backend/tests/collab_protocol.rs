//! End-to-end protocol scenarios over the fixture ports: join/draw/clear
//! flows, broadcast scoping, and behaviour while the cache backend is down.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use backend::domain::caching::keys;
use backend::domain::collab::{ClientEvent, CollabService, ConnectionHandle, ServerEvent};
use backend::domain::ports::{
    CacheBackend, FixtureCacheBackend, FixtureStrokeRepository, StrokeRepository,
};
use backend::domain::{ParticipantId, PresenceRecord, RoomId, StrokePath};

struct Bench {
    backend: Arc<FixtureCacheBackend>,
    strokes: Arc<FixtureStrokeRepository>,
    service: Arc<CollabService>,
}

fn bench() -> Bench {
    let backend = Arc::new(FixtureCacheBackend::new());
    let strokes = Arc::new(FixtureStrokeRepository::new());
    let service = Arc::new(CollabService::new(backend.clone(), strokes.clone()));
    Bench {
        backend,
        strokes,
        service,
    }
}

struct Client {
    id: ParticipantId,
    handle: ConnectionHandle,
    rx: mpsc::UnboundedReceiver<ServerEvent>,
}

impl Client {
    fn connect() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            id: ParticipantId::generate(),
            handle: ConnectionHandle::new(tx),
            rx,
        }
    }

    fn drain(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

fn room(id: &str) -> RoomId {
    RoomId::new(id).expect("valid room id")
}

async fn join(bench: &Bench, client: &Client, room_id: &str, name: &str) {
    bench
        .service
        .handle_event(
            &client.id,
            &client.handle,
            ClientEvent::Join {
                room: room(room_id),
                user_name: Some(name.to_owned()),
            },
        )
        .await;
}

fn joined_count(event: &ServerEvent) -> Option<usize> {
    match event {
        ServerEvent::UserJoined { count, .. } => Some(*count),
        _ => None,
    }
}

fn joined_users(event: &ServerEvent) -> Option<&HashMap<String, PresenceRecord>> {
    match event {
        ServerEvent::UserJoined { users, .. } => users.as_ref(),
        _ => None,
    }
}

#[tokio::test]
async fn two_participants_share_a_room() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();

    // A joins: broadcast to the whole room, the joiner included.
    join(&bench, &a, "r1", "Alice").await;
    let events = a.drain();
    assert_eq!(events.len(), 1);
    assert_eq!(joined_count(&events[0]), Some(1));
    let users = joined_users(&events[0]).expect("presence snapshot attached");
    assert!(users.contains_key(&a.id.to_string()));

    // B joins: both see the new count and B appears in the snapshot.
    join(&bench, &b, "r1", "Bob").await;
    let a_events = a.drain();
    let b_events = b.drain();
    assert_eq!(joined_count(&a_events[0]), Some(2));
    assert_eq!(joined_count(&b_events[0]), Some(2));
    let users = joined_users(&b_events[0]).expect("presence snapshot attached");
    assert_eq!(users.len(), 2);

    // A draws: B receives the update, A does not.
    let path = StrokePath::from(json!({"points": [[0, 0], [4, 2]]}));
    bench
        .service
        .handle_event(
            &a.id,
            &a.handle,
            ClientEvent::Draw {
                room: room("r1"),
                path: path.clone(),
            },
        )
        .await;
    assert!(a.drain().is_empty());
    assert_eq!(
        b.drain(),
        vec![ServerEvent::DrawUpdate {
            room: room("r1"),
            path,
        }]
    );

    // A disconnects: B sees the remaining count.
    bench.service.disconnect(&a.id).await;
    assert_eq!(b.drain(), vec![ServerEvent::UserLeft { count: 1 }]);
}

#[tokio::test]
async fn draw_survives_a_full_cache_outage() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();
    join(&bench, &a, "r1", "Alice").await;
    join(&bench, &b, "r1", "Bob").await;
    a.drain();
    b.drain();

    // Every cache attempt fails, retries included.
    bench.backend.fail_for_next(1000);

    let path = StrokePath::from(json!({"points": [[1, 1]]}));
    bench
        .service
        .handle_event(
            &a.id,
            &a.handle,
            ClientEvent::Draw {
                room: room("r1"),
                path: path.clone(),
            },
        )
        .await;

    // The stroke is durably persisted and still broadcast; only the cache
    // refresh step failed.
    let stored = bench
        .strokes
        .list_strokes(&room("r1"))
        .await
        .expect("store unaffected");
    assert_eq!(stored.len(), 1);
    assert_eq!(
        b.drain(),
        vec![ServerEvent::DrawUpdate {
            room: room("r1"),
            path,
        }]
    );
    // No error notice reaches the sender on a cache-only failure.
    assert!(a.drain().is_empty());
}

#[tokio::test]
async fn join_degrades_to_a_minimal_broadcast_when_the_cache_is_down() {
    let bench = bench();
    let mut a = Client::connect();
    bench.backend.fail_for_next(1000);

    join(&bench, &a, "r1", "Alice").await;

    let events = a.drain();
    assert_eq!(events.len(), 1);
    // The count comes from the in-memory live set; the presence snapshot is
    // omitted because the caching steps failed.
    assert_eq!(joined_count(&events[0]), Some(1));
    assert!(joined_users(&events[0]).is_none());
}

#[tokio::test]
async fn clear_broadcasts_to_others_and_empties_history() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();
    join(&bench, &a, "r1", "Alice").await;
    join(&bench, &b, "r1", "Bob").await;

    for n in 0..3 {
        bench
            .service
            .handle_event(
                &a.id,
                &a.handle,
                ClientEvent::Draw {
                    room: room("r1"),
                    path: StrokePath::from(json!({"points": [n]})),
                },
            )
            .await;
    }
    a.drain();
    b.drain();

    bench
        .service
        .handle_event(&a.id, &a.handle, ClientEvent::Clear { room: room("r1") })
        .await;

    assert!(a.drain().is_empty());
    assert_eq!(b.drain(), vec![ServerEvent::ClearBoard { room: room("r1") }]);

    let (drawings, error) = bench.service.room_drawings(&room("r1")).await;
    assert!(drawings.is_empty());
    assert!(error.is_none());
}

#[tokio::test]
async fn clear_failure_is_reported_to_the_requester_only() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();
    join(&bench, &a, "r1", "Alice").await;
    join(&bench, &b, "r1", "Bob").await;
    a.drain();
    b.drain();

    // The cache delete succeeds; the durable delete fails.
    bench.strokes.fail_for_next(1);
    bench
        .service
        .handle_event(&a.id, &a.handle, ClientEvent::Clear { room: room("r1") })
        .await;

    assert_eq!(
        a.drain(),
        vec![ServerEvent::Error {
            message: "Failed to clear drawings".into(),
        }]
    );
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn draw_failure_is_reported_to_the_requester_only() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();
    join(&bench, &a, "r1", "Alice").await;
    join(&bench, &b, "r1", "Bob").await;
    a.drain();
    b.drain();

    bench.strokes.fail_for_next(1);
    bench
        .service
        .handle_event(
            &a.id,
            &a.handle,
            ClientEvent::Draw {
                room: room("r1"),
                path: StrokePath::from(json!({"points": [1]})),
            },
        )
        .await;

    assert_eq!(
        a.drain(),
        vec![ServerEvent::Error {
            message: "Failed to save drawing".into(),
        }]
    );
    assert!(b.drain().is_empty());
}

#[tokio::test]
async fn undo_and_redo_are_stateless_relays_excluding_the_sender() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();
    join(&bench, &a, "r1", "Alice").await;
    join(&bench, &b, "r1", "Bob").await;
    a.drain();
    b.drain();

    bench
        .service
        .handle_event(
            &a.id,
            &a.handle,
            ClientEvent::Undo {
                room: room("r1"),
                object_data: Some(json!({"id": 3})),
            },
        )
        .await;
    bench
        .service
        .handle_event(
            &a.id,
            &a.handle,
            ClientEvent::Redo {
                room: room("r1"),
                object_data: None,
            },
        )
        .await;

    assert!(a.drain().is_empty());
    assert_eq!(
        b.drain(),
        vec![
            ServerEvent::UndoUpdate {
                room: room("r1"),
                object_data: Some(json!({"id": 3})),
            },
            ServerEvent::RedoUpdate {
                room: room("r1"),
                object_data: None,
            },
        ]
    );
    // Undo/redo never touch the durable store.
    assert!(
        bench
            .strokes
            .list_strokes(&room("r1"))
            .await
            .expect("store reachable")
            .is_empty()
    );
}

#[tokio::test]
async fn cursor_moves_relay_and_land_in_the_cursor_cache() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();
    join(&bench, &a, "r1", "Alice").await;
    join(&bench, &b, "r1", "Bob").await;
    a.drain();
    b.drain();

    bench
        .service
        .handle_event(
            &a.id,
            &a.handle,
            ClientEvent::CursorMove {
                room: room("r1"),
                user_name: "Alice".into(),
                x: 12.0,
                y: 34.5,
            },
        )
        .await;

    assert!(a.drain().is_empty());
    assert_eq!(
        b.drain(),
        vec![ServerEvent::CursorUpdate {
            room: room("r1"),
            user_name: "Alice".into(),
            x: 12.0,
            y: 34.5,
        }]
    );

    let cached = bench
        .backend
        .get(&keys::cursor_key(&room("r1"), &a.id))
        .await
        .expect("cache reachable")
        .expect("cursor cached");
    let record: serde_json::Value = serde_json::from_str(&cached).expect("cursor parses");
    assert_eq!(record["x"], json!(12.0));
}

#[tokio::test]
async fn viewport_updates_relay_and_overwrite_room_state() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();
    join(&bench, &a, "r1", "Alice").await;
    join(&bench, &b, "r1", "Bob").await;
    a.drain();
    b.drain();

    let viewport = json!({"x": 0, "y": 0, "zoom": 1.5});
    bench
        .service
        .handle_event(
            &a.id,
            &a.handle,
            ClientEvent::ViewportUpdate {
                room: room("r1"),
                viewport: viewport.clone(),
            },
        )
        .await;

    assert!(a.drain().is_empty());
    assert_eq!(
        b.drain(),
        vec![ServerEvent::ViewportUpdate {
            room: room("r1"),
            viewport: viewport.clone(),
        }]
    );

    let cached = bench
        .backend
        .get(&keys::room_state_key(&room("r1")))
        .await
        .expect("cache reachable")
        .expect("room state cached");
    let state: serde_json::Value = serde_json::from_str(&cached).expect("state parses");
    assert_eq!(state["viewport"], viewport);
    assert_eq!(state["user_count"], json!(2));
}

#[tokio::test]
async fn broadcast_counts_track_the_live_set_through_joins_and_leaves() {
    let bench = bench();
    let mut a = Client::connect();
    let mut b = Client::connect();
    let mut c = Client::connect();

    join(&bench, &a, "r1", "Alice").await;
    join(&bench, &b, "r1", "Bob").await;
    join(&bench, &c, "r1", "Cleo").await;

    let counts: Vec<usize> = a.drain().iter().filter_map(joined_count).collect();
    assert_eq!(counts, vec![1, 2, 3]);
    b.drain();
    c.drain();

    bench.service.disconnect(&b.id).await;
    assert_eq!(a.drain(), vec![ServerEvent::UserLeft { count: 2 }]);
    assert_eq!(c.drain(), vec![ServerEvent::UserLeft { count: 2 }]);
    assert!(b.drain().is_empty());

    bench.service.disconnect(&c.id).await;
    assert_eq!(a.drain(), vec![ServerEvent::UserLeft { count: 1 }]);
}

#[tokio::test]
async fn late_joiners_read_the_full_history_over_http_semantics() {
    let bench = bench();
    let a = Client::connect();
    join(&bench, &a, "r1", "Alice").await;

    for n in 0..4 {
        bench
            .service
            .handle_event(
                &a.id,
                &a.handle,
                ClientEvent::Draw {
                    room: room("r1"),
                    path: StrokePath::from(json!({"points": [n]})),
                },
            )
            .await;
    }

    let (drawings, error) = bench.service.room_drawings(&room("r1")).await;
    assert!(error.is_none());
    assert_eq!(
        drawings,
        (0..4)
            .map(|n| StrokePath::from(json!({"points": [n]})))
            .collect::<Vec<_>>()
    );

    // A second read with no intervening draws is identical (cache hit).
    let (again, _) = bench.service.room_drawings(&room("r1")).await;
    assert_eq!(again, drawings);
}
