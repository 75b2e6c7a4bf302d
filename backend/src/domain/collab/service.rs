//! The room broadcast protocol: one handler per inbound event, each updating
//! the durable store and/or caches before fanning the event out to the
//! room's live members.
//!
//! Handlers run as concurrent tasks with no per-room serialisation; the
//! durable store's per-record atomicity and the caches' self-healing carry
//! the consistency story. Broadcast delivery is never blocked by cache
//! failures: every caching step either degrades or is absorbed.

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::domain::caching::{
    CursorBroadcaster, DrawingCache, Prefetcher, PresenceTracker, RetryingCache, RoomStateCache,
};
use crate::domain::collab::{BroadcastScope, ClientEvent, ConnectionHandle, RoomRegistry, ServerEvent};
use crate::domain::ports::{CacheBackend, CacheBackendError, StrokeRepository, StrokeRepositoryError};
use crate::domain::{
    CursorRecord, DisplayName, ParticipantId, PresenceRecord, RoomId, RoomStateSnapshot, StrokePath,
};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
enum JoinPipelineError {
    #[error(transparent)]
    Cache(#[from] CacheBackendError),
    #[error(transparent)]
    Store(#[from] StrokeRepositoryError),
}

/// The protocol service: owns the live-membership registry and the cache
/// coordination components, and is shared across all connection tasks.
pub struct CollabService {
    cache: RetryingCache,
    drawings: DrawingCache,
    room_state: RoomStateCache,
    presence: PresenceTracker,
    cursors: CursorBroadcaster,
    prefetcher: Prefetcher,
    registry: RoomRegistry,
    strokes: Arc<dyn StrokeRepository>,
}

impl CollabService {
    /// Assemble the service over a cache backend and a stroke store.
    pub fn new(backend: Arc<dyn CacheBackend>, strokes: Arc<dyn StrokeRepository>) -> Self {
        let cache = RetryingCache::new(backend);
        let prefetcher = Prefetcher::new(cache.clone(), strokes.clone());
        Self {
            drawings: DrawingCache::new(cache.clone(), strokes.clone(), prefetcher.clone()),
            room_state: RoomStateCache::new(cache.clone()),
            presence: PresenceTracker::new(cache.clone()),
            cursors: CursorBroadcaster::new(cache.clone()),
            cache,
            prefetcher,
            registry: RoomRegistry::new(),
            strokes,
        }
    }

    /// A transport connection opened; no room association yet.
    pub fn connect(&self, participant: &ParticipantId) {
        info!(participant = %participant, "client connected");
    }

    /// Dispatch one inbound event from a connected client.
    pub async fn handle_event(
        &self,
        participant: &ParticipantId,
        handle: &ConnectionHandle,
        event: ClientEvent,
    ) {
        match event {
            ClientEvent::Join { room, user_name } => {
                self.join(participant, handle.clone(), &room, user_name).await;
            }
            ClientEvent::Draw { room, path } => self.draw(participant, &room, path).await,
            ClientEvent::Undo { room, object_data } => self.undo(participant, &room, object_data),
            ClientEvent::Redo { room, object_data } => self.redo(participant, &room, object_data),
            ClientEvent::CursorMove { room, user_name, x, y } => {
                self.cursor_move(participant, &room, user_name, x, y).await;
            }
            ClientEvent::ViewportUpdate { room, viewport } => {
                self.viewport_update(participant, &room, viewport).await;
            }
            ClientEvent::Clear { room } => self.clear(participant, &room).await,
        }
    }

    /// Relay a client-side undo to the rest of the room; the server keeps no
    /// undo stack and validates nothing.
    pub fn undo(
        &self,
        participant: &ParticipantId,
        room: &RoomId,
        object_data: Option<serde_json::Value>,
    ) {
        self.registry.broadcast(
            room,
            BroadcastScope::ExcludeSender(*participant),
            &ServerEvent::UndoUpdate {
                room: room.clone(),
                object_data,
            },
        );
    }

    /// Relay a client-side redo to the rest of the room.
    pub fn redo(
        &self,
        participant: &ParticipantId,
        room: &RoomId,
        object_data: Option<serde_json::Value>,
    ) {
        self.registry.broadcast(
            room,
            BroadcastScope::ExcludeSender(*participant),
            &ServerEvent::RedoUpdate {
                room: room.clone(),
                object_data,
            },
        );
    }

    /// A transport connection closed: leave every room and notify the
    /// remaining members.
    pub async fn disconnect(&self, participant: &ParticipantId) {
        for (room, count) in self.registry.disconnect(participant) {
            info!(participant = %participant, room = %room, count, "participant left room");
            self.registry
                .broadcast(&room, BroadcastScope::All, &ServerEvent::UserLeft { count });
        }
        info!(participant = %participant, "client disconnected");
    }

    /// Cache-first drawings read for the HTTP surface. Unrecoverable
    /// failures come back as an empty list plus an error string rather than
    /// an error response.
    pub async fn room_drawings(&self, room: &RoomId) -> (Vec<StrokePath>, Option<String>) {
        match self.drawings.room_drawings(room).await {
            Ok(drawings) => (drawings, None),
            Err(err) => {
                error!(room = %room, error = %err, "failed to load room drawings");
                (Vec::new(), Some(err.to_string()))
            }
        }
    }

    /// Bounded health probe of the cache backend.
    pub async fn cache_healthy(&self) -> bool {
        self.cache.check_health().await
    }

    /// Enter a room: live set, presence, room state, opportunistic prefetch,
    /// and a `user_joined` broadcast to the whole room, the joiner included.
    pub async fn join(
        &self,
        participant: &ParticipantId,
        handle: ConnectionHandle,
        room: &RoomId,
        user_name: Option<String>,
    ) {
        let display_name = DisplayName::sanitize(user_name);
        let count = self.registry.join(room, *participant, handle);
        info!(
            participant = %participant,
            room = %room,
            count,
            name = %display_name,
            "participant joined room"
        );

        match self.join_side_effects(room, participant, &display_name, count).await {
            Ok(users) => self.registry.broadcast(
                room,
                BroadcastScope::All,
                &ServerEvent::UserJoined {
                    count,
                    users: Some(users),
                },
            ),
            Err(err) => {
                // Broadcast delivery must never be blocked by cache trouble;
                // fall back to the count from the in-memory live set.
                warn!(room = %room, error = %err, "join caching steps failed; sending minimal update");
                let count = self.registry.member_count(room);
                self.registry.broadcast(
                    room,
                    BroadcastScope::All,
                    &ServerEvent::UserJoined { count, users: None },
                );
            }
        }
    }

    async fn join_side_effects(
        &self,
        room: &RoomId,
        participant: &ParticipantId,
        display_name: &DisplayName,
        count: usize,
    ) -> Result<HashMap<String, PresenceRecord>, JoinPipelineError> {
        self.strokes.create_room_if_absent(room).await?;
        self.presence
            .record_presence(room, participant, display_name, Utc::now())
            .await?;
        self.room_state
            .set(
                room,
                &RoomStateSnapshot {
                    user_count: count,
                    viewport: None,
                    last_update: Utc::now(),
                },
            )
            .await?;
        self.prefetcher.maybe_prefetch(room).await;
        Ok(self.presence.list_active(room).await?)
    }

    /// Persist one stroke and relay it to everyone else in the room. On a
    /// store failure nothing is broadcast and the sender alone is notified.
    pub async fn draw(&self, participant: &ParticipantId, room: &RoomId, path: StrokePath) {
        match self.drawings.append(room, &path).await {
            Ok(outcome) => {
                if outcome.is_degraded() {
                    warn!(room = %room, "stroke broadcast proceeding with degraded cache");
                }
                self.registry.broadcast(
                    room,
                    BroadcastScope::ExcludeSender(*participant),
                    &ServerEvent::DrawUpdate {
                        room: room.clone(),
                        path,
                    },
                );
            }
            Err(err) => {
                error!(room = %room, error = %err, "failed to persist stroke; not broadcasting");
                self.registry.send_to(
                    room,
                    participant,
                    &ServerEvent::Error {
                        message: "Failed to save drawing".into(),
                    },
                );
            }
        }
    }

    /// Record the sender's cursor (best-effort) and relay it to everyone
    /// else.
    pub async fn cursor_move(
        &self,
        participant: &ParticipantId,
        room: &RoomId,
        user_name: String,
        x: f64,
        y: f64,
    ) {
        self.cursors
            .record(
                room,
                participant,
                &CursorRecord {
                    display_name: user_name.clone(),
                    x,
                    y,
                    timestamp: Utc::now(),
                },
            )
            .await;
        self.registry.broadcast(
            room,
            BroadcastScope::ExcludeSender(*participant),
            &ServerEvent::CursorUpdate {
                room: room.clone(),
                user_name,
                x,
                y,
            },
        );
    }

    /// Overwrite the room state's viewport and relay the update to everyone
    /// else.
    pub async fn viewport_update(
        &self,
        participant: &ParticipantId,
        room: &RoomId,
        viewport: serde_json::Value,
    ) {
        let snapshot = RoomStateSnapshot {
            user_count: self.registry.member_count(room),
            viewport: Some(viewport.clone()),
            last_update: Utc::now(),
        };
        if let Err(err) = self.room_state.set(room, &snapshot).await {
            warn!(room = %room, error = %err, "failed to cache viewport state");
        }
        self.registry.broadcast(
            room,
            BroadcastScope::ExcludeSender(*participant),
            &ServerEvent::ViewportUpdate {
                room: room.clone(),
                viewport,
            },
        );
    }

    /// Wipe the board: invalidate the cache, delete the durable history, and
    /// tell everyone else. On a store failure the requester alone gets an
    /// error notice.
    pub async fn clear(&self, participant: &ParticipantId, room: &RoomId) {
        match self.drawings.clear(room).await {
            Ok(outcome) => {
                if outcome.is_degraded() {
                    warn!(room = %room, "board cleared with degraded cache invalidation");
                }
                self.registry.broadcast(
                    room,
                    BroadcastScope::ExcludeSender(*participant),
                    &ServerEvent::ClearBoard { room: room.clone() },
                );
            }
            Err(err) => {
                error!(room = %room, error = %err, "failed to clear drawings");
                self.registry.send_to(
                    room,
                    participant,
                    &ServerEvent::Error {
                        message: "Failed to clear drawings".into(),
                    },
                );
            }
        }
    }
}
