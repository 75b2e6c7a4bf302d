//! In-memory live-membership registry.
//!
//! This is the authoritative answer to "who do I broadcast to right now",
//! intentionally separate from the presence tracker (the cross-process,
//! TTL-based, advisory view). Each room owns its member map behind its own
//! lock; there is no ambient shared map mutated without synchronisation.
//! Rooms whose live set empties are garbage-collected from the table, while
//! their cache and store entries expire or persist independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::collab::ServerEvent;
use crate::domain::{ParticipantId, RoomId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Delivery scope for one outbound event.
#[derive(Debug, Clone, Copy)]
pub enum BroadcastScope {
    /// Every member of the room, the sender included.
    All,
    /// Every member except the sender.
    ExcludeSender(ParticipantId),
}

/// Write half of one connection's outbound event queue.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    sender: mpsc::UnboundedSender<ServerEvent>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::UnboundedSender<ServerEvent>) -> Self {
        Self { sender }
    }

    fn deliver(&self, event: ServerEvent) -> bool {
        self.sender.send(event).is_ok()
    }
}

/// One room's live member map, guarded by its own lock.
#[derive(Debug, Default)]
struct RoomChannel {
    members: Mutex<HashMap<ParticipantId, ConnectionHandle>>,
}

/// Table of live rooms. Lock order is always registry table first, then one
/// room's member map; the table lock is dropped before members are touched
/// wherever possible.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomId, Arc<RoomChannel>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant to a room's live set, returning the new count.
    pub fn join(&self, room: &RoomId, participant: ParticipantId, handle: ConnectionHandle) -> usize {
        let channel = {
            let mut rooms = lock(&self.rooms);
            rooms.entry(room.clone()).or_default().clone()
        };
        let mut members = lock(&channel.members);
        members.insert(participant, handle);
        members.len()
    }

    /// Current live count for a room.
    pub fn member_count(&self, room: &RoomId) -> usize {
        self.channel(room)
            .map(|channel| lock(&channel.members).len())
            .unwrap_or(0)
    }

    /// Remove a participant from every room they are in, returning each
    /// affected room with its remaining count. Emptied rooms are dropped
    /// from the table.
    pub fn disconnect(&self, participant: &ParticipantId) -> Vec<(RoomId, usize)> {
        let mut affected = Vec::new();
        let mut rooms = lock(&self.rooms);
        rooms.retain(|room, channel| {
            let mut members = lock(&channel.members);
            if members.remove(participant).is_none() {
                return true;
            }
            affected.push((room.clone(), members.len()));
            if members.is_empty() {
                debug!(room = %room, "garbage-collecting empty room");
                return false;
            }
            true
        });
        affected
    }

    /// Fan an event out to a room under the given scope.
    pub fn broadcast(&self, room: &RoomId, scope: BroadcastScope, event: &ServerEvent) {
        let Some(channel) = self.channel(room) else {
            return;
        };
        let members = lock(&channel.members);
        for (member, handle) in members.iter() {
            if let BroadcastScope::ExcludeSender(sender) = scope {
                if *member == sender {
                    continue;
                }
            }
            if !handle.deliver(event.clone()) {
                debug!(room = %room, participant = %member, "dropping event for closed connection");
            }
        }
    }

    /// Deliver an event to a single member of a room. Returns `false` when
    /// the participant is not present or their connection is closed.
    pub fn send_to(&self, room: &RoomId, participant: &ParticipantId, event: &ServerEvent) -> bool {
        let Some(channel) = self.channel(room) else {
            return false;
        };
        let members = lock(&channel.members);
        members
            .get(participant)
            .map(|handle| handle.deliver(event.clone()))
            .unwrap_or(false)
    }

    fn channel(&self, room: &RoomId) -> Option<Arc<RoomChannel>> {
        lock(&self.rooms).get(room).cloned()
    }
}
