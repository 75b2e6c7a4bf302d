//! Versioned cache key derivation.
//!
//! Every key embeds the cache schema version so that changing a cached
//! payload's shape never requires a manual flush: old-format entries simply
//! age out under their TTL while new entries are written under the new
//! version suffix.

use crate::domain::{ParticipantId, RoomId};

/// Bump when the shape of any cached payload changes.
pub const CACHE_VERSION: &str = "1.1";

/// A fully derived, version-suffixed cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap a raw key string, e.g. one returned by a pattern listing.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    fn versioned(base: String) -> Self {
        Self(format!("{base}:v{CACHE_VERSION}"))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Key for a room's cached ordered stroke list.
pub fn drawing_key(room: &RoomId) -> CacheKey {
    CacheKey::versioned(format!("drawing:{room}"))
}

/// Key for a room's ephemeral state snapshot.
pub fn room_state_key(room: &RoomId) -> CacheKey {
    CacheKey::versioned(format!("room_state:{room}"))
}

/// Key for a room's presence hash (field per participant).
pub fn presence_key(room: &RoomId) -> CacheKey {
    CacheKey::versioned(format!("presence:{room}"))
}

/// Key for one participant's cursor position in a room.
pub fn cursor_key(room: &RoomId, participant: &ParticipantId) -> CacheKey {
    CacheKey::versioned(format!("cursor:{room}:{participant}"))
}

/// Pattern matching every cursor key for a room at the current version.
pub fn cursor_pattern(room: &RoomId) -> String {
    format!("cursor:{room}:*:v{CACHE_VERSION}")
}

/// Extract the participant segment from a cursor key listed for `room`.
///
/// Returns `None` for keys that do not follow the current scheme, so stale
/// or foreign keys picked up by a pattern scan are silently skipped.
pub fn participant_from_cursor_key<'a>(key: &'a str, room: &RoomId) -> Option<&'a str> {
    let prefix = format!("cursor:{room}:");
    let suffix = format!(":v{CACHE_VERSION}");
    let id = key.strip_prefix(prefix.as_str())?.strip_suffix(suffix.as_str())?;
    (!id.is_empty()).then_some(id)
}

/// Key for a room's access-pattern counter.
pub fn access_pattern_key(room: &RoomId) -> CacheKey {
    CacheKey::versioned(format!("access_pattern:{room}"))
}
