//! Core value types for rooms, participants, and the state the caches carry.
//!
//! Everything here is constructed through validating constructors so that
//! identifiers embed safely into colon-delimited cache keys and wire payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum length of a room identifier.
const ROOM_ID_MAX_LEN: usize = 64;

/// Maximum length of a participant display name; longer names are truncated.
const DISPLAY_NAME_MAX_LEN: usize = 32;

/// Fallback name for participants who join without one.
const ANONYMOUS: &str = "Anonymous";

/// Opaque room identifier scoping strokes, presence, and cursors.
///
/// Restricted to `[A-Za-z0-9_-]` so a room id can never smuggle a key
/// separator into the versioned cache key scheme.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub struct RoomId(String);

impl RoomId {
    /// Construct a room id after validating length and character set.
    pub fn new(value: impl Into<String>) -> Result<Self, RoomIdError> {
        let raw = value.into();
        if raw.is_empty() {
            return Err(RoomIdError::Empty);
        }
        if raw.len() > ROOM_ID_MAX_LEN {
            return Err(RoomIdError::TooLong);
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RoomIdError::InvalidCharacters);
        }
        Ok(Self(raw))
    }

    /// Borrow the underlying id as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<String> for RoomId {
    type Error = RoomIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Validation errors returned when constructing [`RoomId`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomIdError {
    /// Id is empty.
    #[error("room id must not be empty")]
    Empty,
    /// Id exceeds the maximum length.
    #[error("room id must not exceed {ROOM_ID_MAX_LEN} characters")]
    TooLong,
    /// Id contains characters outside `[A-Za-z0-9_-]`.
    #[error("room id may only contain alphanumerics, underscores, and dashes")]
    InvalidCharacters,
}

/// Identity of one connected participant.
///
/// Generated per connection, so the same person opening two tabs is two
/// participants. This mirrors a transport session id rather than a user
/// account; the backend has no notion of accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(Uuid);

impl ParticipantId {
    /// Mint a fresh participant identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Borrow the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A participant's display name, trimmed and bounded.
///
/// Joining without a usable name falls back to `Anonymous` rather than
/// rejecting the join; the name is display-only metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DisplayName(String);

impl DisplayName {
    /// Normalise an optional client-supplied name: trim, drop control
    /// characters, and bound the length.
    pub fn sanitize(raw: Option<String>) -> Self {
        let trimmed = raw.as_deref().map(str::trim).unwrap_or_default();
        let printable: String = trimmed
            .chars()
            .filter(|c| !c.is_control())
            .take(DISPLAY_NAME_MAX_LEN)
            .collect();
        if printable.is_empty() {
            return Self::anonymous();
        }
        Self(printable)
    }

    /// The fallback name used when a participant provides none.
    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_owned())
    }

    /// Borrow the name as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for DisplayName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One drawing input's serialized path.
///
/// The payload is opaque to the backend: an ordered sequence of points and
/// styling metadata produced by the client, carried as JSON and never
/// interpreted server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrokePath(pub serde_json::Value);

impl StrokePath {
    /// Serialize the path compactly for durable storage.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }
}

impl From<serde_json::Value> for StrokePath {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// One durable stroke row as returned by the store, payload still raw.
///
/// Deserialization of `payload` happens at the drawing-cache layer so that a
/// single malformed record can be skipped without failing the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrokeRecord {
    /// Monotonically assigned id; list order follows it.
    pub id: i64,
    /// Serialized path payload exactly as stored.
    pub payload: String,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// Ephemeral, cache-only room metadata.
///
/// Overwritten wholesale on every update; absence means "unknown", never
/// "empty". Two near-simultaneous writers may clobber each other, which is
/// acceptable for display-only data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomStateSnapshot {
    /// Live participant count at the time of the write.
    pub user_count: usize,
    /// Last known viewport rectangle, opaque to the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<serde_json::Value>,
    /// When this snapshot was written.
    pub last_update: DateTime<Utc>,
}

/// Per-participant presence metadata stored in the per-room presence hash.
///
/// `joined_at` and `last_seen` are optional so that legacy or partially
/// written records still parse; a missing `last_seen` is treated as maximally
/// stale by the cleanup sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Display name at join time.
    pub display_name: String,
    /// When the participant joined.
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    /// Last time any presence-bearing event refreshed this record.
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Last known cursor position for one participant; a liveness signal, not a
/// log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CursorRecord {
    /// Display name to label the remote cursor with.
    pub display_name: String,
    pub x: f64,
    pub y: f64,
    /// When the position was reported.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("r1")]
    #[case("team-alpha_42")]
    #[case("R")]
    fn room_id_accepts_clean_input(#[case] value: &str) {
        let id = RoomId::new(value).expect("valid room id");
        assert_eq!(id.as_str(), value);
    }

    #[rstest]
    #[case("", RoomIdError::Empty)]
    #[case("room:1", RoomIdError::InvalidCharacters)]
    #[case("room 1", RoomIdError::InvalidCharacters)]
    fn room_id_rejects_bad_input(#[case] value: &str, #[case] expected: RoomIdError) {
        let err = RoomId::new(value).expect_err("invalid room id");
        assert_eq!(err, expected);
    }

    #[rstest]
    fn room_id_rejects_overlong_input() {
        let err = RoomId::new("x".repeat(65)).expect_err("overlong room id");
        assert_eq!(err, RoomIdError::TooLong);
    }

    #[rstest]
    #[case(None, "Anonymous")]
    #[case(Some(String::new()), "Anonymous")]
    #[case(Some(String::from("   ")), "Anonymous")]
    #[case(Some(String::from("  Ada ")), "Ada")]
    #[case(Some(String::from("A\u{7}da\nLovelace")), "AdaLovelace")]
    #[case(Some(String::from("\u{7}\u{8}")), "Anonymous")]
    fn display_name_sanitizes(#[case] raw: Option<String>, #[case] expected: &str) {
        assert_eq!(DisplayName::sanitize(raw).as_str(), expected);
    }

    #[rstest]
    fn display_name_truncates_long_input() {
        let name = DisplayName::sanitize(Some("a".repeat(200)));
        assert_eq!(name.as_str().len(), 32);
    }

    #[rstest]
    fn presence_record_parses_without_timestamps() {
        let record: PresenceRecord =
            serde_json::from_str(r#"{"display_name":"Ada"}"#).expect("legacy record parses");
        assert_eq!(record.display_name, "Ada");
        assert!(record.last_seen.is_none());
    }
}
