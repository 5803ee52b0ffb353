//! Core protocol types for Strumline's wire format.
//!
//! Every structure in this module is serialized into an [`Envelope`] and
//! travels between the game client and the room engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::JoinOptions;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Identifies one session (one seat in one room).
///
/// Ids are handed out from a process-wide counter, so ordering by id is
/// ordering by join time. Serialized as a plain number.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

/// The short public code of a room, e.g. `"QWER"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(pub String);

impl RoomCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(code: &str) -> Self {
        Self(code.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Recipient
// ---------------------------------------------------------------------------

/// Who should receive a room event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected session in the room.
    All,
    /// One session.
    Session(SessionId),
    /// Everyone except the given session (usually the sender).
    AllExcept(SessionId),
}

impl Recipient {
    /// Whether `session` is addressed by this recipient.
    pub fn includes(&self, session: SessionId) -> bool {
        match self {
            Self::All => true,
            Self::Session(target) => *target == session,
            Self::AllExcept(excluded) => *excluded != session,
        }
    }
}

// ---------------------------------------------------------------------------
// Room listings
// ---------------------------------------------------------------------------

/// Public metadata of a room, as shown in the room browser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomListing {
    pub code: RoomCode,
    /// Display name of the player who created the room.
    pub name: String,
    pub players: usize,
    pub capacity: usize,
    /// Last measured round-trip time of the owner, in milliseconds.
    pub ping: u64,
    /// Points of the current owner.
    pub points: i64,
}

// ---------------------------------------------------------------------------
// SystemMessage
// ---------------------------------------------------------------------------

/// Connection-level messages handled by the engine itself.
///
/// Internally tagged: `{ "type": "Join", "options": { ... } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    // -- Client → server --
    /// Create a room, or join one when `options.room_code` is set.
    Join { options: JoinOptions },

    /// Resume a session held open after an unexpected disconnect.
    Reconnect {
        room: RoomCode,
        session: SessionId,
        token: String,
    },

    /// Ask for the public room list.
    ListRooms,

    /// Consented leave. No grace window is held afterwards.
    Leave,

    // -- Server → client --
    /// The join (or reconnect) succeeded.
    Joined {
        room: RoomCode,
        session: SessionId,
        /// Secret needed to resume this session with [`Reconnect`](Self::Reconnect).
        token: String,
    },

    /// Full room state snapshot, sent once after joining or resuming.
    RoomState { state: Value },

    /// Changes since the previous snapshot or patch. Removed keys are `null`.
    StatePatch { patch: Value },

    /// Reply to [`ListRooms`](Self::ListRooms).
    RoomList { rooms: Vec<RoomListing> },

    /// A join failed. `code` is one of the stable join error codes.
    Error { code: u16, message: String },

    /// The engine is closing this session with a close code.
    Closed { code: u16 },
}

// ---------------------------------------------------------------------------
// Named room messages
// ---------------------------------------------------------------------------

/// An in-room message: a name plus an arbitrary JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedMessage {
    pub name: String,
    #[serde(default)]
    pub data: Value,
}

impl NamedMessage {
    pub fn new(name: impl Into<String>, data: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// A message whose payload is the empty string, as used for bare events
    /// like `checkChart` or `startSong`.
    pub fn signal(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }
}

// ---------------------------------------------------------------------------
// Payload / Envelope
// ---------------------------------------------------------------------------

/// The content of an envelope.
///
/// Adjacently tagged:
/// `{ "type": "Message", "data": { "name": "chat", "data": "hi" } }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    System(SystemMessage),
    Message(NamedMessage),
}

/// The top-level wire frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Per-direction sequence number.
    pub seq: u64,
    /// Milliseconds since the sender started.
    pub timestamp: u64,
    pub payload: Payload,
}
