//! Error types for the room layer.

use strumline_protocol::{JoinErrorCode, RoomCode};

/// Errors that can occur during room operations.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    /// No room with this code is running.
    #[error("room {0} not found")]
    NotFound(RoomCode),

    /// The room's command channel is closed (the room was disposed).
    #[error("room {0} is unavailable")]
    Unavailable(RoomCode),

    /// The room refused the join or reconnect.
    #[error("join rejected: {0}")]
    Rejected(JoinErrorCode),
}

impl RoomError {
    /// The code reported to the client for this failure.
    pub fn join_code(&self) -> JoinErrorCode {
        match self {
            Self::NotFound(_) | Self::Unavailable(_) => JoinErrorCode::RoomNotFound,
            Self::Rejected(code) => *code,
        }
    }
}

impl From<JoinErrorCode> for RoomError {
    fn from(code: JoinErrorCode) -> Self {
        Self::Rejected(code)
    }
}
