//! Stable numeric codes surfaced to clients.

use std::fmt;

/// Why a join or reconnect was refused.
///
/// The numeric values are part of the wire contract and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinErrorCode {
    NameTooShort,
    NameTooLong,
    IpLimitExceeded,
    ProtocolMismatch,
    InvalidNameCharacters,
    RoomFull,
    RoomNotFound,
    ReconnectRejected,
    Unauthorized,
}

impl JoinErrorCode {
    pub fn code(self) -> u16 {
        match self {
            Self::NameTooShort => 5000,
            Self::NameTooLong => 5001,
            Self::IpLimitExceeded => 5002,
            Self::ProtocolMismatch => 5003,
            Self::InvalidNameCharacters => 5004,
            Self::RoomFull => 5005,
            Self::RoomNotFound => 5006,
            Self::ReconnectRejected => 5007,
            Self::Unauthorized => 401,
        }
    }

    /// Human-readable text shown by the client.
    pub fn message(self) -> &'static str {
        match self {
            Self::NameTooShort => "Too short name!",
            Self::NameTooLong => "Too long name!",
            Self::IpLimitExceeded => "Can't join/create 4 servers on the same IP!",
            Self::ProtocolMismatch => {
                "This client version is not supported on this server, please update!"
            }
            Self::InvalidNameCharacters => "Username contains invalid characters!",
            Self::RoomFull => "This room is full!",
            Self::RoomNotFound => "This room doesn't exist!",
            Self::ReconnectRejected => "Couldn't resume the session!",
            Self::Unauthorized => "Couldn't authorize to the network!",
        }
    }

    pub fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            5000 => Self::NameTooShort,
            5001 => Self::NameTooLong,
            5002 => Self::IpLimitExceeded,
            5003 => Self::ProtocolMismatch,
            5004 => Self::InvalidNameCharacters,
            5005 => Self::RoomFull,
            5006 => Self::RoomNotFound,
            5007 => Self::ReconnectRejected,
            401 => Self::Unauthorized,
            _ => return None,
        })
    }
}

impl fmt::Display for JoinErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message(), self.code())
    }
}

/// Why the engine closed a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// The room was torn down normally (usually because it emptied).
    Normal,
    /// Removed by the owner or by a capacity reduction.
    Kicked,
    /// The account is banned.
    Banned,
    /// No pong within the liveness timeout.
    TimedOut,
}

impl CloseCode {
    pub fn code(self) -> u16 {
        match self {
            Self::Normal => 4000,
            Self::Kicked => 4100,
            Self::Banned => 4101,
            Self::TimedOut => 4102,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Self::Normal => "room closed",
            Self::Kicked => "kicked",
            Self::Banned => "banned",
            Self::TimedOut => "timed out",
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.reason(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_JOIN_CODES: [JoinErrorCode; 9] = [
        JoinErrorCode::NameTooShort,
        JoinErrorCode::NameTooLong,
        JoinErrorCode::IpLimitExceeded,
        JoinErrorCode::ProtocolMismatch,
        JoinErrorCode::InvalidNameCharacters,
        JoinErrorCode::RoomFull,
        JoinErrorCode::RoomNotFound,
        JoinErrorCode::ReconnectRejected,
        JoinErrorCode::Unauthorized,
    ];

    #[test]
    fn test_join_error_codes_are_distinct() {
        let mut codes: Vec<u16> = ALL_JOIN_CODES.iter().map(|c| c.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), ALL_JOIN_CODES.len());
    }

    #[test]
    fn test_join_error_code_from_code_inverts_code() {
        for code in ALL_JOIN_CODES {
            assert_eq!(JoinErrorCode::from_code(code.code()), Some(code));
        }
        assert_eq!(JoinErrorCode::from_code(1234), None);
    }

    #[test]
    fn test_close_code_values() {
        assert_eq!(CloseCode::Normal.code(), 4000);
        assert_eq!(CloseCode::Kicked.code(), 4100);
        assert_eq!(CloseCode::Banned.code(), 4101);
        assert_eq!(CloseCode::TimedOut.code(), 4102);
    }
}
