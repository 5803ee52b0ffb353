//! Unified error type for the Strumline server.

use strumline_protocol::ProtocolError;
use strumline_room::RoomError;
use strumline_session::SessionError;
use strumline_transport::TransportError;

/// Top-level error that wraps every layer's error.
///
/// The `#[from]` conversions let `?` cross layer boundaries inside the
/// connection handler.
#[derive(Debug, thiserror::Error)]
pub enum StrumlineError {
    /// Socket-level failure (bind, accept, send, receive).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A frame could not be encoded or decoded, or broke the handshake order.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Credential or account failure.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The room refused the client or has gone away.
    #[error(transparent)]
    Room(#[from] RoomError),
}
