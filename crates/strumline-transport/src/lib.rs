//! Byte-level connections for Strumline sessions.
//!
//! A [`Transport`] hands out [`Connection`]s; each connection moves opaque
//! frames and knows which client address it is charged to. The room engine
//! never sees sockets, only these two traits.
//!
//! # Feature Flags
//!
//! - `websocket` (default): [`WebSocketTransport`] over `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;
use std::net::IpAddr;

/// Process-unique number of an accepted connection, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener producing client connections.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next client to finish its upgrade.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;
}

/// One client connection.
///
/// `send` and `recv` may be awaited concurrently from different tasks;
/// implementations must not make one wait on the other.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Next frame from the peer, or `Ok(None)` once the peer has closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes without an application code.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Closes with an application code (4000 and up) and a short reason.
    async fn close_with(&self, code: u16, reason: &str) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;

    /// The address admission control charges this connection to.
    fn client_ip(&self) -> IpAddr;
}

/// Picks the client address out of an `X-Forwarded-For` header value.
///
/// The left-most entry is the originating client. Returns `None` when the
/// header is empty or its first entry is not an IP address.
pub fn parse_forwarded_for(header: &str) -> Option<IpAddr> {
    header.split(',').next()?.trim().parse().ok()
}
