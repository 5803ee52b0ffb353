/// Failures of the socket layer beneath a room session.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening socket could not be bound.
    #[error("bind failed: {0}")]
    Bind(#[source] std::io::Error),

    /// A TCP connection could not be accepted.
    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The WebSocket upgrade was refused or malformed.
    #[error("upgrade failed: {0}")]
    Upgrade(String),

    /// Writing a frame to the peer failed.
    #[error("send failed: {0}")]
    Send(String),

    /// Reading a frame from the peer failed.
    #[error("receive failed: {0}")]
    Receive(String),

    /// The peer is gone.
    #[error("connection closed: {0}")]
    Closed(String),
}
