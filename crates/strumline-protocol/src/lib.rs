//! Wire protocol for Strumline.
//!
//! - **Types** ([`Envelope`], [`SystemMessage`], [`NamedMessage`]) — the
//!   frames exchanged with game clients.
//! - **Options** ([`JoinOptions`]) — what a client sends to create or join
//!   a room.
//! - **Codes** ([`JoinErrorCode`], [`CloseCode`]) — stable numeric codes.
//! - **Shapes** ([`PayloadShape`]) — payload checks applied before a room
//!   handles a message.
//! - **Codec** ([`Codec`], [`JsonCodec`]) — bytes in, bytes out.
//!
//! ```text
//! Transport (bytes) → Protocol (Envelope) → Room (named messages)
//! ```

mod codec;
mod codes;
mod error;
mod options;
mod shape;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use codes::{CloseCode, JoinErrorCode};
pub use error::ProtocolError;
pub use options::{Credential, JoinOptions, Skin};
pub use shape::PayloadShape;
pub use types::{
    Envelope, NamedMessage, Payload, Recipient, RoomCode, RoomListing,
    SessionId, SystemMessage,
};

/// Protocol version this build speaks. Clients declaring another version
/// are turned away at join time.
pub const PROTOCOL_VERSION: u32 = 1;
