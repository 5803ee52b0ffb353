//! # Strumline
//!
//! Real-time session server for two-to-eight player rhythm game rooms.
//!
//! Clients connect over WebSocket, create or join a room by its short code,
//! and exchange named in-room messages. The server keeps a replicated room
//! state per room and streams it as a full snapshot followed by patches.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use strumline::prelude::*;
//!
//! # async fn start() -> Result<(), StrumlineError> {
//! let server = StrumlineServer::builder()
//!     .bind("0.0.0.0:2567")
//!     .build(InMemoryProfiles::new())
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod handler;
mod server;

pub use error::StrumlineError;
pub use server::{ServerConfig, StrumlineServer, StrumlineServerBuilder};

pub mod prelude {
    pub use crate::{ServerConfig, StrumlineError, StrumlineServer, StrumlineServerBuilder};
    pub use strumline_protocol::{
        CloseCode, JoinErrorCode, JoinOptions, PROTOCOL_VERSION, RoomCode, RoomListing,
        SessionId,
    };
    pub use strumline_room::{RoomConfig, RoomManager};
    pub use strumline_session::{
        AdmissionConfig, CountryStats, GeoResolver, InMemoryProfiles, NoGeo, Profile,
        ProfileStore, StaticGeo,
    };
}
