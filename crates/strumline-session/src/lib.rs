//! Admission and identity for Strumline sessions.
//!
//! 1. **Admission** — per-IP membership caps ([`Admission`]) and room code
//!    allocation ([`RoomCodeRegistry`]), both shared by every room.
//! 2. **Identity** — optional account verification ([`IdentityBridge`]
//!    over a [`ProfileStore`]).
//! 3. **Registries** — verified players in game ([`PresenceRegistry`]) and
//!    per-country statistics ([`CountryStats`] fed by a [`GeoResolver`]).
//!
//! ```text
//! Room Layer (above)   ← holds IP slots, codes, presence entries
//!     ↕
//! Session Layer (this crate)
//!     ↕
//! Protocol Layer (below)  ← RoomCode, Credential
//! ```

#![allow(async_fn_in_trait)]

mod admission;
mod auth;
mod codes;
mod error;
mod geo;
pub mod jwt;
mod registry;
mod token;

pub use admission::{Admission, AdmissionConfig, IpSlot};
pub use auth::{Identity, IdentityBridge, InMemoryProfiles, Profile, ProfileStore};
pub use codes::RoomCodeRegistry;
pub use error::SessionError;
pub use geo::{CountryStats, GeoResolver, NoGeo, StaticGeo};
pub use registry::{InMemoryPresence, PresenceRegistry};
pub use token::generate_reconnect_token;
