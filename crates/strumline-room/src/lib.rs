//! Room lifecycle and gameplay rules for Strumline.
//!
//! Each room runs as an isolated Tokio task (actor model) owning a
//! [`RoomCore`]: the player seats, the phase machine, the shared vitality
//! bar and the message router.
//!
//! # Key types
//!
//! - [`RoomManager`] — creates rooms, finds them by code, lists them
//! - [`RoomHandle`] — send commands to a running room actor
//! - [`RoomCore`] — the synchronous rules, driven by the actor
//! - [`RoomState`] — the state replicated to clients
//! - [`RoomConfig`] — capacities, timers and grace windows

mod config;
mod engine;
mod error;
mod handlers;
mod manager;
pub mod names;
pub mod patch;
mod player;
mod room;
pub mod router;
pub mod scoring;
mod state;

pub use config::{Phase, RoomConfig};
pub use engine::{Effect, JoinRequest, RoomCore, Seat};
pub use error::RoomError;
pub use manager::{Admit, RoomManager};
pub use player::{Judgment, Player, Presence};
pub use room::{RoomHandle, RoomOutbound, SessionSender};
pub use router::{Access, Dispatch};
pub use state::{BASELINE_HEALTH, Chart, RoomState, SETTINGS_BLACKLIST};
