//! Room configuration and phase state machine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// Configuration shared by every room of a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Capacity outside party mode.
    pub base_capacity: usize,

    /// Capacity in party mode.
    pub party_capacity: usize,

    /// How long a session that dropped without leaving is held open.
    pub reconnect_grace: Duration,

    /// Interval between `ping` broadcasts. Zero disables pinging.
    pub ping_interval: Duration,

    /// Interval of the liveness sweep. Zero disables the sweep.
    pub sweep_interval: Duration,

    /// A connected session silent for longer than this is evicted by the
    /// next sweep.
    pub liveness_timeout: Duration,

    /// Delay before a joining session receives its second `checkChart`.
    pub chart_recheck_delay: Duration,

    /// Command channel size of each room actor.
    pub channel_size: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            base_capacity: 2,
            party_capacity: 8,
            reconnect_grace: Duration::from_secs(20),
            ping_interval: Duration::from_secs(3),
            sweep_interval: Duration::from_secs(10),
            liveness_timeout: Duration::from_secs(10),
            chart_recheck_delay: Duration::from_secs(1),
            channel_size: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Where a room is in its song cycle.
///
/// ```text
/// Forming → AwaitingChart → AwaitingReady → Playing → Ending
///    ↑            ↑               │                      │
///    └────────────┴───────────────┴──────────────────────┘
/// ```
///
/// - **Forming**: no chart selected yet.
/// - **AwaitingChart**: a chart is selected, not every player has it.
/// - **AwaitingReady**: every player holds the chart; waiting on ready-ups.
/// - **Playing**: scores and vitality move.
/// - **Ending**: the song just ended; the next pregame action settles the
///   room back into one of the first three phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Forming,
    AwaitingChart,
    AwaitingReady,
    Playing,
    Ending,
}

impl Phase {
    pub fn is_playing(self) -> bool {
        matches!(self, Self::Playing)
    }

    /// Phase of a room that is not playing, derived from the chart flags.
    pub fn pregame(chart_selected: bool, everyone_has_song: bool) -> Self {
        match (chart_selected, everyone_has_song) {
            (false, _) => Self::Forming,
            (true, false) => Self::AwaitingChart,
            (true, true) => Self::AwaitingReady,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forming => write!(f, "Forming"),
            Self::AwaitingChart => write!(f, "AwaitingChart"),
            Self::AwaitingReady => write!(f, "AwaitingReady"),
            Self::Playing => write!(f, "Playing"),
            Self::Ending => write!(f, "Ending"),
        }
    }
}
