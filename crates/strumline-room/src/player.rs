//! Per-session player record.

use serde::Serialize;
use strumline_protocol::Skin;
use strumline_session::IpSlot;
use tokio::time::Instant;

/// Hit judgment tiers, best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Judgment {
    Sick,
    Good,
    Bad,
    Shit,
}

impl Judgment {
    pub fn parse(tier: &str) -> Option<Self> {
        match tier {
            "sick" => Some(Self::Sick),
            "good" => Some(Self::Good),
            "bad" => Some(Self::Bad),
            "shit" => Some(Self::Shit),
            _ => None,
        }
    }
}

/// Whether the session behind a player is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Connected,
    /// Dropped without leaving; held for the reconnect grace window.
    Disconnected { since: Instant },
}

/// One seat in a room.
///
/// Serialized as part of the replicated room state. Connection-side
/// bookkeeping (IP slot, token, liveness clock) never leaves the server.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    pub verified: bool,
    pub points: i64,

    pub score: i64,
    pub misses: u32,
    pub sicks: u32,
    pub goods: u32,
    pub bads: u32,
    pub shits: u32,

    pub has_song: bool,
    pub is_ready: bool,
    pub has_loaded: bool,
    pub has_ended: bool,
    pub botplay: bool,

    pub strum: u8,
    pub skin: Skin,
    pub arrow_colors: [i64; 4],
    pub arrow_colors_opponent: [i64; 4],
    pub status: String,
    /// Last measured round-trip time in milliseconds.
    pub ping: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,

    #[serde(skip)]
    pub account_id: Option<String>,
    /// Name registered with the presence registry, if verified.
    #[serde(skip)]
    pub(crate) registered_name: Option<String>,
    #[serde(skip)]
    pub presence: Presence,
    #[serde(skip)]
    pub last_pong: Instant,
    #[serde(skip)]
    pub reconnect_token: String,
    #[serde(skip)]
    pub(crate) ip_slot: Option<IpSlot>,
}

impl Player {
    pub(crate) fn new(name: String, reconnect_token: String, now: Instant) -> Self {
        Self {
            name,
            verified: false,
            points: 0,
            score: 0,
            misses: 0,
            sicks: 0,
            goods: 0,
            bads: 0,
            shits: 0,
            has_song: false,
            is_ready: false,
            has_loaded: false,
            has_ended: false,
            botplay: false,
            strum: 0,
            skin: Skin::default(),
            arrow_colors: [0; 4],
            arrow_colors_opponent: [0; 4],
            status: String::new(),
            ping: 0,
            country: None,
            account_id: None,
            registered_name: None,
            presence: Presence::Connected,
            last_pong: now,
            reconnect_token,
            ip_slot: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.presence, Presence::Connected)
    }

    /// Clears everything a new song starts from.
    pub fn reset_for_song(&mut self) {
        self.score = 0;
        self.misses = 0;
        self.sicks = 0;
        self.goods = 0;
        self.bads = 0;
        self.shits = 0;
        self.has_loaded = false;
        self.has_ended = false;
        self.is_ready = false;
    }

    pub fn record_judgment(&mut self, judgment: Judgment) {
        let counter = match judgment {
            Judgment::Sick => &mut self.sicks,
            Judgment::Good => &mut self.goods,
            Judgment::Bad => &mut self.bads,
            Judgment::Shit => &mut self.shits,
        };
        *counter += 1;
    }
}
