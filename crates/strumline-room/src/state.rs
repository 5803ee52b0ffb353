//! The replicated room state.
//!
//! Everything in [`RoomState`] is visible to clients: it is serialized
//! whole on join and diffed after every processed event.

use std::collections::BTreeMap;

use serde::Serialize;
use strumline_protocol::SessionId;

use crate::{Phase, Player};

/// Gameplay settings clients may not set room-wide.
pub const SETTINGS_BLACKLIST: &[&str] = &["instakill", "practice", "opponentplay"];

/// Vitality at the start of every song.
pub const BASELINE_HEALTH: f64 = 1.0;

/// Descriptor of the selected chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub folder: String,
    pub song: String,
    pub diff: i64,
    pub diff_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomState {
    pub chart: Chart,
    pub is_private: bool,
    pub phase: Phase,
    pub swap_sides: bool,
    pub anarchy_mode: bool,
    pub party_mode: bool,
    pub permit_modifiers: bool,
    pub health: f64,
    pub settings: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<SessionId>,
    /// Keyed by session id; ids grow monotonically, so iteration order is
    /// join order.
    pub players: BTreeMap<SessionId, Player>,
}

impl RoomState {
    pub fn new(is_private: bool) -> Self {
        Self {
            chart: Chart::default(),
            is_private,
            phase: Phase::Forming,
            swap_sides: false,
            anarchy_mode: false,
            party_mode: false,
            permit_modifiers: false,
            health: BASELINE_HEALTH,
            settings: BTreeMap::new(),
            owner: None,
            players: BTreeMap::new(),
        }
    }

    pub fn is_owner(&self, session: SessionId) -> bool {
        self.owner == Some(session)
    }

    /// Owner, or anyone while anarchy mode is on.
    pub fn is_host(&self, session: SessionId) -> bool {
        self.anarchy_mode || self.is_owner(session)
    }

    pub fn connected_count(&self) -> usize {
        self.players.values().filter(|p| p.is_connected()).count()
    }

    /// Stores a gameplay setting unless its name is reserved.
    ///
    /// Returns whether the value was stored.
    pub fn set_setting(&mut self, name: &str, value: &serde_json::Value) -> bool {
        if SETTINGS_BLACKLIST.contains(&name) {
            return false;
        }
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.settings.insert(name.to_owned(), value);
        true
    }
}
