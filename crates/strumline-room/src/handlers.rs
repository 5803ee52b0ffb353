//! Message handlers. Each runs after the router has checked the payload
//! shape and the sender's privileges.

use rand::Rng;
use serde_json::Value;
use strumline_protocol::{CloseCode, NamedMessage, Recipient, Skin};

use crate::engine::RoomCore;
use crate::player::Judgment;
use crate::router::{Dispatch, Inbound};
use crate::scoring::{self, NoteEvent};
use crate::state::Chart;

pub const MAX_CHAT_LEN: usize = 300;
pub const MAX_STATUS_LEN: usize = 30;

type ChartFields = (
    String,
    String,
    i64,
    String,
    Option<String>,
    Option<String>,
    Vec<String>,
);

impl RoomCore {
    // -----------------------------------------------------------------------
    // Room toggles
    // -----------------------------------------------------------------------

    pub(crate) fn on_toggle_party(&mut self, _msg: Inbound<'_>) -> Dispatch {
        self.state.party_mode = !self.state.party_mode;
        tracing::debug!(room = %self.code, party = self.state.party_mode, "party mode toggled");
        if !self.state.party_mode {
            self.shrink_to(self.config.base_capacity);
        }
        Dispatch::Handled
    }

    pub(crate) fn on_toggle_private(&mut self, _msg: Inbound<'_>) -> Dispatch {
        self.state.is_private = !self.state.is_private;
        Dispatch::Handled
    }

    pub(crate) fn on_swap_sides(&mut self, _msg: Inbound<'_>) -> Dispatch {
        self.state.swap_sides = !self.state.swap_sides;
        Dispatch::Handled
    }

    pub(crate) fn on_anarchy_mode(&mut self, _msg: Inbound<'_>) -> Dispatch {
        self.state.anarchy_mode = !self.state.anarchy_mode;
        Dispatch::Handled
    }

    // -----------------------------------------------------------------------
    // Chart and song flow
    // -----------------------------------------------------------------------

    pub(crate) fn on_set_fsd(&mut self, msg: Inbound<'_>) -> Dispatch {
        if self.state.phase.is_playing() {
            return Dispatch::Ignored;
        }
        let Some(items) = msg.data.as_array() else {
            return Dispatch::Malformed;
        };
        let fields = Value::Array(items.iter().take(7).cloned().collect());
        let Ok((folder, song, diff, hash, mod_dir, mod_url, diff_list)) =
            serde_json::from_value::<ChartFields>(fields)
        else {
            return Dispatch::Malformed;
        };

        self.state.chart = Chart {
            folder,
            song,
            diff,
            diff_list,
            mod_dir,
            mod_url,
        };
        self.chart_hash = Some(hash);
        for (id, player) in self.state.players.iter_mut() {
            player.is_ready = false;
            player.has_song = *id == msg.session;
        }
        tracing::info!(
            room = %self.code,
            song = %self.state.chart.song,
            diff = self.state.chart.diff,
            "chart selected"
        );
        self.send(Recipient::All, NamedMessage::signal("checkChart"));
        self.settle();
        Dispatch::Handled
    }

    pub(crate) fn on_verify_chart(&mut self, msg: Inbound<'_>) -> Dispatch {
        let matches = self.chart_hash.as_deref() == msg.data.as_str();
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.has_song = matches;
        self.settle();
        Dispatch::Handled
    }

    pub(crate) fn on_start_game(&mut self, _msg: Inbound<'_>) -> Dispatch {
        if self.state.phase.is_playing() || self.state.players.is_empty() {
            return Dispatch::Ignored;
        }
        let everyone_set = self
            .state
            .players
            .values()
            .all(|p| p.is_ready && p.has_song);
        if !everyone_set {
            return Dispatch::Ignored;
        }
        self.start_song();
        Dispatch::Handled
    }

    pub(crate) fn on_player_ready(&mut self, msg: Inbound<'_>) -> Dispatch {
        let playing = self.state.phase.is_playing();
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };

        if !playing {
            player.is_ready = true;
            self.settle();
            return Dispatch::Handled;
        }

        if player.has_loaded {
            return Dispatch::Ignored;
        }
        player.has_loaded = true;
        if self.state.players.values().all(|p| p.has_loaded) {
            for player in self.state.players.values_mut() {
                player.is_ready = false;
            }
            self.send(Recipient::All, NamedMessage::signal("startSong"));
        }
        Dispatch::Handled
    }

    pub(crate) fn on_player_ended(&mut self, msg: Inbound<'_>) -> Dispatch {
        if !self.state.phase.is_playing() {
            return Dispatch::Ignored;
        }
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.has_ended = true;
        if self.state.players.values().all(|p| p.has_ended) {
            self.end_song();
        }
        Dispatch::Handled
    }

    pub(crate) fn on_request_end_song(&mut self, msg: Inbound<'_>) -> Dispatch {
        if !self.state.phase.is_playing() {
            return Dispatch::Ignored;
        }
        tracing::debug!(room = %self.code, session = %msg.session, "early song end requested");
        self.end_song();
        Dispatch::Handled
    }

    // -----------------------------------------------------------------------
    // Scoring
    // -----------------------------------------------------------------------

    pub(crate) fn on_add_score(&mut self, msg: Inbound<'_>) -> Dispatch {
        if !self.state.phase.is_playing() {
            return Dispatch::Ignored;
        }
        let Some(points) = msg
            .data
            .as_i64()
            .or_else(|| msg.data.as_f64().map(|f| f as i64))
        else {
            return Dispatch::Malformed;
        };
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.score = player.score.saturating_add(points);
        Dispatch::Handled
    }

    pub(crate) fn on_add_miss(&mut self, msg: Inbound<'_>) -> Dispatch {
        if !self.state.phase.is_playing() {
            return Dispatch::Ignored;
        }
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.misses += 1;
        Dispatch::Handled
    }

    pub(crate) fn on_add_hit_judge(&mut self, msg: Inbound<'_>) -> Dispatch {
        if !self.state.phase.is_playing() {
            return Dispatch::Ignored;
        }
        let Some(judgment) = msg.data.as_str().and_then(Judgment::parse) else {
            return Dispatch::Ignored;
        };
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.record_judgment(judgment);
        Dispatch::Handled
    }

    // -----------------------------------------------------------------------
    // Pairwise gameplay forwarding
    // -----------------------------------------------------------------------

    /// Relays a gameplay event to the opponent. Only a room with exactly two
    /// connected sessions has one.
    fn forward_pairwise(&mut self, name: &str, msg: Inbound<'_>) -> Dispatch {
        if self.state.connected_count() != 2 {
            return Dispatch::Ignored;
        }
        self.send(
            Recipient::AllExcept(msg.session),
            NamedMessage::new(name, msg.data.clone()),
        );
        Dispatch::Handled
    }

    pub(crate) fn on_strum_play(&mut self, msg: Inbound<'_>) -> Dispatch {
        self.forward_pairwise("strumPlay", msg)
    }

    pub(crate) fn on_char_play(&mut self, msg: Inbound<'_>) -> Dispatch {
        self.forward_pairwise("charPlay", msg)
    }

    pub(crate) fn on_note_hold(&mut self, msg: Inbound<'_>) -> Dispatch {
        self.forward_pairwise("noteHold", msg)
    }

    pub(crate) fn on_custom(&mut self, msg: Inbound<'_>) -> Dispatch {
        self.forward_pairwise("custom", msg)
    }

    pub(crate) fn on_note_hit(&mut self, msg: Inbound<'_>) -> Dispatch {
        self.note_event("noteHit", NoteEvent::Hit, msg)
    }

    pub(crate) fn on_note_miss(&mut self, msg: Inbound<'_>) -> Dispatch {
        self.note_event("noteMiss", NoteEvent::Miss, msg)
    }

    fn note_event(&mut self, name: &str, event: NoteEvent, msg: Inbound<'_>) -> Dispatch {
        let outcome = self.forward_pairwise(name, msg);
        if outcome != Dispatch::Handled || !self.state.phase.is_playing() {
            return outcome;
        }
        let Some(player) = self.state.players.get(&msg.session) else {
            return Dispatch::NotMember;
        };
        let owner_side = scoring::on_owner_side(
            self.state.is_owner(msg.session),
            self.state.swap_sides,
            self.state.party_mode,
            player.strum,
        );
        self.state.health = scoring::apply(self.state.health, event, owner_side);
        Dispatch::Handled
    }

    // -----------------------------------------------------------------------
    // Chat and commands
    // -----------------------------------------------------------------------

    pub(crate) fn on_chat(&mut self, msg: Inbound<'_>) -> Dispatch {
        let Some(text) = msg.data.as_str() else {
            return Dispatch::Malformed;
        };
        if text.chars().count() >= MAX_CHAT_LEN {
            self.send(
                Recipient::Session(msg.session),
                NamedMessage::new("log", "The message is too long!"),
            );
            return Dispatch::Handled;
        }
        if text.trim().is_empty() {
            return Dispatch::Ignored;
        }
        let Some(player) = self.state.players.get(&msg.session) else {
            return Dispatch::NotMember;
        };
        let line = format!("<{}>: {}", player.name, text);
        self.broadcast_log(line);
        Dispatch::Handled
    }

    pub(crate) fn on_command(&mut self, msg: Inbound<'_>) -> Dispatch {
        let command = msg
            .data
            .as_array()
            .and_then(|items| items.first())
            .and_then(Value::as_str);
        match command {
            Some("roll") => {
                let Some(player) = self.state.players.get(&msg.session) else {
                    return Dispatch::NotMember;
                };
                let roll = rand::rng().random_range(1..=6);
                let line = format!("> {} has rolled {}", player.name, roll);
                self.broadcast_log(line);
                Dispatch::Handled
            }
            Some("kick") => {
                if !self.state.is_owner(msg.session) {
                    return Dispatch::Unauthorized;
                }
                let Some(target) = self
                    .state
                    .players
                    .keys()
                    .copied()
                    .find(|id| *id != msg.session)
                else {
                    return Dispatch::Ignored;
                };
                tracing::info!(room = %self.code, session = %target, "player kicked");
                self.remove(target, Some(CloseCode::Kicked));
                Dispatch::Handled
            }
            _ => Dispatch::Ignored,
        }
    }

    // -----------------------------------------------------------------------
    // Liveness
    // -----------------------------------------------------------------------

    pub(crate) fn on_pong(&mut self, msg: Inbound<'_>) -> Dispatch {
        let rtt = self
            .last_ping_at
            .map(|sent| msg.now.saturating_duration_since(sent).as_millis() as u64)
            .unwrap_or(0);
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.ping = rtt;
        player.last_pong = msg.now;
        if self.state.owner == Some(msg.session) {
            self.listing.ping = rtt;
        }
        Dispatch::Handled
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub(crate) fn on_set_gameplay_setting(&mut self, msg: Inbound<'_>) -> Dispatch {
        let Some([name, value, ..]) = msg.data.as_array().map(Vec::as_slice) else {
            return Dispatch::Malformed;
        };
        let Some(name) = name.as_str() else {
            return Dispatch::Malformed;
        };
        if self.state.set_setting(name, value) {
            Dispatch::Handled
        } else {
            Dispatch::Ignored
        }
    }

    pub(crate) fn on_toggle_local_modifiers(&mut self, msg: Inbound<'_>) -> Dispatch {
        self.state.permit_modifiers = !self.state.permit_modifiers;
        if self.state.permit_modifiers {
            self.state.settings.clear();
        } else if let Some(Value::Object(settings)) =
            msg.data.as_array().and_then(|items| items.first())
        {
            for (name, value) in settings {
                self.state.set_setting(name, value);
            }
        }
        Dispatch::Handled
    }

    // -----------------------------------------------------------------------
    // Per-player fields
    // -----------------------------------------------------------------------

    pub(crate) fn on_set_skin(&mut self, msg: Inbound<'_>) -> Dispatch {
        let skin = match msg.data.as_array().map(Vec::as_slice) {
            Some([mod_dir, name, url, ..]) => Skin {
                mod_dir: mod_dir.as_str().map(str::to_owned),
                name: name.as_str().map(str::to_owned),
                url: url.as_str().map(str::to_owned),
            },
            _ => Skin::default(),
        };
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.skin = skin;
        Dispatch::Handled
    }

    pub(crate) fn on_status(&mut self, msg: Inbound<'_>) -> Dispatch {
        let Some(status) = msg.data.as_str() else {
            return Dispatch::Malformed;
        };
        if status.chars().count() >= MAX_STATUS_LEN {
            return Dispatch::Malformed;
        }
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.status = status.to_owned();
        Dispatch::Handled
    }

    pub(crate) fn on_set_strum(&mut self, msg: Inbound<'_>) -> Dispatch {
        let strum = match msg.data.as_u64() {
            Some(0) => 0,
            Some(1) => 1,
            _ => return Dispatch::Ignored,
        };
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.strum = strum;
        Dispatch::Handled
    }

    pub(crate) fn on_botplay(&mut self, msg: Inbound<'_>) -> Dispatch {
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.botplay = true;
        Dispatch::Handled
    }

    pub(crate) fn on_update_arrow_colors(&mut self, msg: Inbound<'_>) -> Dispatch {
        let Some([own, opponent, ..]) = msg.data.as_array().map(Vec::as_slice) else {
            return Dispatch::Malformed;
        };
        let (Some(own), Some(opponent)) = (arrow_colors(own), arrow_colors(opponent)) else {
            return Dispatch::Malformed;
        };
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        player.arrow_colors = own;
        player.arrow_colors_opponent = opponent;
        Dispatch::Handled
    }

    pub(crate) fn on_update_points(&mut self, msg: Inbound<'_>) -> Dispatch {
        let Some(player) = self.state.players.get_mut(&msg.session) else {
            return Dispatch::NotMember;
        };
        if !player.verified {
            let Some(points) = msg
                .data
                .as_i64()
                .or_else(|| msg.data.as_f64().map(|f| f as i64))
            else {
                return Dispatch::Malformed;
            };
            player.points = points;
        }
        let points = player.points;
        if self.state.owner == Some(msg.session) {
            self.listing.points = points;
        }
        Dispatch::Handled
    }
}

fn arrow_colors(value: &Value) -> Option<[i64; 4]> {
    let items = value.as_array()?;
    if items.len() < 4 {
        return None;
    }
    let mut colors = [0; 4];
    for (slot, item) in colors.iter_mut().zip(items) {
        *slot = item.as_i64()?;
    }
    Some(colors)
}

#[cfg(test)]
mod tests {
    use std::net::IpAddr;
    use std::sync::Arc;

    use serde_json::json;
    use strumline_protocol::{JoinOptions, RoomCode, SessionId};
    use strumline_session::{Admission, Identity, InMemoryPresence};
    use tokio::time::Instant;

    use super::*;
    use crate::engine::{Effect, JoinRequest};
    use crate::scoring::{HIT_DELTA, MISS_DELTA};
    use crate::{Phase, RoomConfig};

    fn room() -> RoomCore {
        RoomCore::new(
            RoomCode::from("TEST"),
            RoomConfig::default(),
            Arc::new(Admission::default()),
            Arc::new(InMemoryPresence::new()),
            &JoinOptions::default(),
        )
    }

    fn join(core: &mut RoomCore, name: &str) -> SessionId {
        let options = JoinOptions {
            name: name.into(),
            ..Default::default()
        };
        let ip = IpAddr::from([10, 0, 0, 1]);
        core.join(JoinRequest::new(options, Identity::Anonymous, ip), Instant::now())
            .unwrap()
            .session
    }

    fn send(core: &mut RoomCore, session: SessionId, name: &str, data: Value) -> Dispatch {
        core.handle(session, &NamedMessage::new(name, data), Instant::now())
    }

    fn messages(core: &mut RoomCore) -> Vec<(Recipient, NamedMessage)> {
        core.take_effects()
            .into_iter()
            .filter_map(|e| match e {
                Effect::Send { to, message } => Some((to, message)),
                _ => None,
            })
            .collect()
    }

    fn fsd(hash: &str) -> Value {
        json!(["week1", "bopeebo", 2, hash, null, null, ["easy", "normal", "hard"]])
    }

    /// Two players, chart selected and verified, both ready.
    fn ready_pair() -> (RoomCore, SessionId, SessionId) {
        let mut core = room();
        let owner = join(&mut core, "alice");
        let guest = join(&mut core, "bob");
        assert_eq!(send(&mut core, owner, "setFSD", fsd("h1")), Dispatch::Handled);
        assert_eq!(core.state().phase, Phase::AwaitingChart);
        send(&mut core, owner, "verifyChart", json!("h1"));
        send(&mut core, guest, "verifyChart", json!("h1"));
        assert_eq!(core.state().phase, Phase::AwaitingReady);
        send(&mut core, owner, "playerReady", Value::Null);
        send(&mut core, guest, "playerReady", Value::Null);
        core.take_effects();
        (core, owner, guest)
    }

    #[test]
    fn test_full_round_owner_miss_lowers_vitality() {
        let (mut core, owner, guest) = ready_pair();
        assert_eq!(send(&mut core, guest, "startGame", Value::Null), Dispatch::Handled);
        assert_eq!(core.state().phase, Phase::Playing);
        assert_eq!(core.state().health, 1.0);
        for player in core.state().players.values() {
            assert_eq!((player.score, player.misses, player.sicks), (0, 0, 0));
        }
        assert!(messages(&mut core)
            .iter()
            .any(|(to, m)| *to == Recipient::All && m.name == "gameStarted"));

        send(&mut core, owner, "noteMiss", json!([0, 1, 2]));
        assert!((core.state().health - (1.0 - MISS_DELTA)).abs() < 1e-9);

        let forwarded = messages(&mut core);
        assert_eq!(
            forwarded,
            [(
                Recipient::AllExcept(owner),
                NamedMessage::new("noteMiss", json!([0, 1, 2]))
            )]
        );

        for _ in 0..100 {
            send(&mut core, owner, "noteMiss", json!([0, 1, 2]));
        }
        assert_eq!(core.state().health, 0.0);
    }

    #[test]
    fn test_guest_hit_lowers_vitality() {
        let (mut core, _owner, guest) = ready_pair();
        send(&mut core, guest, "startGame", Value::Null);
        send(&mut core, guest, "noteHit", json!([0, 1, 2]));
        assert!((core.state().health - (1.0 - HIT_DELTA)).abs() < 1e-9);
    }

    #[test]
    fn test_start_game_requires_everyone_ready() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        let guest = join(&mut core, "bob");
        send(&mut core, owner, "setFSD", fsd("h1"));
        send(&mut core, guest, "verifyChart", json!("other"));
        send(&mut core, owner, "playerReady", Value::Null);
        send(&mut core, guest, "playerReady", Value::Null);

        assert_eq!(send(&mut core, owner, "startGame", Value::Null), Dispatch::Ignored);
        assert_eq!(core.state().phase, Phase::AwaitingChart);
    }

    #[test]
    fn test_set_fsd_requires_host() {
        let mut core = room();
        let _owner = join(&mut core, "alice");
        let guest = join(&mut core, "bob");
        assert_eq!(
            send(&mut core, guest, "setFSD", fsd("h1")),
            Dispatch::Unauthorized
        );
        assert_eq!(core.state().phase, Phase::Forming);

        core.state.anarchy_mode = true;
        assert_eq!(send(&mut core, guest, "setFSD", fsd("h1")), Dispatch::Handled);
        assert!(core.state().players[&guest].has_song);
    }

    #[test]
    fn test_set_fsd_short_or_mistyped_payload_dropped() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        assert_eq!(
            send(&mut core, owner, "setFSD", json!(["a", "b", 1, "h"])),
            Dispatch::Malformed
        );
        assert_eq!(
            send(&mut core, owner, "setFSD", json!(["a", "b", "hard", "h", null, null, []])),
            Dispatch::Malformed
        );
        assert!(core.chart_hash.is_none());
    }

    #[test]
    fn test_scoring_only_while_playing() {
        let (mut core, owner, _guest) = ready_pair();
        assert_eq!(send(&mut core, owner, "addScore", json!(350)), Dispatch::Ignored);
        assert_eq!(send(&mut core, owner, "addMiss", Value::Null), Dispatch::Ignored);
        assert_eq!(core.state().players[&owner].score, 0);

        send(&mut core, owner, "startGame", Value::Null);
        send(&mut core, owner, "addScore", json!(350));
        send(&mut core, owner, "addScore", json!(150));
        send(&mut core, owner, "addMiss", Value::Null);
        send(&mut core, owner, "addHitJudge", json!("sick"));
        send(&mut core, owner, "addHitJudge", json!("bogus"));

        let player = &core.state().players[&owner];
        assert_eq!(player.score, 500);
        assert_eq!(player.misses, 1);
        assert_eq!(player.sicks, 1);
    }

    #[test]
    fn test_player_ready_during_song_starts_when_all_loaded() {
        let (mut core, owner, guest) = ready_pair();
        send(&mut core, owner, "startGame", Value::Null);
        core.take_effects();

        send(&mut core, owner, "playerReady", Value::Null);
        assert!(messages(&mut core).is_empty());
        send(&mut core, guest, "playerReady", Value::Null);
        assert!(messages(&mut core)
            .iter()
            .any(|(_, m)| m.name == "startSong"));
    }

    #[test]
    fn test_song_ends_when_everyone_ended() {
        let (mut core, owner, guest) = ready_pair();
        send(&mut core, owner, "startGame", Value::Null);
        send(&mut core, owner, "botplay", Value::Null);
        send(&mut core, owner, "playerEnded", Value::Null);
        assert_eq!(core.state().phase, Phase::Playing);
        send(&mut core, guest, "playerEnded", Value::Null);
        assert_eq!(core.state().phase, Phase::Ending);
        assert!(!core.state().players[&owner].botplay);

        // The next pregame action settles the room.
        send(&mut core, guest, "verifyChart", json!("h1"));
        assert_eq!(core.state().phase, Phase::AwaitingReady);
    }

    #[test]
    fn test_request_end_song_from_anyone() {
        let (mut core, owner, guest) = ready_pair();
        assert_eq!(
            send(&mut core, guest, "requestEndSong", Value::Null),
            Dispatch::Ignored
        );
        send(&mut core, owner, "startGame", Value::Null);
        assert_eq!(
            send(&mut core, guest, "requestEndSong", Value::Null),
            Dispatch::Handled
        );
        assert_eq!(core.state().phase, Phase::Ending);
    }

    #[test]
    fn test_pairwise_forwarding_suppressed_when_alone() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        core.take_effects();
        assert_eq!(
            send(&mut core, owner, "strumPlay", json!([1, 2, 3])),
            Dispatch::Ignored
        );
        assert!(messages(&mut core).is_empty());
    }

    #[test]
    fn test_forwarding_shapes_enforced() {
        let (mut core, owner, _guest) = ready_pair();
        assert_eq!(
            send(&mut core, owner, "strumPlay", json!([1, 2])),
            Dispatch::Malformed
        );
        assert_eq!(send(&mut core, owner, "noteHold", json!(1)), Dispatch::Malformed);
        assert_eq!(send(&mut core, owner, "noteHold", json!(true)), Dispatch::Handled);
        assert_eq!(send(&mut core, owner, "charPlay", json!(["idle"])), Dispatch::Handled);
    }

    #[test]
    fn test_chat_broadcasts_with_name() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        core.take_effects();

        send(&mut core, owner, "chat", json!("hello"));
        assert_eq!(
            messages(&mut core),
            [(Recipient::All, NamedMessage::new("log", "<alice>: hello"))]
        );
    }

    #[test]
    fn test_chat_too_long_or_blank() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        core.take_effects();

        send(&mut core, owner, "chat", json!("x".repeat(300)));
        assert_eq!(
            messages(&mut core),
            [(
                Recipient::Session(owner),
                NamedMessage::new("log", "The message is too long!")
            )]
        );

        assert_eq!(send(&mut core, owner, "chat", json!("   ")), Dispatch::Ignored);
        assert_eq!(send(&mut core, owner, "chat", json!(5)), Dispatch::Malformed);
    }

    #[test]
    fn test_toggle_party_shrink_evicts_latest_non_owners() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        assert_eq!(send(&mut core, owner, "toggleParty", Value::Null), Dispatch::Handled);
        assert_eq!(core.capacity(), 8);
        let b = join(&mut core, "bob");
        let c = join(&mut core, "carol");
        let d = join(&mut core, "dave");
        core.take_effects();

        send(&mut core, owner, "toggleParty", Value::Null);
        assert_eq!(core.capacity(), 2);
        let remaining: Vec<SessionId> = core.state().players.keys().copied().collect();
        assert_eq!(remaining, [owner, b]);

        let closes: Vec<Effect> = core
            .take_effects()
            .into_iter()
            .filter(|e| matches!(e, Effect::Close { .. }))
            .collect();
        assert_eq!(
            closes,
            [
                Effect::Close { session: d, code: CloseCode::Kicked },
                Effect::Close { session: c, code: CloseCode::Kicked },
            ]
        );
    }

    #[test]
    fn test_toggle_party_owner_only_even_in_anarchy() {
        let mut core = room();
        let _owner = join(&mut core, "alice");
        let guest = join(&mut core, "bob");
        core.state.anarchy_mode = true;
        assert_eq!(
            send(&mut core, guest, "toggleParty", Value::Null),
            Dispatch::Unauthorized
        );
        assert_eq!(
            send(&mut core, guest, "togglePrivate", Value::Null),
            Dispatch::Unauthorized
        );
        assert_eq!(send(&mut core, guest, "swapSides", Value::Null), Dispatch::Handled);
    }

    #[test]
    fn test_kick_removes_other_player() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        let guest = join(&mut core, "bob");
        assert_eq!(
            send(&mut core, guest, "command", json!(["kick"])),
            Dispatch::Unauthorized
        );
        assert_eq!(send(&mut core, owner, "command", json!(["kick"])), Dispatch::Handled);
        assert!(!core.state().players.contains_key(&guest));
        assert!(core.take_effects().contains(&Effect::Close {
            session: guest,
            code: CloseCode::Kicked
        }));
    }

    #[test]
    fn test_roll_broadcasts_result() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        core.take_effects();
        send(&mut core, owner, "command", json!(["roll"]));
        let sent = messages(&mut core);
        let text = sent[0].1.data.as_str().unwrap().to_owned();
        assert!(text.starts_with("> alice has rolled "));
        let roll: u32 = text.rsplit(' ').next().unwrap().parse().unwrap();
        assert!((1..=6).contains(&roll));
    }

    #[test]
    fn test_gameplay_settings() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        let guest = join(&mut core, "bob");

        send(&mut core, owner, "setGameplaySetting", json!(["scrollspeed", 2.5]));
        send(&mut core, owner, "setGameplaySetting", json!(["instakill", true]));
        assert_eq!(
            send(&mut core, guest, "setGameplaySetting", json!(["songspeed", 2])),
            Dispatch::Unauthorized
        );
        assert_eq!(core.state().settings.len(), 1);
        assert_eq!(core.state().settings["scrollspeed"], "2.5");

        send(&mut core, owner, "toggleLocalModifiers", Value::Null);
        assert!(core.state().permit_modifiers);
        assert!(core.state().settings.is_empty());

        send(
            &mut core,
            owner,
            "toggleLocalModifiers",
            json!([{"healthgain": 1, "practice": true}]),
        );
        assert!(!core.state().permit_modifiers);
        assert_eq!(core.state().settings.len(), 1);
        assert_eq!(core.state().settings["healthgain"], "1");
    }

    #[test]
    fn test_per_player_updates() {
        let mut core = room();
        let owner = join(&mut core, "alice");

        send(&mut core, owner, "setSkin", json!(["mods/x", "bf-pixel", "https://skins"]));
        assert_eq!(core.state().players[&owner].skin.name.as_deref(), Some("bf-pixel"));
        send(&mut core, owner, "setSkin", json!(["only-one"]));
        assert_eq!(core.state().players[&owner].skin, Skin::default());

        send(&mut core, owner, "status", json!("In menus"));
        assert_eq!(
            send(&mut core, owner, "status", json!("x".repeat(30))),
            Dispatch::Malformed
        );
        assert_eq!(core.state().players[&owner].status, "In menus");

        send(&mut core, owner, "setStrum", json!(1));
        assert_eq!(send(&mut core, owner, "setStrum", json!(2)), Dispatch::Ignored);
        assert_eq!(core.state().players[&owner].strum, 1);

        send(&mut core, owner, "updateArrColors", json!([[1, 2, 3, 4], [5, 6, 7, 8]]));
        assert_eq!(
            send(&mut core, owner, "updateArrColors", json!([[1, 2], [5, 6, 7, 8]])),
            Dispatch::Malformed
        );
        assert_eq!(core.state().players[&owner].arrow_colors, [1, 2, 3, 4]);
        assert_eq!(core.state().players[&owner].arrow_colors_opponent, [5, 6, 7, 8]);

        send(&mut core, owner, "updateFP", json!(1234));
        assert_eq!(core.state().players[&owner].points, 1234);
        assert_eq!(core.listing().0.points, 1234);
    }

    #[test]
    fn test_update_points_ignored_for_verified() {
        let mut core = room();
        let seat = core
            .join(
                JoinRequest::new(
                    JoinOptions::default(),
                    Identity::Verified {
                        account_id: "acc".into(),
                        name: "Verified".into(),
                        points: 50,
                    },
                    IpAddr::from([10, 0, 0, 2]),
                ),
                Instant::now(),
            )
            .unwrap();
        send(&mut core, seat.session, "updateFP", json!(9999));
        assert_eq!(core.state().players[&seat.session].points, 50);
    }

    #[test]
    fn test_pong_measures_round_trip() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        let sent = Instant::now();
        core.tick_ping(sent);
        core.handle(
            owner,
            &NamedMessage::signal("pong"),
            sent + std::time::Duration::from_millis(42),
        );
        assert_eq!(core.state().players[&owner].ping, 42);
        assert_eq!(core.listing().0.ping, 42);
    }

    #[test]
    fn test_unknown_message_dropped() {
        let mut core = room();
        let owner = join(&mut core, "alice");
        assert_eq!(send(&mut core, owner, "selfDestruct", Value::Null), Dispatch::Unknown);
        assert_eq!(
            send(&mut core, SessionId(u64::MAX), "chat", json!("hi")),
            Dispatch::NotMember
        );
    }
}
