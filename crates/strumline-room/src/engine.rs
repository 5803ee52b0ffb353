//! Synchronous room logic.
//!
//! [`RoomCore`] owns the replicated [`RoomState`] and every rule that
//! mutates it. It never touches a channel or a timer: outcomes that leave
//! the room are queued as [`Effect`]s, which the actor drains after each
//! event. Time comes in as an argument, so tests drive it directly.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use strumline_protocol::{
    CloseCode, JoinErrorCode, JoinOptions, NamedMessage, Recipient, RoomCode, RoomListing,
    SessionId,
};
use strumline_session::{
    Admission, Identity, IpSlot, PresenceRegistry, generate_reconnect_token,
};
use tokio::time::Instant;

use crate::names::dedupe_name;
use crate::player::{Player, Presence};
use crate::router::{self, Dispatch, Inbound};
use crate::state::{BASELINE_HEALTH, RoomState};
use crate::{Phase, RoomConfig};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
}

/// Something the room wants done outside its state.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Deliver a named message to connected sessions.
    Send { to: Recipient, message: NamedMessage },
    /// Close one session's connection with a code.
    Close { session: SessionId, code: CloseCode },
    /// Re-send `checkChart` to a session after the recheck delay.
    ScheduleChartCheck(SessionId),
}

/// A validated join attempt.
#[derive(Debug)]
pub struct JoinRequest {
    pub options: JoinOptions,
    pub identity: Identity,
    pub ip: IpAddr,
    /// A slot reserved by the caller. When absent the room reserves one.
    pub slot: Option<IpSlot>,
}

impl JoinRequest {
    pub fn new(options: JoinOptions, identity: Identity, ip: IpAddr) -> Self {
        Self {
            options,
            identity,
            ip,
            slot: None,
        }
    }
}

/// What a successful join hands back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    pub session: SessionId,
    pub reconnect_token: String,
}

#[derive(Debug, Default)]
pub(crate) struct ListingMeta {
    pub(crate) name: String,
    pub(crate) ping: u64,
    pub(crate) points: i64,
}

pub struct RoomCore {
    pub(crate) code: RoomCode,
    pub(crate) config: RoomConfig,
    admission: Arc<Admission>,
    presence: Arc<dyn PresenceRegistry>,
    pub(crate) state: RoomState,
    pub(crate) chart_hash: Option<String>,
    pub(crate) listing: ListingMeta,
    pub(crate) last_ping_at: Option<Instant>,
    effects: Vec<Effect>,
    closing: Option<CloseCode>,
}

impl RoomCore {
    /// Creates an empty room from its creator's join options.
    ///
    /// Visibility, initial gameplay settings and the listing name come from
    /// the creator; the creator still has to [`join`](Self::join).
    pub fn new(
        code: RoomCode,
        config: RoomConfig,
        admission: Arc<Admission>,
        presence: Arc<dyn PresenceRegistry>,
        creator: &JoinOptions,
    ) -> Self {
        let mut state = RoomState::new(!creator.public);
        for (name, value) in &creator.gameplay_settings {
            state.set_setting(name, value);
        }
        Self {
            code,
            config,
            admission,
            presence,
            state,
            chart_hash: None,
            listing: ListingMeta {
                name: creator.name.clone(),
                ..Default::default()
            },
            last_ping_at: None,
            effects: Vec::new(),
            closing: None,
        }
    }

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn state(&self) -> &RoomState {
        &self.state
    }

    pub fn capacity(&self) -> usize {
        if self.state.party_mode {
            self.config.party_capacity
        } else {
            self.config.base_capacity
        }
    }

    /// Set once the room should be torn down.
    pub fn closing(&self) -> Option<CloseCode> {
        self.closing
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    pub fn snapshot(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(&self.state)
    }

    /// Listing metadata and whether the room is private.
    pub fn listing(&self) -> (RoomListing, bool) {
        let listing = RoomListing {
            code: self.code.clone(),
            name: self.listing.name.clone(),
            players: self.state.players.len(),
            capacity: self.capacity(),
            ping: self.listing.ping,
            points: self.listing.points,
        };
        (listing, self.state.is_private)
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Seats a new player.
    ///
    /// Capacity and IP quota are checked before anything is mutated.
    pub fn join(&mut self, request: JoinRequest, now: Instant) -> Result<Seat, JoinErrorCode> {
        if self.state.players.len() >= self.capacity() {
            return Err(JoinErrorCode::RoomFull);
        }
        let slot = match request.slot {
            Some(slot) => slot,
            None => self
                .admission
                .reserve(request.ip)
                .ok_or(JoinErrorCode::IpLimitExceeded)?,
        };

        let options = request.options;
        let (requested_name, points, account) = match request.identity {
            Identity::Verified {
                account_id,
                name,
                points,
            } => (name.clone(), points, Some((account_id, name))),
            Identity::Anonymous => (options.name.clone(), options.points.unwrap_or(0), None),
        };
        let name = dedupe_name(
            &requested_name,
            self.state.players.values().map(|p| p.name.as_str()),
        );

        let session = next_session_id();
        let reconnect_token = generate_reconnect_token();
        let mut player = Player::new(name.clone(), reconnect_token.clone(), now);
        player.points = points;
        player.skin = options.skin;
        player.arrow_colors = options.arrow_colors;
        player.arrow_colors_opponent = options.arrow_colors_opponent;
        player.ip_slot = Some(slot);
        if let Some((account_id, account_name)) = account {
            self.presence.insert(&account_name);
            player.verified = true;
            player.account_id = Some(account_id);
            player.registered_name = Some(account_name);
        }
        self.state.players.insert(session, player);

        if self.state.owner.is_none() {
            self.state.owner = Some(session);
            self.listing.points = points;
        }

        tracing::info!(
            room = %self.code,
            %session,
            %name,
            ip = %request.ip,
            players = self.state.players.len(),
            "player joined"
        );

        self.broadcast_log(format!("{name} has joined the room!"));
        self.send(Recipient::Session(session), NamedMessage::signal("checkChart"));
        self.effects.push(Effect::ScheduleChartCheck(session));
        self.settle();

        Ok(Seat {
            session,
            reconnect_token,
        })
    }

    /// Re-attaches a held session.
    pub fn resume(
        &mut self,
        session: SessionId,
        token: &str,
        now: Instant,
    ) -> Result<(), JoinErrorCode> {
        let player = self
            .state
            .players
            .get_mut(&session)
            .ok_or(JoinErrorCode::ReconnectRejected)?;
        if player.is_connected() || player.reconnect_token != token {
            return Err(JoinErrorCode::ReconnectRejected);
        }
        player.presence = Presence::Connected;
        player.last_pong = now;
        tracing::info!(room = %self.code, %session, "session resumed");
        Ok(())
    }

    /// Handles a dropped connection.
    ///
    /// Returns `true` when the session is now held for the grace window.
    pub fn disconnect(&mut self, session: SessionId, consented: bool, now: Instant) -> bool {
        if !self.state.players.contains_key(&session) {
            return false;
        }
        if consented || self.config.reconnect_grace.is_zero() {
            self.remove(session, None);
            return false;
        }
        if let Some(player) = self.state.players.get_mut(&session) {
            player.presence = Presence::Disconnected { since: now };
        }
        tracing::info!(room = %self.code, %session, "session held for reconnect");
        true
    }

    /// Removes a session whose grace window ran out, unless it came back.
    pub fn grace_expired(&mut self, session: SessionId) {
        let held = self
            .state
            .players
            .get(&session)
            .is_some_and(|p| !p.is_connected());
        if held {
            tracing::info!(room = %self.code, %session, "reconnect grace expired");
            self.remove(session, None);
        }
    }

    /// Fully removes a player, optionally closing its connection.
    pub fn remove(&mut self, session: SessionId, code: Option<CloseCode>) {
        let Some(player) = self.state.players.remove(&session) else {
            return;
        };
        if let Some(name) = &player.registered_name {
            self.presence.remove(name);
        }

        for other in self.state.players.values_mut() {
            other.is_ready = false;
        }

        if self.state.owner == Some(session) {
            self.transfer_ownership();
        }

        tracing::info!(
            room = %self.code,
            %session,
            name = %player.name,
            players = self.state.players.len(),
            "player left"
        );

        self.broadcast_log(format!("{} has left the room!", player.name));
        if let Some(code) = code {
            self.effects.push(Effect::Close { session, code });
        }

        if self.state.phase.is_playing()
            && !self.state.players.is_empty()
            && self.state.players.values().all(|p| p.has_ended)
        {
            self.end_song();
        }
        self.settle();

        if self.state.players.is_empty() {
            self.mark_closing(CloseCode::Normal);
        }
    }

    fn transfer_ownership(&mut self) {
        let next = self
            .state
            .players
            .iter()
            .find(|(_, p)| p.is_connected())
            .or_else(|| self.state.players.iter().next())
            .map(|(id, p)| (*id, p.points, p.ping));

        self.state.owner = next.map(|(id, _, _)| id);
        if let Some((owner, points, ping)) = next {
            self.listing.points = points;
            self.listing.ping = ping;
            tracing::info!(room = %self.code, %owner, "ownership transferred");
        }
    }

    /// Marks the room for teardown with `code`.
    pub fn shutdown(&mut self, code: CloseCode) {
        self.mark_closing(code);
    }

    /// Drops every player, releasing their IP slots and presence entries.
    pub fn dispose(&mut self) {
        for (_, player) in std::mem::take(&mut self.state.players) {
            if let Some(name) = &player.registered_name {
                self.presence.remove(name);
            }
        }
        self.state.owner = None;
        self.mark_closing(CloseCode::Normal);
    }

    // -----------------------------------------------------------------------
    // Timers
    // -----------------------------------------------------------------------

    pub fn tick_ping(&mut self, now: Instant) {
        self.last_ping_at = Some(now);
        self.send(Recipient::All, NamedMessage::new("ping", Value::Null));
    }

    /// Evicts silent sessions, or marks the room closing if nobody is
    /// connected.
    pub fn sweep(&mut self, now: Instant) {
        if self.state.connected_count() == 0 {
            tracing::info!(room = %self.code, "no connected sessions, closing room");
            self.mark_closing(CloseCode::Normal);
            return;
        }

        let timeout = self.config.liveness_timeout;
        let stale: Vec<SessionId> = self
            .state
            .players
            .iter()
            .filter(|(_, p)| {
                p.is_connected() && now.saturating_duration_since(p.last_pong) > timeout
            })
            .map(|(id, _)| *id)
            .collect();

        for session in stale {
            tracing::warn!(room = %self.code, %session, "liveness timeout, evicting");
            self.remove(session, Some(CloseCode::TimedOut));
        }
    }

    pub fn chart_check(&mut self, session: SessionId) {
        let connected = self
            .state
            .players
            .get(&session)
            .is_some_and(Player::is_connected);
        if connected {
            self.send(Recipient::Session(session), NamedMessage::signal("checkChart"));
        }
    }

    pub fn set_country(&mut self, session: SessionId, country: String) {
        if let Some(player) = self.state.players.get_mut(&session) {
            player.country = Some(country);
        }
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Routes one in-room message from a connected session.
    pub fn handle(&mut self, session: SessionId, message: &NamedMessage, now: Instant) -> Dispatch {
        let connected = self
            .state
            .players
            .get(&session)
            .is_some_and(Player::is_connected);
        if !connected {
            return Dispatch::NotMember;
        }
        router::dispatch(
            self,
            &message.name,
            Inbound {
                session,
                data: &message.data,
                now,
            },
        )
    }

    // -----------------------------------------------------------------------
    // Helpers shared with the handlers
    // -----------------------------------------------------------------------

    fn mark_closing(&mut self, code: CloseCode) {
        if self.closing.is_none() {
            self.closing = Some(code);
        }
    }

    pub(crate) fn send(&mut self, to: Recipient, message: NamedMessage) {
        self.effects.push(Effect::Send { to, message });
    }

    pub(crate) fn broadcast_log(&mut self, text: String) {
        self.send(Recipient::All, NamedMessage::new("log", text));
    }

    /// Re-derives the pregame phase from the chart flags. No-op while
    /// playing.
    pub(crate) fn settle(&mut self) {
        if self.state.phase.is_playing() {
            return;
        }
        let everyone_has_song = !self.state.players.is_empty()
            && self.state.players.values().all(|p| p.has_song);
        let next = Phase::pregame(self.chart_hash.is_some(), everyone_has_song);
        if next != self.state.phase {
            tracing::debug!(room = %self.code, from = %self.state.phase, to = %next, "phase changed");
            self.state.phase = next;
        }
    }

    pub(crate) fn start_song(&mut self) {
        for player in self.state.players.values_mut() {
            player.reset_for_song();
        }
        self.state.health = BASELINE_HEALTH;
        self.state.phase = Phase::Playing;
        tracing::info!(room = %self.code, players = self.state.players.len(), "game started");
        self.send(Recipient::All, NamedMessage::signal("gameStarted"));
    }

    pub(crate) fn end_song(&mut self) {
        for player in self.state.players.values_mut() {
            player.is_ready = false;
            player.botplay = false;
        }
        self.state.phase = Phase::Ending;
        tracing::info!(room = %self.code, "song ended");
        self.send(Recipient::All, NamedMessage::signal("endSong"));
    }

    /// Evicts the latest-joined non-owners until `capacity` is met.
    pub(crate) fn shrink_to(&mut self, capacity: usize) {
        let owner = self.state.owner;
        let excess = self.state.players.len().saturating_sub(capacity);
        let evicted: Vec<SessionId> = self
            .state
            .players
            .keys()
            .rev()
            .filter(|id| Some(**id) != owner)
            .take(excess)
            .copied()
            .collect();
        for session in evicted {
            self.remove(session, Some(CloseCode::Kicked));
        }
    }
}
