//! Room actor: an isolated Tokio task that owns one [`RoomCore`].
//!
//! All mutations of a room (joins, messages, disconnects, timer events)
//! arrive through one mpsc channel and are processed one at a time. After
//! each event the actor diffs the replicated state, pushes the patch to
//! synced sessions, then delivers the queued effects.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use strumline_protocol::{CloseCode, NamedMessage, RoomCode, RoomListing, SessionId};
use strumline_tick::Ticker;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::engine::{Effect, JoinRequest, RoomCore, Seat};
use crate::manager::RoomContext;
use crate::patch;
use crate::router::Dispatch;
use crate::RoomError;

/// An outbound event from the room actor to a session's connection handler.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomOutbound {
    /// Full state snapshot (sent on join and resume).
    State(Value),
    /// Changes since the previous snapshot.
    Patch(Value),
    Message(NamedMessage),
    /// The room closed this session. Nothing follows.
    Close(CloseCode),
}

/// Channel sender for delivering outbound events to a session.
pub type SessionSender = mpsc::UnboundedSender<RoomOutbound>;

/// Commands sent to a room actor through its channel.
pub(crate) enum RoomCommand {
    Join {
        request: JoinRequest,
        sender: SessionSender,
        reply: oneshot::Sender<Result<Seat, RoomError>>,
    },
    Reconnect {
        session: SessionId,
        token: String,
        sender: SessionSender,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },
    Message {
        session: SessionId,
        message: NamedMessage,
    },
    Disconnected {
        session: SessionId,
        consented: bool,
    },
    GraceExpired {
        session: SessionId,
    },
    ChartCheck {
        session: SessionId,
    },
    GeoResolved {
        session: SessionId,
        country: String,
    },
    Listing {
        reply: oneshot::Sender<(RoomListing, bool)>,
    },
    Shutdown {
        code: CloseCode,
    },
}

/// Handle to a running room actor.
///
/// Cheap to clone; it wraps the actor's command sender.
#[derive(Clone)]
pub struct RoomHandle {
    code: RoomCode,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Whether the actor has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, command: RoomCommand) -> Result<(), RoomError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    pub async fn join(
        &self,
        request: JoinRequest,
        sender: SessionSender,
    ) -> Result<Seat, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Join {
            request,
            sender,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?
    }

    pub async fn reconnect(
        &self,
        session: SessionId,
        token: String,
        sender: SessionSender,
    ) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Reconnect {
            session,
            token,
            sender,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))?
    }

    /// Delivers an in-room message (fire-and-forget).
    pub async fn send_message(
        &self,
        session: SessionId,
        message: NamedMessage,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Message { session, message }).await
    }

    /// Reports that a session's connection is gone.
    pub async fn disconnected(&self, session: SessionId, consented: bool) -> Result<(), RoomError> {
        self.send(RoomCommand::Disconnected { session, consented })
            .await
    }

    pub async fn geo_resolved(&self, session: SessionId, country: String) -> Result<(), RoomError> {
        self.send(RoomCommand::GeoResolved { session, country }).await
    }

    /// Listing metadata and whether the room is private.
    pub async fn listing(&self) -> Result<(RoomListing, bool), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Listing { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| RoomError::Unavailable(self.code.clone()))
    }

    /// Closes every session with `code` and disposes the room.
    pub async fn shutdown(&self, code: CloseCode) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown { code }).await
    }
}

struct Member {
    sender: SessionSender,
    /// Whether the member has received a full snapshot.
    synced: bool,
}

impl Member {
    fn new(sender: SessionSender) -> Self {
        Self {
            sender,
            synced: false,
        }
    }

    fn send(&self, outbound: RoomOutbound) {
        // A closed channel means the connection is already gone.
        let _ = self.sender.send(outbound);
    }
}

struct RoomActor {
    core: RoomCore,
    ctx: Arc<RoomContext>,
    members: HashMap<SessionId, Member>,
    last_snapshot: Value,
    grace_timers: HashMap<SessionId, AbortHandle>,
    chart_checks: Vec<AbortHandle>,
    ping: Ticker,
    sweep: Ticker,
    receiver: mpsc::Receiver<RoomCommand>,
    commands: mpsc::WeakSender<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        tracing::info!(room = %self.core.code(), "room actor started");

        loop {
            tokio::select! {
                command = self.receiver.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => self.core.shutdown(CloseCode::Normal),
                },
                _ = self.ping.wait_for_tick() => self.core.tick_ping(Instant::now()),
                _ = self.sweep.wait_for_tick() => self.core.sweep(Instant::now()),
            }

            self.flush();

            if let Some(code) = self.core.closing() {
                self.dispose(code);
                break;
            }
        }

        tracing::info!(room = %self.core.code(), "room actor stopped");
    }

    fn handle_command(&mut self, command: RoomCommand) {
        let now = Instant::now();
        match command {
            RoomCommand::Join {
                request,
                sender,
                reply,
            } => {
                let result = self.core.join(request, now).map_err(RoomError::from);
                if let Ok(seat) = &result {
                    self.members.insert(seat.session, Member::new(sender));
                }
                let _ = reply.send(result);
            }
            RoomCommand::Reconnect {
                session,
                token,
                sender,
                reply,
            } => {
                let result = self
                    .core
                    .resume(session, &token, now)
                    .map_err(RoomError::from);
                if result.is_ok() {
                    if let Some(timer) = self.grace_timers.remove(&session) {
                        timer.abort();
                    }
                    self.members.insert(session, Member::new(sender));
                }
                let _ = reply.send(result);
            }
            RoomCommand::Message { session, message } => {
                let outcome = self.core.handle(session, &message, now);
                if outcome != Dispatch::Handled {
                    tracing::debug!(
                        room = %self.core.code(),
                        %session,
                        name = %message.name,
                        ?outcome,
                        "message dropped"
                    );
                }
            }
            RoomCommand::Disconnected { session, consented } => {
                self.members.remove(&session);
                if self.core.disconnect(session, consented, now) {
                    self.schedule_grace(session);
                }
            }
            RoomCommand::GraceExpired { session } => {
                self.grace_timers.remove(&session);
                self.core.grace_expired(session);
            }
            RoomCommand::ChartCheck { session } => self.core.chart_check(session),
            RoomCommand::GeoResolved { session, country } => {
                self.core.set_country(session, country);
            }
            RoomCommand::Listing { reply } => {
                let _ = reply.send(self.core.listing());
            }
            RoomCommand::Shutdown { code } => {
                tracing::info!(room = %self.core.code(), code = code.code(), "room shutdown requested");
                self.core.shutdown(code);
            }
        }
    }

    /// Replicates state changes, then delivers queued effects.
    fn flush(&mut self) {
        match self.core.snapshot() {
            Ok(snapshot) => {
                if let Some(patch) = patch::diff(&self.last_snapshot, &snapshot) {
                    for member in self.members.values().filter(|m| m.synced) {
                        member.send(RoomOutbound::Patch(patch.clone()));
                    }
                }
                for member in self.members.values_mut().filter(|m| !m.synced) {
                    member.send(RoomOutbound::State(snapshot.clone()));
                    member.synced = true;
                }
                self.last_snapshot = snapshot;
            }
            Err(e) => {
                tracing::warn!(room = %self.core.code(), error = %e, "state serialization failed");
            }
        }

        for effect in self.core.take_effects() {
            match effect {
                Effect::Send { to, message } => {
                    for (session, member) in &self.members {
                        if to.includes(*session) {
                            member.send(RoomOutbound::Message(message.clone()));
                        }
                    }
                }
                Effect::Close { session, code } => {
                    if let Some(member) = self.members.remove(&session) {
                        member.send(RoomOutbound::Close(code));
                    }
                    if let Some(timer) = self.grace_timers.remove(&session) {
                        timer.abort();
                    }
                }
                Effect::ScheduleChartCheck(session) => self.schedule_chart_check(session),
            }
        }

        let players = &self.core.state().players;
        self.members
            .retain(|session, _| players.get(session).is_some_and(|p| p.is_connected()));
    }

    fn schedule_grace(&mut self, session: SessionId) {
        let grace = self.core.config.reconnect_grace;
        let handle = self.enqueue_after(grace, RoomCommand::GraceExpired { session });
        if let Some(previous) = self.grace_timers.insert(session, handle) {
            previous.abort();
        }
    }

    fn schedule_chart_check(&mut self, session: SessionId) {
        let delay = self.core.config.chart_recheck_delay;
        self.chart_checks.retain(|timer| !timer.is_finished());
        let handle = self.enqueue_after(delay, RoomCommand::ChartCheck { session });
        self.chart_checks.push(handle);
    }

    /// Spawns a timer that feeds `command` back into this room's queue.
    fn enqueue_after(&self, delay: Duration, command: RoomCommand) -> AbortHandle {
        let commands = self.commands.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(commands) = commands.upgrade() {
                let _ = commands.send(command).await;
            }
        });
        task.abort_handle()
    }

    fn dispose(&mut self, code: CloseCode) {
        for member in self.members.values() {
            member.send(RoomOutbound::Close(code));
        }
        self.members.clear();
        self.core.dispose();

        for (_, timer) in self.grace_timers.drain() {
            timer.abort();
        }
        for timer in self.chart_checks.drain(..) {
            timer.abort();
        }

        let room = self.core.code().clone();
        self.ctx.unregister(&room);
        tracing::info!(%room, code = code.code(), "room disposed");
    }
}

fn ticker(period: Duration) -> Ticker {
    if period.is_zero() {
        Ticker::disabled()
    } else {
        Ticker::every(period)
    }
}

/// Spawns a new room actor task and returns a handle to it.
pub(crate) fn spawn_room(ctx: Arc<RoomContext>, core: RoomCore) -> RoomHandle {
    let (tx, rx) = mpsc::channel(ctx.config.channel_size.max(1));
    let code = core.code().clone();
    let last_snapshot = core.snapshot().unwrap_or(Value::Null);

    let actor = RoomActor {
        ping: ticker(ctx.config.ping_interval),
        sweep: ticker(ctx.config.sweep_interval),
        core,
        ctx,
        members: HashMap::new(),
        last_snapshot,
        grace_timers: HashMap::new(),
        chart_checks: Vec::new(),
        receiver: rx,
        commands: tx.downgrade(),
    };

    tokio::spawn(actor.run());

    RoomHandle { code, sender: tx }
}
