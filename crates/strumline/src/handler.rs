//! Per-connection handler: handshake, join, and message pumping.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive `ListRooms` (any number of times), then `Join` or `Reconnect`
//!   2. Validate the name and protocol, check room capacity and the address
//!      quota, then resolve the credential
//!   3. Create, join or resume a room seat → send `Joined`
//!   4. Loop: forward client messages to the room, room output to the client

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use strumline_protocol::{
    CloseCode, Codec, Envelope, JoinErrorCode, JoinOptions, Payload, ProtocolError, RoomCode, SessionId,
    SystemMessage,
};
use strumline_room::names::validate_join;
use strumline_room::{RoomHandle, RoomOutbound};
use strumline_session::{GeoResolver, ProfileStore, SessionError};
use strumline_transport::{Connection, WebSocketConnection};
use tokio::sync::mpsc;

use crate::StrumlineError;
use crate::server::ServerState;

/// How long a client may stay silent before its handshake is abandoned.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Reports the session's departure to its room when the handler exits.
///
/// `Drop` is synchronous, so the report is sent from a spawned task.
struct SessionGuard {
    handle: RoomHandle,
    session: SessionId,
    consented: bool,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let handle = self.handle.clone();
        let session = self.session;
        let consented = self.consented;
        tokio::spawn(async move {
            let _ = handle.disconnected(session, consented).await;
        });
    }
}

/// Outgoing frame numbering.
struct Outbox {
    seq: u64,
    start: Instant,
}

impl Outbox {
    fn new() -> Self {
        Self {
            seq: 0,
            start: Instant::now(),
        }
    }

    fn envelope(&mut self, payload: Payload) -> Envelope {
        Envelope {
            seq: next_seq(&mut self.seq),
            timestamp: self.start.elapsed().as_millis() as u64,
            payload,
        }
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<P, G>(
    conn: WebSocketConnection,
    state: Arc<ServerState<P, G>>,
) -> Result<(), StrumlineError>
where
    P: ProfileStore,
    G: GeoResolver,
{
    let conn_id = conn.id();
    let ip = conn.client_ip();
    tracing::debug!(%conn_id, %ip, "handling new connection");

    let mut outbox = Outbox::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    // --- Step 1: Handshake ---
    let Some(mut guard) = perform_handshake(&conn, &state, ip, tx, &mut outbox).await? else {
        let _ = conn.close().await;
        return Ok(());
    };
    let handle = guard.handle.clone();
    let session = guard.session;
    tracing::info!(%conn_id, room = %handle.code(), %session, "session attached");

    // --- Step 2: Message loop ---
    loop {
        tokio::select! {
            incoming = conn.recv() => {
                let data = match incoming {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::info!(%session, "connection closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%session, error = %e, "recv error");
                        break;
                    }
                };

                let envelope: Envelope = match state.codec.decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        tracing::debug!(%session, error = %e, "failed to decode envelope");
                        continue;
                    }
                };

                match envelope.payload {
                    Payload::Message(message) => {
                        if handle.send_message(session, message).await.is_err() {
                            break;
                        }
                    }
                    Payload::System(SystemMessage::Leave) => {
                        tracing::info!(%session, "client left");
                        guard.consented = true;
                        let _ = conn.close().await;
                        break;
                    }
                    Payload::System(_) => {
                        tracing::debug!(%session, "ignoring system message after join");
                    }
                }
            }
            outbound = rx.recv() => {
                let Some(outbound) = outbound else {
                    tracing::debug!(%session, "room dropped the session");
                    break;
                };
                let payload = match outbound {
                    RoomOutbound::State(snapshot) => {
                        Payload::System(SystemMessage::RoomState { state: snapshot })
                    }
                    RoomOutbound::Patch(patch) => {
                        Payload::System(SystemMessage::StatePatch { patch })
                    }
                    RoomOutbound::Message(message) => Payload::Message(message),
                    RoomOutbound::Close(code) => {
                        tracing::info!(%session, %code, "room closed the session");
                        let closed = Payload::System(SystemMessage::Closed { code: code.code() });
                        let _ = send_payload(&conn, &state.codec, &mut outbox, closed).await;
                        let _ = conn.close_with(code.code(), code.reason()).await;
                        break;
                    }
                };
                if let Err(e) = send_payload(&conn, &state.codec, &mut outbox, payload).await {
                    tracing::debug!(%session, error = %e, "send failed");
                    break;
                }
            }
        }
    }

    // guard drops here → the room learns the session is gone.
    Ok(())
}

/// Runs the handshake. Returns `None` when the client was turned away.
///
/// The returned guard exists from the moment the room seats the session,
/// so a client lost while `Joined` is in flight is still reported.
async fn perform_handshake<P, G>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<P, G>>,
    ip: IpAddr,
    tx: mpsc::UnboundedSender<RoomOutbound>,
    outbox: &mut Outbox,
) -> Result<Option<SessionGuard>, StrumlineError>
where
    P: ProfileStore,
    G: GeoResolver,
{
    loop {
        let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                return Err(ProtocolError::InvalidMessage(
                    "connection closed before join".into(),
                )
                .into());
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ProtocolError::InvalidMessage("handshake timed out".into()).into());
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%ip, error = %e, "malformed handshake frame");
                send_error(conn, &state.codec, outbox, 400, "malformed message").await?;
                return Ok(None);
            }
        };

        match envelope.payload {
            Payload::System(SystemMessage::ListRooms) => {
                let rooms = state.rooms.list_public().await;
                let list = Payload::System(SystemMessage::RoomList { rooms });
                send_payload(conn, &state.codec, outbox, list).await?;
            }
            Payload::System(SystemMessage::Join { options }) => {
                return join(conn, state, ip, options, tx, outbox).await;
            }
            Payload::System(SystemMessage::Reconnect {
                room,
                session,
                token,
            }) => {
                return reconnect(conn, state, room, session, token, tx, outbox).await;
            }
            _ => {
                send_error(conn, &state.codec, outbox, 400, "expected Join").await?;
                return Err(ProtocolError::InvalidMessage(
                    "first message must be Join, Reconnect or ListRooms".into(),
                )
                .into());
            }
        }
    }
}

async fn join<P, G>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<P, G>>,
    ip: IpAddr,
    options: JoinOptions,
    tx: mpsc::UnboundedSender<RoomOutbound>,
    outbox: &mut Outbox,
) -> Result<Option<SessionGuard>, StrumlineError>
where
    P: ProfileStore,
    G: GeoResolver,
{
    if let Err(code) = validate_join(&options.name, options.protocol, state.protocol_version) {
        tracing::debug!(%ip, %code, "join refused");
        reject(conn, &state.codec, outbox, code).await?;
        return Ok(None);
    }

    // Dropping `admit` on any refusal below gives the address slot back.
    let admit = match state.rooms.admit(options.room_code.as_ref(), ip).await {
        Ok(admit) => admit,
        Err(e) => {
            tracing::debug!(%ip, error = %e, "join refused");
            reject(conn, &state.codec, outbox, e.join_code()).await?;
            return Ok(None);
        }
    };

    let identity = match state.identity.resolve(options.credential.as_ref()).await {
        Ok(identity) => identity,
        Err(SessionError::Banned(account)) => {
            tracing::info!(%ip, %account, "banned account refused");
            let code = CloseCode::Banned;
            let closed = Payload::System(SystemMessage::Closed { code: code.code() });
            send_payload(conn, &state.codec, outbox, closed).await?;
            conn.close_with(code.code(), code.reason()).await?;
            return Ok(None);
        }
        Err(e) => {
            tracing::info!(%ip, error = %e, "credential rejected");
            reject(conn, &state.codec, outbox, JoinErrorCode::Unauthorized).await?;
            return Ok(None);
        }
    };

    let (handle, seat) = match state.rooms.enter(admit, options, identity, ip, tx).await {
        Ok(joined) => joined,
        Err(e) => {
            tracing::debug!(%ip, error = %e, "join failed");
            reject(conn, &state.codec, outbox, e.join_code()).await?;
            return Ok(None);
        }
    };

    let guard = SessionGuard {
        handle: handle.clone(),
        session: seat.session,
        consented: false,
    };
    let joined = Payload::System(SystemMessage::Joined {
        room: handle.code().clone(),
        session: seat.session,
        token: seat.reconnect_token,
    });
    send_payload(conn, &state.codec, outbox, joined).await?;

    spawn_geo_lookup(Arc::clone(state), handle, seat.session, ip);

    Ok(Some(guard))
}

async fn reconnect<P, G>(
    conn: &WebSocketConnection,
    state: &Arc<ServerState<P, G>>,
    room: RoomCode,
    session: SessionId,
    token: String,
    tx: mpsc::UnboundedSender<RoomOutbound>,
    outbox: &mut Outbox,
) -> Result<Option<SessionGuard>, StrumlineError>
where
    P: ProfileStore,
    G: GeoResolver,
{
    match state.rooms.reconnect(&room, session, token.clone(), tx).await {
        Ok(handle) => {
            let guard = SessionGuard {
                handle,
                session,
                consented: false,
            };
            let joined = Payload::System(SystemMessage::Joined {
                room,
                session,
                token,
            });
            send_payload(conn, &state.codec, outbox, joined).await?;
            Ok(Some(guard))
        }
        Err(e) => {
            tracing::debug!(room = %room, %session, error = %e, "reconnect failed");
            reject(conn, &state.codec, outbox, JoinErrorCode::ReconnectRejected).await?;
            Ok(None)
        }
    }
}

/// Resolves the client's country in the background. Failures only log.
fn spawn_geo_lookup<P, G>(
    state: Arc<ServerState<P, G>>,
    handle: RoomHandle,
    session: SessionId,
    ip: IpAddr,
) where
    P: ProfileStore,
    G: GeoResolver,
{
    tokio::spawn(async move {
        let country = match state.geo.country_of(ip).await {
            Ok(Some(country)) => country,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(%ip, error = %e, "geo lookup failed");
                return;
            }
        };
        if let Some(stats) = &state.stats {
            stats.record(&country, ip);
        }
        let _ = handle.geo_resolved(session, country).await;
    });
}

async fn send_payload(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    outbox: &mut Outbox,
    payload: Payload,
) -> Result<(), StrumlineError> {
    let bytes = codec.encode(&outbox.envelope(payload))?;
    conn.send(&bytes).await?;
    Ok(())
}

/// Sends a `SystemMessage::Error` frame.
async fn send_error(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    outbox: &mut Outbox,
    code: u16,
    message: &str,
) -> Result<(), StrumlineError> {
    let error = Payload::System(SystemMessage::Error {
        code,
        message: message.to_owned(),
    });
    send_payload(conn, codec, outbox, error).await
}

async fn reject(
    conn: &WebSocketConnection,
    codec: &impl Codec,
    outbox: &mut Outbox,
    code: JoinErrorCode,
) -> Result<(), StrumlineError> {
    send_error(conn, codec, outbox, code.code(), code.message()).await
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
