//! Declarative in-room message routing.
//!
//! Every message name maps to the payload shape it must have, who may send
//! it, and the handler that runs it. Anything that fails a check is
//! dropped without a reply; the connection stays open.

use serde_json::Value;
use strumline_protocol::{PayloadShape, SessionId};
use tokio::time::Instant;

use crate::engine::RoomCore;

/// Who may send a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Anyone,
    /// The owner, or anyone while anarchy mode is on.
    Host,
    /// The owner only, regardless of anarchy mode.
    Owner,
}

/// What happened to a routed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The handler ran and acted.
    Handled,
    /// The handler ran but its preconditions did not hold.
    Ignored,
    Unknown,
    Malformed,
    Unauthorized,
    /// The sender holds no connected seat in the room.
    NotMember,
}

/// One inbound message as seen by a handler.
#[derive(Debug, Clone, Copy)]
pub struct Inbound<'a> {
    pub session: SessionId,
    pub data: &'a Value,
    pub now: Instant,
}

type Handler = fn(&mut RoomCore, Inbound<'_>) -> Dispatch;

pub struct Route {
    pub name: &'static str,
    pub shape: PayloadShape,
    pub access: Access,
    handler: Handler,
}

const fn route(name: &'static str, shape: PayloadShape, access: Access, handler: Handler) -> Route {
    Route {
        name,
        shape,
        access,
        handler,
    }
}

const fn array(min_len: usize) -> PayloadShape {
    PayloadShape::Array { min_len }
}

use Access::{Anyone, Host, Owner};
use PayloadShape::{Any, Bool, Number};

pub static ROUTES: &[Route] = &[
    route("toggleParty", Any, Owner, RoomCore::on_toggle_party),
    route("togglePrivate", Any, Owner, RoomCore::on_toggle_private),
    route("startGame", Any, Anyone, RoomCore::on_start_game),
    route("addScore", Number, Anyone, RoomCore::on_add_score),
    route("addMiss", Any, Anyone, RoomCore::on_add_miss),
    route("addHitJudge", PayloadShape::String, Anyone, RoomCore::on_add_hit_judge),
    route("setFSD", array(7), Host, RoomCore::on_set_fsd),
    route("verifyChart", PayloadShape::String, Anyone, RoomCore::on_verify_chart),
    route("playerReady", Any, Anyone, RoomCore::on_player_ready),
    route("playerEnded", Any, Anyone, RoomCore::on_player_ended),
    route("strumPlay", array(3), Anyone, RoomCore::on_strum_play),
    route("charPlay", array(1), Anyone, RoomCore::on_char_play),
    route("noteHit", array(3), Anyone, RoomCore::on_note_hit),
    route("noteMiss", array(3), Anyone, RoomCore::on_note_miss),
    route("noteHold", Bool, Anyone, RoomCore::on_note_hold),
    route("custom", array(2), Anyone, RoomCore::on_custom),
    route("chat", PayloadShape::String, Anyone, RoomCore::on_chat),
    route("swapSides", Any, Host, RoomCore::on_swap_sides),
    route("anarchyMode", Any, Host, RoomCore::on_anarchy_mode),
    route("pong", Any, Anyone, RoomCore::on_pong),
    route("requestEndSong", Any, Anyone, RoomCore::on_request_end_song),
    route("setGameplaySetting", array(2), Host, RoomCore::on_set_gameplay_setting),
    route("toggleLocalModifiers", Any, Host, RoomCore::on_toggle_local_modifiers),
    route("setSkin", Any, Anyone, RoomCore::on_set_skin),
    route("status", PayloadShape::String, Anyone, RoomCore::on_status),
    route("setStrum", Number, Anyone, RoomCore::on_set_strum),
    route("botplay", Any, Anyone, RoomCore::on_botplay),
    route("updateArrColors", array(2), Anyone, RoomCore::on_update_arrow_colors),
    route("updateFP", Number, Anyone, RoomCore::on_update_points),
    route("command", array(1), Anyone, RoomCore::on_command),
];

pub fn find(name: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|route| route.name == name)
}

/// Checks shape and access, then runs the handler.
pub(crate) fn dispatch(core: &mut RoomCore, name: &str, inbound: Inbound<'_>) -> Dispatch {
    let Some(route) = find(name) else {
        return Dispatch::Unknown;
    };
    if !route.shape.matches(inbound.data) {
        return Dispatch::Malformed;
    }
    let allowed = match route.access {
        Anyone => true,
        Host => core.state.is_host(inbound.session),
        Owner => core.state.is_owner(inbound.session),
    };
    if !allowed {
        return Dispatch::Unauthorized;
    }
    (route.handler)(core, inbound)
}
