//! Room manager: creates rooms, finds them by code, and lists them.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use strumline_protocol::{CloseCode, JoinErrorCode, JoinOptions, RoomCode, RoomListing, SessionId};
use strumline_session::{Admission, Identity, IpSlot, PresenceRegistry, RoomCodeRegistry};

use crate::engine::{JoinRequest, RoomCore, Seat};
use crate::room::spawn_room;
use crate::{RoomConfig, RoomError, RoomHandle, SessionSender};

/// State shared by the manager and every room actor.
pub(crate) struct RoomContext {
    pub(crate) config: RoomConfig,
    pub(crate) admission: Arc<Admission>,
    pub(crate) presence: Arc<dyn PresenceRegistry>,
    codes: RoomCodeRegistry,
    directory: Mutex<HashMap<RoomCode, RoomHandle>>,
}

impl RoomContext {
    fn directory(&self) -> MutexGuard<'_, HashMap<RoomCode, RoomHandle>> {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Forgets a disposed room and frees its code.
    pub(crate) fn unregister(&self, code: &RoomCode) {
        self.directory().remove(code);
        self.codes.release(code);
    }
}

/// A client that passed the room and address checks, holding its IP slot
/// until it is seated or dropped.
pub struct Admit {
    room: Option<RoomHandle>,
    slot: IpSlot,
}

/// Entry point for room operations from the connection layer.
///
/// Cheap to clone; clones share the same rooms.
#[derive(Clone)]
pub struct RoomManager {
    ctx: Arc<RoomContext>,
}

impl RoomManager {
    pub fn new(
        config: RoomConfig,
        admission: Arc<Admission>,
        presence: Arc<dyn PresenceRegistry>,
    ) -> Self {
        Self {
            ctx: Arc::new(RoomContext {
                config,
                admission,
                presence,
                codes: RoomCodeRegistry::new(),
                directory: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &RoomConfig {
        &self.ctx.config
    }

    pub fn admission(&self) -> &Arc<Admission> {
        &self.ctx.admission
    }

    /// Runs the checks that come before a credential is looked at: the
    /// target room exists and has a free seat, then the client address is
    /// under its quota. `None` targets a room yet to be created.
    pub async fn admit(&self, code: Option<&RoomCode>, ip: IpAddr) -> Result<Admit, RoomError> {
        let room = match code {
            Some(code) => {
                let handle = self
                    .room(code)
                    .ok_or_else(|| RoomError::NotFound(code.clone()))?;
                let (listing, _) = handle.listing().await?;
                if listing.players >= listing.capacity {
                    return Err(RoomError::Rejected(JoinErrorCode::RoomFull));
                }
                Some(handle)
            }
            None => None,
        };
        let slot = self
            .ctx
            .admission
            .reserve(ip)
            .ok_or(RoomError::Rejected(JoinErrorCode::IpLimitExceeded))?;
        Ok(Admit { room, slot })
    }

    /// Seats an admitted client, opening a new room when it targeted none.
    ///
    /// The room re-checks capacity, since seats may have filled since
    /// [`admit`](Self::admit).
    pub async fn enter(
        &self,
        admit: Admit,
        options: JoinOptions,
        identity: Identity,
        ip: IpAddr,
        sender: SessionSender,
    ) -> Result<(RoomHandle, Seat), RoomError> {
        let handle = match admit.room {
            Some(handle) => handle,
            None => self.open(&options, ip),
        };
        let mut request = JoinRequest::new(options, identity, ip);
        request.slot = Some(admit.slot);
        let seat = handle.join(request, sender).await?;
        Ok((handle, seat))
    }

    /// Creates a room and seats its creator as owner.
    ///
    /// The IP slot is reserved before a code is allocated, so a refused
    /// creator leaves no room behind.
    pub async fn create(
        &self,
        options: JoinOptions,
        identity: Identity,
        ip: IpAddr,
        sender: SessionSender,
    ) -> Result<(RoomHandle, Seat), RoomError> {
        let admit = self.admit(None, ip).await?;
        self.enter(admit, options, identity, ip, sender).await
    }

    /// Seats a player in an existing room.
    pub async fn join(
        &self,
        code: &RoomCode,
        options: JoinOptions,
        identity: Identity,
        ip: IpAddr,
        sender: SessionSender,
    ) -> Result<(RoomHandle, Seat), RoomError> {
        let admit = self.admit(Some(code), ip).await?;
        self.enter(admit, options, identity, ip, sender).await
    }

    fn open(&self, creator: &JoinOptions, ip: IpAddr) -> RoomHandle {
        let code = self.ctx.codes.allocate();
        let core = RoomCore::new(
            code.clone(),
            self.ctx.config.clone(),
            Arc::clone(&self.ctx.admission),
            Arc::clone(&self.ctx.presence),
            creator,
        );
        let handle = spawn_room(Arc::clone(&self.ctx), core);
        self.ctx.directory().insert(code.clone(), handle.clone());
        tracing::info!(room = %code, %ip, "room created");
        handle
    }

    /// Resumes a held session.
    pub async fn reconnect(
        &self,
        code: &RoomCode,
        session: SessionId,
        token: String,
        sender: SessionSender,
    ) -> Result<RoomHandle, RoomError> {
        let handle = self
            .room(code)
            .ok_or(RoomError::Rejected(JoinErrorCode::ReconnectRejected))?;
        handle.reconnect(session, token, sender).await?;
        Ok(handle)
    }

    pub fn room(&self, code: &RoomCode) -> Option<RoomHandle> {
        self.ctx.directory().get(code).cloned()
    }

    pub fn room_count(&self) -> usize {
        self.ctx.directory().len()
    }

    /// Listings of every public room, ordered by code.
    pub async fn list_public(&self) -> Vec<RoomListing> {
        let handles: Vec<RoomHandle> = self.ctx.directory().values().cloned().collect();
        let mut listings = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.listing().await {
                Ok((listing, false)) => listings.push(listing),
                Ok((_, true)) => {}
                Err(e) => tracing::debug!(room = %handle.code(), error = %e, "listing skipped"),
            }
        }
        listings.sort_by(|a, b| a.code.cmp(&b.code));
        listings
    }

    /// Force-closes a room, disconnecting its sessions with `close`.
    pub async fn shutdown(&self, code: &RoomCode, close: CloseCode) -> Result<(), RoomError> {
        let handle = self
            .room(code)
            .ok_or_else(|| RoomError::NotFound(code.clone()))?;
        handle.shutdown(close).await
    }

    pub async fn shutdown_all(&self) {
        let handles: Vec<RoomHandle> = self.ctx.directory().values().cloned().collect();
        for handle in handles {
            let _ = handle.shutdown(CloseCode::Normal).await;
        }
    }
}
