//! `StrumlineServer` builder and accept loop.
//!
//! Ties the layers together: transport → protocol → session → room.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strumline_protocol::{JsonCodec, PROTOCOL_VERSION};
use strumline_room::{RoomConfig, RoomManager};
use strumline_session::{
    Admission, AdmissionConfig, CountryStats, GeoResolver, IdentityBridge, InMemoryPresence,
    NoGeo, ProfileStore,
};
use strumline_transport::{Transport, WebSocketTransport};

use crate::StrumlineError;
use crate::handler::handle_connection;

/// Everything needed to start a server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
    /// Protocol version clients must declare when joining.
    pub protocol_version: u32,
    /// Take the client address from `X-Forwarded-For`.
    pub trust_forwarded_for: bool,
    /// Record joining addresses per country.
    pub stats_enabled: bool,
    pub room: RoomConfig,
    pub admission: AdmissionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:2567".to_owned(),
            protocol_version: PROTOCOL_VERSION,
            trust_forwarded_for: false,
            stats_enabled: false,
            room: RoomConfig::default(),
            admission: AdmissionConfig::default(),
        }
    }
}

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<P: ProfileStore, G: GeoResolver> {
    pub(crate) rooms: RoomManager,
    pub(crate) identity: IdentityBridge<P>,
    pub(crate) geo: G,
    pub(crate) stats: Option<Arc<CountryStats>>,
    pub(crate) protocol_version: u32,
    pub(crate) codec: JsonCodec,
}

/// Builder for configuring and starting a Strumline server.
///
/// # Example
///
/// ```rust,ignore
/// use strumline::prelude::*;
///
/// let server = StrumlineServer::builder()
///     .bind("0.0.0.0:2567")
///     .build(InMemoryProfiles::new())
///     .await?;
/// server.run().await
/// ```
pub struct StrumlineServerBuilder<G: GeoResolver = NoGeo> {
    config: ServerConfig,
    geo: G,
}

impl StrumlineServerBuilder {
    /// Creates a builder with default settings and no geo lookups.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            geo: NoGeo,
        }
    }
}

impl Default for StrumlineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<G: GeoResolver> StrumlineServerBuilder<G> {
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_owned();
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    pub fn admission_config(mut self, config: AdmissionConfig) -> Self {
        self.config.admission = config;
        self
    }

    pub fn protocol_version(mut self, version: u32) -> Self {
        self.config.protocol_version = version;
        self
    }

    pub fn trust_forwarded_for(mut self, trust: bool) -> Self {
        self.config.trust_forwarded_for = trust;
        self
    }

    pub fn stats_enabled(mut self, enabled: bool) -> Self {
        self.config.stats_enabled = enabled;
        self
    }

    /// Sets the resolver used for best-effort country lookups.
    pub fn geo<R: GeoResolver>(self, geo: R) -> StrumlineServerBuilder<R> {
        StrumlineServerBuilder {
            config: self.config,
            geo,
        }
    }

    /// Binds the listener and assembles the server around `profiles`.
    pub async fn build<P: ProfileStore>(
        self,
        profiles: P,
    ) -> Result<StrumlineServer<P, G>, StrumlineError> {
        let transport = WebSocketTransport::bind(&self.config.bind)
            .await?
            .trust_forwarded_for(self.config.trust_forwarded_for);

        let presence = Arc::new(InMemoryPresence::new());
        let admission = Arc::new(Admission::new(self.config.admission.clone()));
        let rooms = RoomManager::new(self.config.room.clone(), admission, presence.clone());
        let stats = self
            .config
            .stats_enabled
            .then(|| Arc::new(CountryStats::new()));

        let state = Arc::new(ServerState {
            rooms,
            identity: IdentityBridge::new(profiles),
            geo: self.geo,
            stats,
            protocol_version: self.config.protocol_version,
            codec: JsonCodec,
        });

        Ok(StrumlineServer {
            transport,
            state,
            presence,
        })
    }
}

/// A bound Strumline server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct StrumlineServer<P: ProfileStore, G: GeoResolver = NoGeo> {
    transport: WebSocketTransport,
    state: Arc<ServerState<P, G>>,
    presence: Arc<InMemoryPresence>,
}

impl StrumlineServer<strumline_session::InMemoryProfiles> {
    /// Creates a new builder.
    pub fn builder() -> StrumlineServerBuilder {
        StrumlineServerBuilder::new()
    }
}

impl<P: ProfileStore, G: GeoResolver> StrumlineServer<P, G> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// The room manager, for listing or force-closing rooms.
    pub fn rooms(&self) -> RoomManager {
        self.state.rooms.clone()
    }

    /// Per-country statistics, when enabled.
    pub fn stats(&self) -> Option<Arc<CountryStats>> {
        self.state.stats.clone()
    }

    /// Names of verified accounts currently in a room.
    pub fn presence(&self) -> Arc<InMemoryPresence> {
        Arc::clone(&self.presence)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(mut self) -> Result<(), StrumlineError> {
        tracing::info!("Strumline server running");

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.protocol_version, PROTOCOL_VERSION);
        assert!(!config.trust_forwarded_for);
        assert!(!config.stats_enabled, "country stats are opt-in");
        assert_eq!(config.room.base_capacity, 2);
        assert_eq!(config.room.party_capacity, 8);
        assert_eq!(config.admission.max_per_ip, 4);
    }

    #[test]
    fn test_builder_setters_update_config() {
        let builder = StrumlineServer::builder()
            .bind("0.0.0.0:9000")
            .protocol_version(7)
            .stats_enabled(true)
            .trust_forwarded_for(true);
        assert_eq!(builder.config.bind, "0.0.0.0:9000");
        assert_eq!(builder.config.protocol_version, 7);
        assert!(builder.config.stats_enabled);
        assert!(builder.config.trust_forwarded_for);
    }
}
