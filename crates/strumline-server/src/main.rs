//! Command-line launcher for the Strumline session server.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use strumline::prelude::*;
use tracing_subscriber::EnvFilter;

/// Strumline: real-time rooms for two-to-eight player rhythm games
#[derive(Parser, Debug)]
#[command(name = "strumline-server")]
#[command(version)]
struct Cli {
    /// Address to listen on.
    #[arg(long, env = "STRUMLINE_BIND", default_value = "0.0.0.0:2567")]
    bind: String,

    /// Protocol version clients must declare.
    #[arg(
        long,
        env = "STRUMLINE_PROTOCOL",
        default_value_t = PROTOCOL_VERSION,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    protocol: u32,

    /// Take client addresses from X-Forwarded-For. Only behind a trusted proxy.
    #[arg(long, env = "STRUMLINE_TRUST_FORWARDED_FOR")]
    trust_forwarded_for: bool,

    /// Record joining addresses per country.
    #[arg(long, env = "STRUMLINE_STATS_ENABLED")]
    stats: bool,

    /// Memberships allowed per client address.
    #[arg(long, env = "STRUMLINE_MAX_PER_IP", default_value_t = 4)]
    max_per_ip: usize,

    /// Seconds a dropped session is held for reconnection.
    #[arg(long, env = "STRUMLINE_RECONNECT_GRACE", default_value_t = 20)]
    reconnect_grace: u64,

    /// Seconds of silence before a connected session is evicted.
    #[arg(long, env = "STRUMLINE_LIVENESS_TIMEOUT", default_value_t = 10)]
    liveness_timeout: u64,

    /// JSON array of account profiles for credential verification.
    #[arg(long, env = "STRUMLINE_PROFILES")]
    profiles: Option<PathBuf>,

    /// JSON object mapping client addresses to country names.
    #[arg(long, env = "STRUMLINE_GEO_TABLE")]
    geo_table: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, env = "STRUMLINE_LOG", default_value = "info")]
    log: String,

    /// Print the resolved configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
}

#[derive(Debug, thiserror::Error)]
enum LaunchError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Server(#[from] StrumlineError),
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let room = RoomConfig {
            reconnect_grace: Duration::from_secs(self.reconnect_grace),
            liveness_timeout: Duration::from_secs(self.liveness_timeout),
            ..RoomConfig::default()
        };
        ServerConfig {
            bind: self.bind.clone(),
            protocol_version: self.protocol,
            trust_forwarded_for: self.trust_forwarded_for,
            stats_enabled: self.stats,
            room,
            admission: AdmissionConfig {
                max_per_ip: self.max_per_ip,
            },
        }
    }
}

fn init_logging(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, LaunchError> {
    let text = std::fs::read_to_string(path).map_err(|source| LaunchError::Read {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LaunchError::Parse {
        path: path.to_owned(),
        source,
    })
}

fn load_profiles(path: Option<&Path>) -> Result<InMemoryProfiles, LaunchError> {
    let Some(path) = path else {
        return Ok(InMemoryProfiles::new());
    };
    let profiles: Vec<Profile> = read_json(path)?;
    tracing::info!(count = profiles.len(), path = %path.display(), "profiles loaded");
    Ok(profiles.into_iter().collect())
}

async fn serve<P: ProfileStore, G: GeoResolver>(
    server: StrumlineServer<P, G>,
) -> Result<(), LaunchError> {
    let rooms = server.rooms();
    let stats = server.stats();
    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(rooms = rooms.room_count(), "shutting down");
            rooms.shutdown_all().await;
            if let Some(stats) = stats {
                for (country, players) in stats.snapshot() {
                    tracing::info!(%country, players, "country stats");
                }
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), LaunchError> {
    let cli = Cli::parse();
    let config = cli.server_config();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&config).map_err(|source| LaunchError::Parse {
            path: PathBuf::from("<config>"),
            source,
        })?;
        println!("{json}");
        return Ok(());
    }

    init_logging(&cli.log);

    let profiles = load_profiles(cli.profiles.as_deref())?;
    let builder = StrumlineServer::builder().config(config);

    match cli.geo_table.as_deref() {
        Some(path) => {
            let table: HashMap<IpAddr, String> = read_json(path)?;
            let server = builder.geo(StaticGeo::new(table)).build(profiles).await?;
            tracing::info!(addr = ?server.local_addr().ok(), "listening");
            serve(server).await
        }
        None => {
            let server = builder.build(profiles).await?;
            tracing::info!(addr = ?server.local_addr().ok(), "listening");
            serve(server).await
        }
    }
}
