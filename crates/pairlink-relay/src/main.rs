//! pairlink relay: entry point.
//!
//! Accepts WebSocket connections from cameras and viewers, pairs them through
//! short-lived numeric codes, and relays WebRTC negotiation messages between
//! paired peers.  Media never passes through the relay.
//!
//! # Usage
//!
//! ```text
//! pairlink-relay [OPTIONS]
//!
//! Options:
//!   --config         <FILE>  TOML config file
//!   --ws-bind        <IP>    Listener address [default: 0.0.0.0]
//!   --ws-port        <PORT>  Listener port [default: 24810]
//!   --code-ttl       <SECS>  Pairing code lifetime [default: 300]
//!   --sweep-interval <SECS>  Expired-code sweep period [default: 60]
//!   --outbound-queue <N>     Per-connection send queue [default: 64]
//!   --command-queue  <N>     Hub command queue [default: 1024]
//!   --log-level      <LEVEL> Fallback log filter when RUST_LOG is unset [default: info]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then environment variables and
//! flags.  A flag wins over its environment variable.
//!
//! | Variable                  | Flag               |
//! |---------------------------|--------------------|
//! | `PAIRLINK_CONFIG`         | `--config`         |
//! | `PAIRLINK_WS_BIND`        | `--ws-bind`        |
//! | `PAIRLINK_WS_PORT`        | `--ws-port`        |
//! | `PAIRLINK_CODE_TTL`       | `--code-ttl`       |
//! | `PAIRLINK_SWEEP_INTERVAL` | `--sweep-interval` |
//! | `PAIRLINK_OUTBOUND_QUEUE` | `--outbound-queue` |
//! | `PAIRLINK_COMMAND_QUEUE`  | `--command-queue`  |
//! | `PAIRLINK_LOG_LEVEL`      | `--log-level`      |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pairlink_relay::domain::RelayConfig;
use pairlink_relay::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// pairlink WebSocket signaling relay.
///
/// Every option is optional so that an unset flag falls through to the config
/// file and then to the built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "pairlink-relay",
    about = "Code-based camera/viewer pairing and WebRTC signaling relay",
    version
)]
struct Cli {
    /// TOML config file.
    #[arg(long, env = "PAIRLINK_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the WebSocket server to.
    #[arg(long, env = "PAIRLINK_WS_BIND")]
    ws_bind: Option<String>,

    /// TCP port for the WebSocket server.
    #[arg(long, env = "PAIRLINK_WS_PORT")]
    ws_port: Option<u16>,

    /// Seconds an issued pairing code stays redeemable.
    #[arg(long, env = "PAIRLINK_CODE_TTL")]
    code_ttl: Option<u64>,

    /// Seconds between sweeps for lapsed codes.
    #[arg(long, env = "PAIRLINK_SWEEP_INTERVAL")]
    sweep_interval: Option<u64>,

    /// Messages buffered per connection before new ones are dropped.
    #[arg(long, env = "PAIRLINK_OUTBOUND_QUEUE")]
    outbound_queue: Option<usize>,

    /// Commands buffered for the hub actor.
    #[arg(long, env = "PAIRLINK_COMMAND_QUEUE")]
    command_queue: Option<usize>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, env = "PAIRLINK_LOG_LEVEL")]
    log_level: Option<String>,
}

impl Cli {
    /// Layers the config file and the CLI/environment over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be loaded, `--ws-bind` is
    /// not an IP address, or the merged configuration fails validation.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let mut config = match &self.config {
            Some(path) => RelayConfig::load(path)
                .with_context(|| format!("failed to load config file '{}'", path.display()))?,
            None => RelayConfig::default(),
        };

        if let Some(bind) = &self.ws_bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid WebSocket bind address: '{bind}'"))?;
            config.ws_bind_addr = SocketAddr::new(ip, config.ws_bind_addr.port());
        }
        if let Some(port) = self.ws_port {
            config.ws_bind_addr.set_port(port);
        }
        if let Some(secs) = self.code_ttl {
            config.code_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = self.sweep_interval {
            config.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(n) = self.outbound_queue {
            config.outbound_queue = n;
        }
        if let Some(n) = self.command_queue {
            config.command_queue = n;
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_relay_config()?;

    // `RUST_LOG` wins; otherwise the configured level applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    info!(
        "pairlink relay starting: ws={}, code_ttl={}s, sweep={}s",
        config.ws_bind_addr,
        config.code_ttl.as_secs(),
        config.sweep_interval.as_secs()
    );

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, running).await?;

    info!("pairlink relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
