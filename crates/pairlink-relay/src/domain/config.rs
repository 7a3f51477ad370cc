//! Relay configuration.
//!
//! [`RelayConfig`] is the single source of truth for all runtime settings.
//! It is assembled in layers, lowest precedence first:
//!
//! 1. [`RelayConfig::default`]
//! 2. an optional TOML file (`--config relay.toml`)
//! 3. `PAIRLINK_*` environment variables and CLI flags (see `main.rs`)
//!
//! Every key in the file is optional; a missing key keeps its default.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 24810
//! outbound_queue = 64
//! command_queue = 1024
//! log_level = "info"
//!
//! [pairing]
//! code_ttl_secs = 300
//! sweep_interval_secs = 60
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Error type for loading and validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is not usable.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// All runtime configuration for the relay.
///
/// # Example
///
/// ```rust
/// use pairlink_relay::domain::RelayConfig;
///
/// let cfg = RelayConfig::default();
/// assert_eq!(cfg.ws_bind_addr.port(), 24810);
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RelayConfig {
    /// Address the WebSocket server binds to.
    pub ws_bind_addr: SocketAddr,

    /// How long an issued pairing code stays redeemable.
    pub code_ttl: Duration,

    /// Period of the background sweep that reclaims lapsed codes.
    pub sweep_interval: Duration,

    /// Capacity of each connection's outbound queue.  Messages for a
    /// connection whose queue is full are dropped.
    pub outbound_queue: usize,

    /// Capacity of the hub actor's command channel.
    pub command_queue: usize,

    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for RelayConfig {
    /// | Field          | Default          |
    /// |----------------|------------------|
    /// | ws_bind_addr   | `0.0.0.0:24810`  |
    /// | code_ttl       | 300 seconds      |
    /// | sweep_interval | 60 seconds       |
    /// | outbound_queue | 64               |
    /// | command_queue  | 1024             |
    /// | log_level      | `info`           |
    fn default() -> Self {
        let file = RelayConfigFile::default();
        Self {
            ws_bind_addr: SocketAddr::new(IpAddr::from([0, 0, 0, 0]), file.server.port),
            code_ttl: Duration::from_secs(file.pairing.code_ttl_secs),
            sweep_interval: Duration::from_secs(file.pairing.sweep_interval_secs),
            outbound_queue: file.server.outbound_queue,
            command_queue: file.server.command_queue,
            log_level: file.server.log_level,
        }
    }
}

impl RelayConfig {
    /// Loads a TOML config file.  Keys absent from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// for malformed TOML, [`ConfigError::Invalid`] for unusable values.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let file: RelayConfigFile = toml::from_str(content)?;
        let ip: IpAddr = file
            .server
            .bind_address
            .parse()
            .map_err(|_| ConfigError::Invalid {
                field: "server.bind_address",
                reason: format!("'{}' is not an IP address", file.server.bind_address),
            })?;

        let config = Self {
            ws_bind_addr: SocketAddr::new(ip, file.server.port),
            code_ttl: Duration::from_secs(file.pairing.code_ttl_secs),
            sweep_interval: Duration::from_secs(file.pairing.sweep_interval_secs),
            outbound_queue: file.server.outbound_queue,
            command_queue: file.server.command_queue,
            log_level: file.server.log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the relay cannot run with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.code_ttl.is_zero() {
            return Err(invalid("code_ttl", "must be greater than zero"));
        }
        if self.sweep_interval.is_zero() {
            return Err(invalid("sweep_interval", "must be greater than zero"));
        }
        // tokio::sync::mpsc::channel panics on a zero capacity.
        if self.outbound_queue == 0 {
            return Err(invalid("outbound_queue", "must be at least 1"));
        }
        if self.command_queue == 0 {
            return Err(invalid("command_queue", "must be at least 1"));
        }
        if self.log_level.trim().is_empty() {
            return Err(invalid("log_level", "must not be empty"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

// ── File schema ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RelayConfigFile {
    #[serde(default)]
    server: ServerSection,
    #[serde(default)]
    pairing: PairingSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ServerSection {
    #[serde(default = "default_bind_address")]
    bind_address: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_outbound_queue")]
    outbound_queue: usize,
    #[serde(default = "default_command_queue")]
    command_queue: usize,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PairingSection {
    #[serde(default = "default_code_ttl_secs")]
    code_ttl_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    sweep_interval_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    24810
}
fn default_outbound_queue() -> usize {
    64
}
fn default_command_queue() -> usize {
    1024
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_code_ttl_secs() -> u64 {
    300
}
fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            outbound_queue: default_outbound_queue(),
            command_queue: default_command_queue(),
            log_level: default_log_level(),
        }
    }
}

impl Default for PairingSection {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_code_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
