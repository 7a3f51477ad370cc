//! Domain layer for pairlink-relay.
//!
//! Only configuration lives here; the pairing domain itself (identities,
//! registries, the hub state machine, the message catalog) is `pairlink-core`.
//! Nothing in this layer touches sockets or the Tokio runtime.

pub mod config;

pub use config::{ConfigError, RelayConfig};
