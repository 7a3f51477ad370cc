//! pairlink-relay library crate.
//!
//! A WebSocket signaling relay that lets a camera and a viewer pair through a
//! short numeric code and then exchange WebRTC offers, answers, and ICE
//! candidates.  The pairing rules live in `pairlink-core`; this crate puts
//! them on the network.
//!
//! # Architecture
//!
//! ```text
//! Browser (JSON over WebSocket)
//!         ↕
//! [pairlink-relay]
//!   ├── domain/           RelayConfig (defaults, TOML file, validation)
//!   ├── application/      hub actor, expiry timers, sweeper
//!   └── infrastructure/
//!         └── ws_server/  accept loop and per-session tasks (tokio-tungstenite)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `pairlink-core`; it uses Tokio
//!   channels and timers but never a socket.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.

/// Domain layer: configuration.
pub mod domain;

/// Application layer: the hub actor and its timers.
pub mod application;

/// Infrastructure layer: the WebSocket server.
pub mod infrastructure;
