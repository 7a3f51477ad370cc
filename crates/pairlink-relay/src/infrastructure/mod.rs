//! Infrastructure layer for pairlink-relay.
//!
//! Handles all network I/O: binding the listener, the WebSocket handshake,
//! and the per-session reader/writer tasks.  Sessions talk to the rest of the
//! relay only through a [`crate::application::HubHandle`].

pub mod ws_server;

pub use ws_server::{run_server, serve};
