//! Application layer for pairlink-relay.
//!
//! Orchestrates the pairing state machine on the Tokio runtime: a single hub
//! actor owns every registry, expiry timers and the sweeper feed it commands,
//! and its effects are routed to per-connection outbound queues.
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or WebSocket framing (that is infrastructure)
//! - Pairing rules themselves (those live in `pairlink-core`)

pub mod expiry;
pub mod hub_actor;

pub use expiry::{spawn_sweeper, ExpiryTimers};
pub use hub_actor::{run_hub, spawn_hub, HubCommand, HubHandle, HubStopped};
