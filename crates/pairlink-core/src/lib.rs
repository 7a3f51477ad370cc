//! # pairlink-core
//!
//! Pairing, presence, and signaling-relay state machine for a camera/viewer
//! WebRTC pairing service.
//!
//! This crate performs no I/O.  The relay binary (`pairlink-relay`) owns the
//! sockets and timers and drives a [`SignalingHub`] one event at a time.
//!
//! # How two peers meet
//!
//! ```text
//! camera                         relay                          viewer
//! ──────                         ─────                          ──────
//! generate-code ───────────────► CodeRegistry.issue
//!               ◄─── code-generated {code:"4821"}
//!                    (code read aloud / typed on the viewer)
//!                                CodeRegistry.claim ◄────────── connect-with-code
//!                                PairRegistry.pair
//!               ◄─── paired ──────────────── paired ──────────►
//! offer ───────────────────────► SignalingRelay.route ─────────► offer
//!               ◄──────────────── answer / ice-candidate ◄────── …
//! ```
//!
//! Once paired, the two identities stay paired across any number of
//! reconnects until one side sends `break-pair`.
//!
//! # Modules
//!
//! - **`domain`** – identities, roles, errors, and the clock seam.
//! - **`registry`** – `CodeRegistry`, `PairRegistry`, `PresenceDirectory`.
//! - **`protocol`** – the JSON message catalog and its codec.
//! - **`hub`** – `SignalingHub` (the state machine) and `SignalingRelay`.

pub mod domain;
pub mod hub;
pub mod protocol;
pub mod registry;

pub use domain::{
    Clock, ConnectionId, ManualClock, PeerIdentity, PeerState, Role, SignalError, SystemClock,
};
pub use hub::{Effect, SignalKind, SignalingHub, SignalingRelay};
pub use protocol::{ClientMessage, ServerMessage};
pub use registry::{CodeRegistry, PairRegistry, PairingCode, PresenceDirectory};
