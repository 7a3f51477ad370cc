//! Derived per-identity lifecycle state.
//!
//! ```text
//! Unpaired ──generate──► CodeIssued ──redeemed──► Paired{online|offline}
//!    ▲                       │                         │
//!    └──────expiry───────────┘                         │
//!    └──────────────────────break-pair─────────────────┘
//! ```
//!
//! Nothing stores this enum; the hub computes it from the three registries on
//! demand.

use serde::Serialize;

use super::identity::PeerIdentity;

/// Where one identity currently sits in the pairing lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum PeerState {
    /// No pair and no outstanding code.
    Unpaired,
    /// Holds an unconsumed pairing code.
    CodeIssued { code: String },
    /// Paired; `online` tracks whether the identity has a live connection.
    Paired { partner: PeerIdentity, online: bool },
}

impl PeerState {
    pub fn is_paired(&self) -> bool {
        matches!(self, PeerState::Paired { .. })
    }
}
