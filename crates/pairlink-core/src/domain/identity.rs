//! Identity types: who a peer is, and which live connection carries it.
//!
//! Two identifiers are deliberately kept apart:
//!
//! - [`PeerIdentity`] is chosen by the client and persisted on the client side
//!   (e.g. in `localStorage`).  It survives reconnects and is the only key used
//!   for pairing.
//! - [`ConnectionId`] is assigned by the transport when a socket is accepted.
//!   It lives exactly as long as that socket.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::SignalError;

/// Longest identity string accepted from a client, in bytes.
pub const MAX_IDENTITY_LEN: usize = 128;

/// Stable, client-chosen identity of a logical participant.
///
/// Serialized as a bare JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerIdentity(String);

impl PeerIdentity {
    /// Validates and wraps a client-supplied identity string.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidIdentity`] if the string is empty,
    /// whitespace-only, or longer than [`MAX_IDENTITY_LEN`] bytes.
    pub fn parse(raw: &str) -> Result<Self, SignalError> {
        if raw.trim().is_empty() {
            return Err(SignalError::InvalidIdentity("identity must not be empty".into()));
        }
        if raw.len() > MAX_IDENTITY_LEN {
            return Err(SignalError::InvalidIdentity(format!(
                "identity exceeds {MAX_IDENTITY_LEN} bytes"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transport-assigned handle of one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocates a fresh random connection id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The first group of the UUID is plenty to correlate log lines.
        let s = self.0.to_string();
        f.write_str(&s[..8])
    }
}

/// Which end of a pair a peer plays.
///
/// The code owner is always the producer (`camera`); whoever redeems the code
/// becomes the consumer (`viewer`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Camera,
    Viewer,
}

impl Role {
    /// The role held by the other side of a pair.
    pub fn opposite(self) -> Self {
        match self {
            Role::Camera => Role::Viewer,
            Role::Viewer => Role::Camera,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Camera => f.write_str("camera"),
            Role::Viewer => f.write_str("viewer"),
        }
    }
}
