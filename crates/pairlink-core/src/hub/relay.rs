//! SignalingRelay: authorization and routing of WebRTC negotiation messages.
//!
//! A negotiation message may only travel between the two halves of a pair.
//! Without this check any connected peer could inject an offer into someone
//! else's session.  The relay never looks inside the payload.

use serde_json::Value;

use crate::domain::{ConnectionId, PeerIdentity, SignalError};
use crate::protocol::ServerMessage;
use crate::registry::{PairRegistry, PresenceDirectory};

/// The three negotiation message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    /// ICE candidates keep trickling in for a moment after a pair is broken.
    /// Those are dropped without telling the sender.
    pub fn fails_silently(self) -> bool {
        matches!(self, SignalKind::IceCandidate)
    }

    /// Wraps `payload` into the message delivered to the partner.
    pub fn forward(self, from: PeerIdentity, payload: Value) -> ServerMessage {
        match self {
            SignalKind::Offer => ServerMessage::Offer { from, payload },
            SignalKind::Answer => ServerMessage::Answer { from, payload },
            SignalKind::IceCandidate => ServerMessage::IceCandidate { from, payload },
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }
}

/// Read-only view over the pair and presence tables used to route one message.
pub struct SignalingRelay<'a> {
    pairs: &'a PairRegistry,
    presence: &'a PresenceDirectory,
}

impl<'a> SignalingRelay<'a> {
    pub fn new(pairs: &'a PairRegistry, presence: &'a PresenceDirectory) -> Self {
        Self { pairs, presence }
    }

    /// Decides where a message from `sender` to `target` goes.
    ///
    /// Returns `Ok(Some(connection))` to deliver, `Ok(None)` when the target is
    /// the sender's partner but offline (the message is dropped; negotiation
    /// messages are not queued).
    ///
    /// # Errors
    ///
    /// [`SignalError::UnauthorizedTarget`] unless `target` is the sender's
    /// current partner.
    pub fn route(
        &self,
        sender: &PeerIdentity,
        target: &PeerIdentity,
    ) -> Result<Option<ConnectionId>, SignalError> {
        match self.pairs.partner_of(sender) {
            Some(partner) if partner == target => Ok(self.presence.handle_of(target)),
            _ => Err(SignalError::UnauthorizedTarget),
        }
    }
}
