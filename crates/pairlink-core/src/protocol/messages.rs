//! JSON message catalog exchanged between peers and the relay.
//!
//! Every message is a JSON object whose `"type"` field names the variant in
//! kebab-case; the remaining fields are camelCase:
//!
//! ```json
//! {"type":"connect-with-code","code":"4821","identity":"viewer-phone"}
//! {"type":"paired","pairedWith":"cam-garage","role":"viewer"}
//! ```
//!
//! Peer → relay and relay → peer traffic use two separate enums, so the relay
//! can never echo a client-only message back by mistake.
//!
//! Identity fields on [`ClientMessage`] stay plain strings here.  The hub
//! validates them, which lets a bad identity produce an `error` reply naming
//! the problem instead of an opaque decode failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{PeerIdentity, Role};

// ── Peer → relay ──────────────────────────────────────────────────────────────

/// Everything a peer may send to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Binds this connection to `identity`.
    Register { identity: String, role: Role },

    /// Asks for a pairing code owned by `identity`.
    GenerateCode { identity: String },

    /// Redeems a code on behalf of `identity`.
    ConnectWithCode { code: String, identity: String },

    /// Rebinds `identity` after a reconnect and asks for the current pair.
    RestoreConnection { identity: String, role: Role },

    /// Dissolves the pair `identity` belongs to.
    BreakPair { identity: String },

    /// WebRTC offer for the partner.
    Offer { target: String, payload: Value },

    /// WebRTC answer for the partner.
    Answer { target: String, payload: Value },

    /// Trickled ICE candidate for the partner.
    IceCandidate { target: String, payload: Value },

    /// Asks whether `identity` is paired and whether the partner is online.
    CheckPairStatus { identity: String },
}

impl ClientMessage {
    /// Variant name as it appears on the wire.
    ///
    /// Used in log lines instead of `{:?}` so SDP bodies never reach the log.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Register { .. } => "register",
            ClientMessage::GenerateCode { .. } => "generate-code",
            ClientMessage::ConnectWithCode { .. } => "connect-with-code",
            ClientMessage::RestoreConnection { .. } => "restore-connection",
            ClientMessage::BreakPair { .. } => "break-pair",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
            ClientMessage::CheckPairStatus { .. } => "check-pair-status",
        }
    }
}

// ── Relay → peer ──────────────────────────────────────────────────────────────

/// Everything the relay may send to a peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// A code was issued; it stops working at `expires_at` (Unix epoch ms).
    #[serde(rename_all = "camelCase")]
    CodeGenerated { code: String, expires_at: u64 },

    /// The recipient's unconsumed code lapsed.
    CodeExpired {},

    /// A pair was formed.  `role` is the recipient's own role.
    #[serde(rename_all = "camelCase")]
    Paired { paired_with: PeerIdentity, role: Role },

    /// Reply to `restore-connection` for a paired identity.
    #[serde(rename_all = "camelCase")]
    ConnectionRestored { paired_with: PeerIdentity, role: Role },

    /// The partner has a live connection again.
    PartnerOnline { identity: PeerIdentity },

    /// The partner's connection went away; the pair is intact.
    PartnerOffline { identity: PeerIdentity },

    /// The pair was dissolved.
    PairBroken {},

    /// Forwarded offer from the partner.
    Offer { from: PeerIdentity, payload: Value },

    /// Forwarded answer from the partner.
    Answer { from: PeerIdentity, payload: Value },

    /// Forwarded ICE candidate from the partner.
    IceCandidate { from: PeerIdentity, payload: Value },

    /// Reply to `check-pair-status`.
    #[serde(rename_all = "camelCase")]
    PairStatus {
        has_pair: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        paired_with: Option<PeerIdentity>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        partner_online: Option<bool>,
    },

    /// A request failed; `message` is presentable to the user.
    Error { message: String },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::CodeGenerated { .. } => "code-generated",
            ServerMessage::CodeExpired {} => "code-expired",
            ServerMessage::Paired { .. } => "paired",
            ServerMessage::ConnectionRestored { .. } => "connection-restored",
            ServerMessage::PartnerOnline { .. } => "partner-online",
            ServerMessage::PartnerOffline { .. } => "partner-offline",
            ServerMessage::PairBroken {} => "pair-broken",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
            ServerMessage::PairStatus { .. } => "pair-status",
            ServerMessage::Error { .. } => "error",
        }
    }
}
