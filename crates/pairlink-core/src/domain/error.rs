//! Error taxonomy for pairing, presence, and relay operations.
//!
//! Every variant is a caller-local, recoverable condition: the connection that
//! triggered it receives an `error` message and the relay carries on.  None of
//! them is ever retried by the relay itself.

use thiserror::Error;

/// A failed precondition on a signaling operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The identity already belongs to a pair.
    #[error("already paired")]
    AlreadyPaired,

    /// The code is unknown or its five-minute window has passed.
    #[error("invalid or expired code")]
    InvalidOrExpiredCode,

    /// The code was claimed by another redemption that has not finished yet.
    #[error("code already in use")]
    CodeInUse,

    /// The identity has no partner.
    #[error("no active pair")]
    NoActivePair,

    /// The declared target is not the sender's partner.
    #[error("unauthorized target")]
    UnauthorizedTarget,

    /// A peer tried to redeem a code it issued itself.
    #[error("cannot pair with yourself")]
    SelfPairing,

    /// No free code could be drawn; every code in the space is outstanding.
    #[error("no pairing codes available, try again later")]
    CodeSpaceExhausted,

    /// The client supplied an unusable identity string.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// The connection is already bound to a different identity.
    #[error("connection is registered as a different identity")]
    IdentityMismatch,

    /// The connection has not bound an identity yet.
    #[error("connection is not registered")]
    NotRegistered,
}
