//! Domain layer: identities, roles, the error taxonomy, and the clock seam.
//!
//! Nothing in here performs I/O.

pub mod clock;
pub mod error;
pub mod identity;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::SignalError;
pub use identity::{ConnectionId, PeerIdentity, Role, MAX_IDENTITY_LEN};
pub use state::PeerState;
