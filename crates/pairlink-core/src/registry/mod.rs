//! The three in-memory registries the hub is built from.
//!
//! Each registry enforces its own invariants inside `&mut self` methods.  None
//! of them knows about the others; cross-registry rules (e.g. "a paired
//! identity may not issue a code") live in [`crate::hub`].

pub mod codes;
pub mod pairs;
pub mod presence;

pub use codes::{CodeRegistry, Issued, PairingCode, CODE_DIGITS, CODE_SPACE, DEFAULT_CODE_TTL};
pub use pairs::PairRegistry;
pub use presence::{Binding, PresenceDirectory, PresenceEntry};
