//! CodeRegistry: issues, redeems, and expires short numeric pairing codes.
//!
//! A code is four decimal digits, drawn uniformly from `0000..=9999`.  Each
//! owner holds at most one unconsumed code; issuing again replaces the old one.
//!
//! # Redemption
//!
//! Redemption is split into three steps so the caller can create the pair in
//! between without a window where the same code is redeemable twice:
//!
//! ```text
//! claim(code)   ──► consumed = true   (a second claim now gets CodeInUse)
//!   pair(owner, claimant)
//! finish(code)  ──► entry deleted     (single use)
//! release(code) ──► consumed = false  (only if pairing failed)
//! ```
//!
//! # Expiry
//!
//! Three paths remove a lapsed code: the per-code deferred task
//! ([`CodeRegistry::expire`]), the periodic sweep ([`CodeRegistry::sweep`]), and
//! the lazy check on redemption ([`CodeRegistry::remove_lapsed`]).  All of them
//! delete only an entry that still exists and is still unconsumed, so whichever
//! runs first wins and the others become no-ops.

use std::collections::HashMap;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::{PeerIdentity, SignalError};

/// Number of decimal digits in a pairing code.
pub const CODE_DIGITS: usize = 4;

/// Size of the code space (`10^CODE_DIGITS`).
pub const CODE_SPACE: u32 = 10_000;

/// How long an issued code stays redeemable.
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(5 * 60);

/// Random draws attempted before giving up on finding a free code.
const MAX_DRAWS: usize = 64;

/// One issued pairing code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairingCode {
    pub code: String,
    pub owner: PeerIdentity,
    pub issued_at_ms: u64,
    pub expires_at_ms: u64,
    pub consumed: bool,
    /// Identifies this issuance.  The same four digits may be reissued later;
    /// a deferred expiry only ever acts on the serial it was scheduled for.
    pub serial: u64,
}

impl PairingCode {
    /// `true` once `now_ms` is strictly past the expiry instant.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        now_ms > self.expires_at_ms
    }
}

/// Result of [`CodeRegistry::issue`].
#[derive(Debug, Clone)]
pub struct Issued {
    /// The freshly issued code.
    pub code: PairingCode,
    /// The owner's previous unconsumed code, if one was replaced.
    pub replaced: Option<PairingCode>,
}

/// In-memory table of outstanding pairing codes.
pub struct CodeRegistry {
    codes: HashMap<String, PairingCode>,
    by_owner: HashMap<PeerIdentity, String>,
    ttl: Duration,
    rng: StdRng,
    next_serial: u64,
}

impl CodeRegistry {
    /// Creates an empty registry seeded from OS entropy.
    pub fn new(ttl: Duration) -> Self {
        Self::with_rng(ttl, StdRng::from_entropy())
    }

    /// Creates an empty registry drawing codes from `rng`.
    pub fn with_rng(ttl: Duration, rng: StdRng) -> Self {
        Self {
            codes: HashMap::new(),
            by_owner: HashMap::new(),
            ttl,
            rng,
            next_serial: 1,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a new code for `owner`, replacing any unconsumed code it holds.
    ///
    /// The caller is responsible for refusing owners that are already paired.
    ///
    /// # Errors
    ///
    /// [`SignalError::CodeSpaceExhausted`] if no free code turned up after a
    /// bounded number of draws.
    pub fn issue(&mut self, owner: &PeerIdentity, now_ms: u64) -> Result<Issued, SignalError> {
        // Drawn before the old code is withdrawn, so a failed draw leaves it
        // in place.
        let code = self.draw_free_code().ok_or(SignalError::CodeSpaceExhausted)?;
        let replaced = self.revoke_owner(owner);
        let ttl_ms = u64::try_from(self.ttl.as_millis()).unwrap_or(u64::MAX);
        let entry = PairingCode {
            code: code.clone(),
            owner: owner.clone(),
            issued_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(ttl_ms),
            consumed: false,
            serial: self.next_serial,
        };
        self.next_serial += 1;

        self.codes.insert(code.clone(), entry.clone());
        self.by_owner.insert(owner.clone(), code);

        Ok(Issued {
            code: entry,
            replaced,
        })
    }

    fn draw_free_code(&mut self) -> Option<String> {
        (0..MAX_DRAWS)
            .map(|_| format!("{:0width$}", self.rng.gen_range(0..CODE_SPACE), width = CODE_DIGITS))
            .find(|candidate| !self.codes.contains_key(candidate))
    }

    /// Marks `code` consumed on behalf of `claimant` and returns its owner.
    ///
    /// # Errors
    ///
    /// - [`SignalError::InvalidOrExpiredCode`] if the code is unknown or lapsed.
    /// - [`SignalError::CodeInUse`] if another claim holds it.
    /// - [`SignalError::SelfPairing`] if `claimant` owns the code.
    pub fn claim(
        &mut self,
        code: &str,
        claimant: &PeerIdentity,
        now_ms: u64,
    ) -> Result<PeerIdentity, SignalError> {
        let entry = self
            .codes
            .get_mut(code)
            .ok_or(SignalError::InvalidOrExpiredCode)?;

        if entry.is_expired_at(now_ms) {
            return Err(SignalError::InvalidOrExpiredCode);
        }
        if entry.consumed {
            return Err(SignalError::CodeInUse);
        }
        if &entry.owner == claimant {
            return Err(SignalError::SelfPairing);
        }

        entry.consumed = true;
        Ok(entry.owner.clone())
    }

    /// Deletes a claimed code once its pair exists.
    pub fn finish(&mut self, code: &str) -> Option<PairingCode> {
        match self.codes.get(code) {
            Some(entry) if entry.consumed => self.remove(code),
            _ => None,
        }
    }

    /// Returns a claimed code to the redeemable state after a failed pairing.
    pub fn release(&mut self, code: &str) {
        if let Some(entry) = self.codes.get_mut(code) {
            entry.consumed = false;
        }
    }

    /// Deferred expiry for one specific issuance.
    ///
    /// Removes the code only if it still exists, still carries `serial`, and
    /// is still unconsumed.
    pub fn expire(&mut self, code: &str, serial: u64) -> Option<PairingCode> {
        match self.codes.get(code) {
            Some(entry) if entry.serial == serial && !entry.consumed => self.remove(code),
            _ => None,
        }
    }

    /// Lazy expiry check used on redemption.
    pub fn remove_lapsed(&mut self, code: &str, now_ms: u64) -> Option<PairingCode> {
        match self.codes.get(code) {
            Some(entry) if !entry.consumed && entry.is_expired_at(now_ms) => self.remove(code),
            _ => None,
        }
    }

    /// Removes every unconsumed code whose window has passed.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<PairingCode> {
        let lapsed: Vec<String> = self
            .codes
            .values()
            .filter(|entry| !entry.consumed && entry.is_expired_at(now_ms))
            .map(|entry| entry.code.clone())
            .collect();

        lapsed
            .iter()
            .filter_map(|code| self.remove(code))
            .collect()
    }

    /// Withdraws the unconsumed code held by `owner`, if any.
    pub fn revoke_owner(&mut self, owner: &PeerIdentity) -> Option<PairingCode> {
        let code = self.by_owner.get(owner)?.clone();
        match self.codes.get(&code) {
            Some(entry) if !entry.consumed => self.remove(&code),
            _ => None,
        }
    }

    fn remove(&mut self, code: &str) -> Option<PairingCode> {
        let entry = self.codes.remove(code)?;
        if self.by_owner.get(&entry.owner).map(String::as_str) == Some(code) {
            self.by_owner.remove(&entry.owner);
        }
        Some(entry)
    }

    pub fn get(&self, code: &str) -> Option<&PairingCode> {
        self.codes.get(code)
    }

    /// The code currently held by `owner`.
    pub fn code_of(&self, owner: &PeerIdentity) -> Option<&PairingCode> {
        self.by_owner.get(owner).and_then(|code| self.codes.get(code))
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl Default for CodeRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_TTL)
    }
}
