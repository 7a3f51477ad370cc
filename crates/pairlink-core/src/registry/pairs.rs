//! PairRegistry: the durable, symmetric identity-to-identity pairing.
//!
//! A pair `{a, b}` is stored as two directed entries, `a → b` and `b → a`.
//! Both are written or removed inside the same `&mut self` call, so no reader
//! can observe a one-sided entry.  Presence has no say here: a pair outlives
//! any number of disconnects and ends only through [`PairRegistry::break_pair`].

use std::collections::HashMap;

use crate::domain::{PeerIdentity, Role, SignalError};

#[derive(Debug, Clone, PartialEq, Eq)]
struct PairEntry {
    partner: PeerIdentity,
    role: Role,
}

/// Table of active pairs.
#[derive(Debug, Default)]
pub struct PairRegistry {
    pairs: HashMap<PeerIdentity, PairEntry>,
}

impl PairRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pairs `camera` with `viewer`.
    ///
    /// # Errors
    ///
    /// - [`SignalError::SelfPairing`] if both are the same identity.
    /// - [`SignalError::AlreadyPaired`] if either side already has a partner.
    pub fn pair(
        &mut self,
        camera: &PeerIdentity,
        viewer: &PeerIdentity,
    ) -> Result<(), SignalError> {
        if camera == viewer {
            return Err(SignalError::SelfPairing);
        }
        if self.pairs.contains_key(camera) || self.pairs.contains_key(viewer) {
            return Err(SignalError::AlreadyPaired);
        }

        self.pairs.insert(
            camera.clone(),
            PairEntry {
                partner: viewer.clone(),
                role: Role::Camera,
            },
        );
        self.pairs.insert(
            viewer.clone(),
            PairEntry {
                partner: camera.clone(),
                role: Role::Viewer,
            },
        );
        Ok(())
    }

    /// Dissolves the pair containing `identity` and returns the former partner.
    ///
    /// # Errors
    ///
    /// [`SignalError::NoActivePair`] if `identity` has no partner.
    pub fn break_pair(&mut self, identity: &PeerIdentity) -> Result<PeerIdentity, SignalError> {
        let entry = self
            .pairs
            .remove(identity)
            .ok_or(SignalError::NoActivePair)?;
        self.pairs.remove(&entry.partner);
        Ok(entry.partner)
    }

    pub fn partner_of(&self, identity: &PeerIdentity) -> Option<&PeerIdentity> {
        self.pairs.get(identity).map(|entry| &entry.partner)
    }

    /// Role `identity` plays within its pair.
    pub fn role_of(&self, identity: &PeerIdentity) -> Option<Role> {
        self.pairs.get(identity).map(|entry| entry.role)
    }

    pub fn is_paired(&self, identity: &PeerIdentity) -> bool {
        self.pairs.contains_key(identity)
    }

    /// Number of pairs (not directed entries).
    pub fn len(&self) -> usize {
        self.pairs.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Checks `pairs[a] = b ⇔ pairs[b] = a` over the whole table, with
    /// complementary roles on each side.
    ///
    /// A `false` here is a bug in this module, never a runtime condition.
    pub fn is_symmetric(&self) -> bool {
        self.pairs.iter().all(|(identity, entry)| {
            self.pairs.get(&entry.partner).is_some_and(|back| {
                &back.partner == identity && back.role == entry.role.opposite()
            })
        })
    }
}
