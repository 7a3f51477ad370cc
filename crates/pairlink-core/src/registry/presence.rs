//! PresenceDirectory: which live connection currently speaks for an identity.
//!
//! The directory is two maps kept in lockstep:
//!
//! - `identity → (connection, role)`: at most one live connection per identity.
//! - `connection → identity`: at most one identity per connection.
//!
//! Binding an identity that already has a connection moves it to the new one;
//! the old connection is dropped from both maps, so it is never addressed
//! again and its eventual disconnect is a no-op.

use std::collections::HashMap;

use crate::domain::{ConnectionId, PeerIdentity, Role};

/// Live connection bound to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceEntry {
    pub connection: ConnectionId,
    pub role: Role,
}

/// What a [`PresenceDirectory::bind`] call displaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    /// Older connection that had been carrying the same identity.
    pub replaced: Option<ConnectionId>,
    /// Identity the connection carried before, if it was a different one and
    /// is now offline as a result.
    pub detached: Option<PeerIdentity>,
}

#[derive(Debug, Default)]
pub struct PresenceDirectory {
    by_identity: HashMap<PeerIdentity, PresenceEntry>,
    by_connection: HashMap<ConnectionId, PeerIdentity>,
}

impl PresenceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `identity` to `connection`, displacing any stale binding on
    /// either side.
    pub fn bind(
        &mut self,
        identity: &PeerIdentity,
        connection: ConnectionId,
        role: Role,
    ) -> Binding {
        let mut binding = Binding::default();

        if let Some(previous) = self.by_connection.get(&connection).cloned() {
            if &previous != identity {
                if self.current_owner_is(&previous, connection) {
                    self.by_identity.remove(&previous);
                }
                binding.detached = Some(previous);
            }
        }

        if let Some(old) = self.by_identity.get(identity).map(|entry| entry.connection) {
            if old != connection {
                self.by_connection.remove(&old);
                binding.replaced = Some(old);
            }
        }

        self.by_identity
            .insert(identity.clone(), PresenceEntry { connection, role });
        self.by_connection.insert(connection, identity.clone());
        binding
    }

    /// Removes the binding held by `connection`.
    ///
    /// Returns the identity that went offline, or `None` if `connection` was
    /// unbound or had already been superseded by a newer connection.
    pub fn unbind(&mut self, connection: ConnectionId) -> Option<PeerIdentity> {
        let identity = self.by_connection.remove(&connection)?;
        if self.current_owner_is(&identity, connection) {
            self.by_identity.remove(&identity);
            Some(identity)
        } else {
            None
        }
    }

    fn current_owner_is(&self, identity: &PeerIdentity, connection: ConnectionId) -> bool {
        self.by_identity
            .get(identity)
            .is_some_and(|entry| entry.connection == connection)
    }

    pub fn is_online(&self, identity: &PeerIdentity) -> bool {
        self.by_identity.contains_key(identity)
    }

    pub fn handle_of(&self, identity: &PeerIdentity) -> Option<ConnectionId> {
        self.by_identity.get(identity).map(|entry| entry.connection)
    }

    pub fn identity_of(&self, connection: ConnectionId) -> Option<&PeerIdentity> {
        self.by_connection.get(&connection)
    }

    pub fn entry(&self, identity: &PeerIdentity) -> Option<&PresenceEntry> {
        self.by_identity.get(identity)
    }

    /// Number of identities with a live connection.
    pub fn online_count(&self) -> usize {
        self.by_identity.len()
    }
}
