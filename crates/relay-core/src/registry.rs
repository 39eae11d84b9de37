//! Identity registry.
//!
//! Maps each live user ID to the connection currently serving it. Every
//! operation is a single short critical section on one map shard; callers
//! get owned handles back and never hold a lock while sending.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use relay_transport::ConnectionId;
use tracing::trace;

use crate::identity::UserId;

/// User ID to connection handle mapping.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    entries: DashMap<UserId, ConnectionId>,
}

impl IdentityRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a mapping.
    ///
    /// Returns the handle previously registered for this identity, if any.
    pub fn register(&self, identity: impl Into<UserId>, handle: ConnectionId) -> Option<ConnectionId> {
        let identity = identity.into();
        trace!(user = %identity, connection = %handle, "Registering identity");
        self.entries.insert(identity, handle)
    }

    /// Insert a mapping only if the identity is not already taken.
    ///
    /// Returns `true` if the mapping was inserted.
    pub fn try_register(&self, identity: &str, handle: &ConnectionId) -> bool {
        match self.entries.entry(identity.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle.clone());
                trace!(user = %identity, connection = %handle, "Registered identity");
                true
            }
        }
    }

    /// Look up the connection serving an identity.
    #[must_use]
    pub fn resolve(&self, identity: &str) -> Option<ConnectionId> {
        self.entries.get(identity).map(|e| e.value().clone())
    }

    /// Remove a mapping. Removing an unknown identity is a no-op.
    pub fn remove(&self, identity: &str) -> Option<ConnectionId> {
        let removed = self.entries.remove(identity).map(|(_, handle)| handle);
        if removed.is_some() {
            trace!(user = %identity, "Removed identity");
        }
        removed
    }

    /// Remove a mapping only if it still points at `handle`.
    ///
    /// Returns `true` if the mapping was removed.
    pub fn remove_if_handle(&self, identity: &str, handle: &ConnectionId) -> bool {
        let removed = self.entries.remove_if(identity, |_, h| h == handle).is_some();
        if removed {
            trace!(user = %identity, connection = %handle, "Removed identity");
        }
        removed
    }

    /// Check if an identity is registered.
    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.entries.contains_key(identity)
    }

    /// Number of registered identities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All registered identities.
    #[must_use]
    pub fn identities(&self) -> Vec<UserId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}
