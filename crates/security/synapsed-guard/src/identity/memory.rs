use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Identity, IdentityProvider, ProviderError};

/// Identity kind of records held by [`InMemoryIdentityProvider`]
pub const IN_MEMORY_KIND: &str = "in_memory";

/// Identity provider backed by a map keyed on credential.
///
/// Records can be updated while requests are in flight; `refresh` always
/// re-reads the current record.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    identities: RwLock<HashMap<String, Identity>>,
}

impl InMemoryIdentityProvider {
    /// Create an empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    #[must_use]
    pub fn with_identity(self, identity: Identity) -> Self {
        self.insert(identity);
        self
    }

    /// Insert or replace a record
    pub fn insert(&self, identity: Identity) {
        let identity = identity.with_kind(IN_MEMORY_KIND);
        self.identities.write().insert(identity.credential().to_string(), identity);
    }

    /// Remove a record
    pub fn remove(&self, credential: &str) -> Option<Identity> {
        self.identities.write().remove(credential)
    }

    /// Apply a change to an existing record
    pub fn update<F>(&self, credential: &str, change: F) -> bool
    where
        F: FnOnce(Identity) -> Identity,
    {
        let mut identities = self.identities.write();
        match identities.remove(credential) {
            Some(identity) => {
                let updated = change(identity).with_kind(IN_MEMORY_KIND);
                identities.insert(updated.credential().to_string(), updated);
                true
            }
            None => false,
        }
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.identities.read().len()
    }

    /// Whether the provider holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identities.read().is_empty()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn provide(&self, credential: &str) -> Result<Identity, ProviderError> {
        self.identities
            .read()
            .get(credential)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(credential.to_string()))
    }

    async fn refresh(&self, identity: &Identity) -> Result<Identity, ProviderError> {
        self.identities
            .read()
            .get(identity.credential())
            .filter(|current| current.id() == identity.id())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(identity.credential().to_string()))
    }

    fn supports(&self, identity: &Identity) -> bool {
        identity.kind() == IN_MEMORY_KIND
    }
}
