use std::collections::BTreeSet;

use super::IN_MEMORY_KIND;

/// Identity kinds the token codec accepts.
///
/// Assembled once at startup with [`IdentityRegistryBuilder`] and immutable
/// afterwards; share it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRegistry {
    kinds: BTreeSet<String>,
}

impl IdentityRegistry {
    /// Start a registry
    #[must_use]
    pub fn builder() -> IdentityRegistryBuilder {
        IdentityRegistryBuilder::default()
    }

    /// Whether a kind was registered
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    /// Registered kinds in sorted order
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.iter().map(String::as_str)
    }
}

impl Default for IdentityRegistry {
    /// Registry holding only the built-in in-memory kind
    fn default() -> Self {
        Self::builder().register(IN_MEMORY_KIND).build()
    }
}

/// Builder for [`IdentityRegistry`]
#[derive(Debug, Default)]
pub struct IdentityRegistryBuilder {
    kinds: BTreeSet<String>,
}

impl IdentityRegistryBuilder {
    /// Register an identity kind
    #[must_use]
    pub fn register(mut self, kind: impl Into<String>) -> Self {
        self.kinds.insert(kind.into());
        self
    }

    /// Freeze the registry
    #[must_use]
    pub fn build(self) -> IdentityRegistry {
        IdentityRegistry { kinds: self.kinds }
    }
}
