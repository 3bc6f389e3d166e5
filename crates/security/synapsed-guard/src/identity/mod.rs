//! Identities and the providers that resolve them

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroizing;

use crate::role::{Role, ROLE_USER};

/// In-memory identity provider
pub mod memory;

/// Ordered provider chain
pub mod chain;

/// Registry of identity kinds known to the token codec
pub mod registry;

pub use chain::ChainIdentityProvider;
pub use memory::{InMemoryIdentityProvider, IN_MEMORY_KIND};
pub use registry::{IdentityRegistry, IdentityRegistryBuilder};

/// Resolved principal behind a credential.
///
/// Owned by its [`IdentityProvider`]. The orchestrator only reads it; the
/// secret is dropped before an identity is placed into a token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    id: String,
    credential: String,
    #[serde(skip)]
    secret: Option<Zeroizing<String>>,
    roles: BTreeSet<Role>,
    active: bool,
    banned: bool,
    kind: String,
}

impl Identity {
    /// Create an active identity with [`ROLE_USER`]
    pub fn new(id: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            credential: credential.into(),
            secret: None,
            roles: BTreeSet::from([ROLE_USER]),
            active: true,
            banned: false,
            kind: IN_MEMORY_KIND.to_string(),
        }
    }

    /// Attach stored secret material (e.g. a PHC hash)
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(Zeroizing::new(secret.into()));
        self
    }

    /// Replace the role set
    #[must_use]
    pub fn with_roles<I, R>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<Role>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// Add one role
    #[must_use]
    pub fn with_role(mut self, role: impl Into<Role>) -> Self {
        self.roles.insert(role.into());
        self
    }

    /// Set the identity kind used by the token codec
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Mark as active or inactive
    #[must_use]
    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    /// Mark as banned or not
    #[must_use]
    pub fn with_banned(mut self, banned: bool) -> Self {
        self.banned = banned;
        self
    }

    /// Opaque identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Lookup key
    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }

    /// Stored secret, if still attached
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().map(String::as_str)
    }

    /// Granted roles
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// Whether the account is enabled
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether the account is banned
    #[must_use]
    pub fn is_banned(&self) -> bool {
        self.banned
    }

    /// Identity kind
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Same identity with the secret erased
    #[must_use]
    pub fn without_secret(mut self) -> Self {
        self.secret = None;
        self
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("credential", &self.credential)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("roles", &self.roles)
            .field("active", &self.active)
            .field("banned", &self.banned)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Identity provider failures
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No identity for the credential
    #[error("identity \"{0}\" not found")]
    NotFound(String),

    /// Backend failed
    #[error("identity provider unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),
}

/// Resolves credentials to identities.
///
/// Called concurrently by racing strategies; implementations must be
/// internally synchronized.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve an identity by credential
    async fn provide(&self, credential: &str) -> Result<Identity, ProviderError>;

    /// Reload the current state of an identity previously provided
    async fn refresh(&self, identity: &Identity) -> Result<Identity, ProviderError>;

    /// Whether this provider owns the identity
    fn supports(&self, identity: &Identity) -> bool;
}
