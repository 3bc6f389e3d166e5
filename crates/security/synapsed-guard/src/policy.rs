//! Eligibility gates run before and after secret verification

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::{Identity, IdentityProvider};

/// Why a policy rejected an identity
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyViolation {
    /// Account is not active
    #[error("account disabled")]
    Disabled,

    /// Account is banned
    #[error("account banned")]
    Banned,

    /// Account changed or disappeared after lookup
    #[error("account revoked")]
    Revoked,

    /// Application-defined rule
    #[error("{0}")]
    Custom(String),
}

/// Pre/post authentication gate.
///
/// Invoked concurrently by racing strategies; implementations must be
/// stateless or internally synchronized.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PolicyChecker: Send + Sync {
    /// Check an identity before its secret is compared
    async fn check_pre_auth(&self, identity: &Identity) -> Result<(), PolicyViolation>;

    /// Check an identity after its secret was verified
    async fn check_post_auth(&self, identity: &Identity) -> Result<(), PolicyViolation>;
}

/// Accepts every identity
#[derive(Debug, Default, Clone, Copy)]
pub struct PermitAllPolicy;

#[async_trait]
impl PolicyChecker for PermitAllPolicy {
    async fn check_pre_auth(&self, _identity: &Identity) -> Result<(), PolicyViolation> {
        Ok(())
    }

    async fn check_post_auth(&self, _identity: &Identity) -> Result<(), PolicyViolation> {
        Ok(())
    }
}

/// Rejects inactive and banned accounts.
///
/// With a provider attached, the post-auth check re-reads the account and
/// reports [`PolicyViolation::Revoked`] if it vanished, was disabled or banned
/// while the secret was being verified.
#[derive(Default, Clone)]
pub struct AccountStatusPolicy {
    revalidate_with: Option<Arc<dyn IdentityProvider>>,
}

impl AccountStatusPolicy {
    /// Create a policy checking the flags of the looked-up identity only
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-fetch the account through `provider` in the post-auth phase
    #[must_use]
    pub fn with_revalidation(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.revalidate_with = Some(provider);
        self
    }

    fn check_flags(identity: &Identity) -> Result<(), PolicyViolation> {
        if identity.is_banned() {
            return Err(PolicyViolation::Banned);
        }
        if !identity.is_active() {
            return Err(PolicyViolation::Disabled);
        }
        Ok(())
    }
}

#[async_trait]
impl PolicyChecker for AccountStatusPolicy {
    async fn check_pre_auth(&self, identity: &Identity) -> Result<(), PolicyViolation> {
        Self::check_flags(identity)
    }

    async fn check_post_auth(&self, identity: &Identity) -> Result<(), PolicyViolation> {
        let Some(provider) = &self.revalidate_with else {
            return Ok(());
        };

        let current = provider.refresh(identity).await.map_err(|e| {
            tracing::debug!(identity = identity.id(), error = %e, "post-auth refresh failed");
            PolicyViolation::Revoked
        })?;

        Self::check_flags(&current).map_err(|_| PolicyViolation::Revoked)
    }
}
