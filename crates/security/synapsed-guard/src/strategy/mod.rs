//! Authentication strategies
//!
//! An [`Authenticator`] describes one mechanism over its own credential type:
//! how to recognise a request, pull credentials out of it, find the identity
//! and check the secret. [`Pipeline`] wraps an authenticator into a
//! [`Strategy`], the object-safe unit the orchestrator races, and runs the
//! fixed verification order with both policy gates and cancellation
//! checkpoints in between.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::StrategyError;
use crate::identity::{Identity, IdentityProvider};
use crate::policy::PolicyChecker;
use crate::request::AuthRequest;
use crate::secret::SecretChecker;
use crate::token::{Token, TokenFactory, VerifiedIdentity};

/// Verification pipeline
pub mod pipeline;

/// Form login
pub mod form;

/// HTTP basic authentication
pub mod basic;

/// HMAC-signed bearer tokens
pub mod bearer;

/// Delaying decorator
pub mod delayed;

pub use basic::{BasicCredentials, HttpBasicAuthenticator};
pub use bearer::{BearerClaims, BearerCredentials, BearerTokenAuthenticator, BearerTokenIssuer};
pub use delayed::Delayed;
pub use form::{FormCredentials, FormLoginAuthenticator};
pub use pipeline::Pipeline;

/// Name of a strategy, used for attribution and diagnostics
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StrategyId(Arc<str>);

impl StrategyId {
    /// Strategy name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StrategyId {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for StrategyId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl Borrow<str> for StrategyId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for StrategyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Outcome of one strategy attempt, attributed to its strategy
#[derive(Debug, Clone)]
pub struct AttemptResult {
    /// Strategy that produced the outcome
    pub strategy: StrategyId,
    /// Token on success, tagged error otherwise
    pub outcome: Result<Token, StrategyError>,
}

/// Everything one racing unit needs.
///
/// Cheap to clone; each unit gets its own copy.
#[derive(Clone)]
pub struct Attempt {
    request: Arc<AuthRequest>,
    identities: Arc<dyn IdentityProvider>,
    policy: Arc<dyn PolicyChecker>,
    cancel: CancellationToken,
}

impl Attempt {
    /// Assemble an attempt
    pub fn new(
        request: Arc<AuthRequest>,
        identities: Arc<dyn IdentityProvider>,
        policy: Arc<dyn PolicyChecker>,
        cancel: CancellationToken,
    ) -> Self {
        Self { request, identities, policy, cancel }
    }

    /// The request being authenticated
    #[must_use]
    pub fn request(&self) -> &AuthRequest {
        &self.request
    }

    /// Identity provider
    #[must_use]
    pub fn identities(&self) -> &dyn IdentityProvider {
        self.identities.as_ref()
    }

    /// Policy gate
    #[must_use]
    pub fn policy(&self) -> &dyn PolicyChecker {
        self.policy.as_ref()
    }

    /// Race cancellation signal
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fails with [`StrategyError::Cancelled`] once the race was cancelled
    pub fn checkpoint(&self) -> Result<(), StrategyError> {
        if self.cancel.is_cancelled() {
            Err(StrategyError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One pluggable authentication mechanism with its own credential type
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Credential payload; never shared with other strategies
    type Credentials: Send + Sync + fmt::Debug;

    /// Stable strategy name
    fn name(&self) -> &str;

    /// Whether this mechanism applies to the request.
    ///
    /// Runs synchronously before any concurrent work; must be pure and do no IO.
    fn supports(&self, request: &AuthRequest) -> bool;

    /// Read credentials from the request
    fn extract_credentials(&self, request: &AuthRequest) -> Result<Self::Credentials, StrategyError>;

    /// Look the identity up
    async fn resolve_identity(
        &self,
        identities: &dyn IdentityProvider,
        credentials: &Self::Credentials,
    ) -> Result<Identity, StrategyError>;

    /// Check the presented secret against the identity
    async fn verify(&self, credentials: &Self::Credentials, identity: &Identity) -> Result<(), StrategyError>;

    /// Build the token for a verified identity
    fn issue_token(&self, factory: &dyn TokenFactory, verified: VerifiedIdentity) -> Result<Token, StrategyError> {
        factory.issue(verified)
    }
}

/// Unit of work raced by the orchestrator
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Strategy name
    fn id(&self) -> &StrategyId;

    /// Pure applicability check
    fn supports(&self, request: &AuthRequest) -> bool;

    /// Run a full attempt
    async fn run(&self, attempt: &Attempt) -> Result<Token, StrategyError>;
}

/// Compare a plain secret with the identity's stored secret
pub(crate) async fn check_stored_secret(
    secrets: &dyn SecretChecker,
    plain: &[u8],
    identity: &Identity,
) -> Result<(), StrategyError> {
    let stored = identity.secret().ok_or(StrategyError::SecretMismatch)?;
    secrets.check_secret(plain, stored).await.map_err(StrategyError::from)
}
