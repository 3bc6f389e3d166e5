//! Error types for synapsed-guard
//!
//! Three layers:
//! - [`StrategyError`]: what went wrong inside one racing strategy. Stays local to
//!   that attempt and is only used for diagnostics.
//! - [`AuthenticationError`]: the outcome reported to the caller of the orchestrator.
//!   Every authentication failure renders the same message so that callers cannot
//!   learn which stage rejected a credential.
//! - [`Error`]: infrastructure errors (configuration, signing, token encoding).

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::identity::ProviderError;
use crate::secret::SecretError;
use crate::strategy::StrategyId;

/// Result type alias for synapsed-guard operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for synapsed-guard infrastructure
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Request scope was not prepared correctly
    #[error(transparent)]
    Setup(#[from] SetupError),

    /// Signing or signature verification failed
    #[error(transparent)]
    Signature(#[from] SignatureError),

    /// Secret hashing failed
    #[error("Secret hashing failed: {0}")]
    SecretHashing(String),

    /// Token could not be encoded or decoded
    #[error("Token codec error: {0}")]
    Codec(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Programmer errors in how the request scope was assembled.
///
/// These are never retried and are not authentication failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// No token store was attached to the request context
    #[error("token store not initialized for request")]
    TokenStoreMissing,

    /// The orchestrator was built without an identity provider
    #[error("no identity provider configured")]
    IdentityProviderMissing,
}

/// Signing failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// Key material was rejected by the MAC implementation
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// Signature did not match the payload
    #[error("signature mismatch")]
    Mismatch,

    /// Payload could not be encoded for signing
    #[error("unsignable payload: {0}")]
    Payload(String),

    /// Signed by a key this verifier does not hold
    #[error("unknown key id: {0}")]
    UnknownKey(String),
}

/// Phase of the policy gate that rejected an identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyPhase {
    /// Before secret verification
    Pre,
    /// After secret verification
    Post,
}

impl fmt::Display for PolicyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyPhase::Pre => f.write_str("pre-auth"),
            PolicyPhase::Post => f.write_str("post-auth"),
        }
    }
}

/// Failure of a single strategy attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// The strategy does not handle this request
    #[error("request not supported by strategy")]
    NotApplicable,

    /// Credential material could not be read from the request
    #[error("credential extraction failed: {0}")]
    CredentialExtractionFailed(String),

    /// The identity provider has no identity for the credential
    #[error("identity not found: {0}")]
    IdentityNotFound(String),

    /// The identity provider itself failed
    #[error("identity provider failed: {0}")]
    IdentityProviderFailed(String),

    /// The policy gate rejected the identity
    #[error("{phase} policy rejected identity: {reason}")]
    PolicyRejected {
        /// Gate phase
        phase: PolicyPhase,
        /// Violation reported by the policy checker
        reason: String,
    },

    /// Supplied secret does not match the stored one
    #[error("secret mismatch")]
    SecretMismatch,

    /// Credential was well formed but is no longer valid
    #[error("credential expired")]
    CredentialExpired,

    /// Token factory failed
    #[error("token issue failed: {0}")]
    TokenIssueFailed(String),

    /// Attempt observed the race cancellation signal
    #[error("attempt cancelled")]
    Cancelled,

    /// Attempt crashed
    #[error("internal error: {0}")]
    Internal(String),
}

impl StrategyError {
    /// Short stable tag, used as a log field
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            StrategyError::NotApplicable => "not_applicable",
            StrategyError::CredentialExtractionFailed(_) => "credential_extraction_failed",
            StrategyError::IdentityNotFound(_) => "identity_not_found",
            StrategyError::IdentityProviderFailed(_) => "identity_provider_failed",
            StrategyError::PolicyRejected { phase: PolicyPhase::Pre, .. } => "policy_rejected_pre",
            StrategyError::PolicyRejected { phase: PolicyPhase::Post, .. } => "policy_rejected_post",
            StrategyError::SecretMismatch => "secret_mismatch",
            StrategyError::CredentialExpired => "credential_expired",
            StrategyError::TokenIssueFailed(_) => "token_issue_failed",
            StrategyError::Cancelled => "cancelled",
            StrategyError::Internal(_) => "internal",
        }
    }
}

impl From<ProviderError> for StrategyError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(credential) => StrategyError::IdentityNotFound(credential),
            ProviderError::Unavailable(e) => StrategyError::IdentityProviderFailed(e.to_string()),
        }
    }
}

impl From<SecretError> for StrategyError {
    fn from(err: SecretError) -> Self {
        match err {
            SecretError::Mismatch => StrategyError::SecretMismatch,
            other => StrategyError::Internal(other.to_string()),
        }
    }
}

/// Last failure seen per strategy during one race
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptFailures {
    failures: BTreeMap<StrategyId, StrategyError>,
}

impl AttemptFailures {
    /// Record a failure, replacing any earlier one for the same strategy
    pub fn record(&mut self, strategy: StrategyId, error: StrategyError) {
        self.failures.insert(strategy, error);
    }

    /// Failure recorded for a strategy
    #[must_use]
    pub fn get(&self, strategy: &str) -> Option<&StrategyError> {
        self.failures.get(strategy)
    }

    /// Number of strategies with a recorded failure
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Iterate in strategy-name order
    pub fn iter(&self) -> impl Iterator<Item = (&StrategyId, &StrategyError)> {
        self.failures.iter()
    }
}

/// Outcome reported to callers when no token could be established
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticationError {
    /// No configured strategy supports the request
    #[error("authentication failed")]
    NoApplicableStrategy,

    /// Every applicable strategy failed
    #[error("authentication failed")]
    AllStrategiesFailed {
        /// Per-strategy diagnostics; never expose these to the client
        failures: AttemptFailures,
    },

    /// The caller cancelled the race
    #[error("authentication cancelled")]
    Cancelled,

    /// The race deadline elapsed before any strategy succeeded
    #[error("authentication deadline exceeded")]
    DeadlineExceeded,

    /// Request scope was not set up
    #[error("authentication setup error: {0}")]
    Setup(#[from] SetupError),
}

impl AuthenticationError {
    /// Per-strategy failures, present only for [`AuthenticationError::AllStrategiesFailed`]
    #[must_use]
    pub fn failures(&self) -> Option<&AttemptFailures> {
        match self {
            AuthenticationError::AllStrategiesFailed { failures } => Some(failures),
            _ => None,
        }
    }

    /// Cancelled by the caller or by the deadline
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, AuthenticationError::Cancelled | AuthenticationError::DeadlineExceeded)
    }

    /// Programmer error in the request scope
    #[must_use]
    pub fn is_setup_error(&self) -> bool {
        matches!(self, AuthenticationError::Setup(_))
    }

    /// Whether calling again with the same request may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_cancellation()
    }
}

impl From<Error> for synapsed_core::SynapsedError {
    fn from(err: Error) -> Self {
        use synapsed_core::SynapsedError;
        match err {
            Error::Configuration(msg) => SynapsedError::Configuration(msg),
            Error::Setup(e) => SynapsedError::Configuration(e.to_string()),
            Error::Signature(e) => SynapsedError::Cryptographic(e.to_string()),
            Error::SecretHashing(msg) => SynapsedError::Cryptographic(msg),
            Error::Codec(msg) => SynapsedError::Serialization(msg),
            Error::Json(e) => SynapsedError::Serialization(e.to_string()),
            Error::Other(e) => SynapsedError::Internal(e.to_string()),
        }
    }
}

impl From<AuthenticationError> for synapsed_core::SynapsedError {
    fn from(err: AuthenticationError) -> Self {
        use synapsed_core::SynapsedError;
        match err {
            AuthenticationError::NoApplicableStrategy
            | AuthenticationError::AllStrategiesFailed { .. } => SynapsedError::Authentication(err.to_string()),
            AuthenticationError::Cancelled => SynapsedError::Cancelled(err.to_string()),
            AuthenticationError::DeadlineExceeded => SynapsedError::Timeout(err.to_string()),
            AuthenticationError::Setup(e) => SynapsedError::Configuration(e.to_string()),
        }
    }
}
