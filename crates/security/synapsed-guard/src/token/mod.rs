//! Token state model
//!
//! A [`Token`] carries the authentication state of a request:
//!
//! - `Anonymous`: nothing established yet
//! - `PreAuth`: a credential was presented but not verified
//! - `Authenticated`: identity resolved, both policy gates passed, secret verified
//! - `Signed`: an `Authenticated` token plus a detached signature
//!
//! Only the last two are fully authenticated. A fresh one is built from a
//! [`VerifiedIdentity`], which the verification pipeline creates after its last
//! gate has passed. The other entry point is deserialization: tokens restored
//! through [`codec::TokenCodec`] or plain serde are trusted as stored, so the
//! encoded form must come from a store the caller controls. The orchestrator
//! never adopts a strategy result that is not fully authenticated.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SignatureError, StrategyError};
use crate::identity::Identity;
use crate::role::{Role, ROLE_ANON};
use crate::strategy::StrategyId;

/// Signing primitives
pub mod signer;

/// Request-scoped token storage
pub mod store;

/// Token serialization for session layers
pub mod codec;

pub use codec::TokenCodec;
pub use signer::{HmacSigner, SignatureVerifier, Signer};
pub use store::{MemoryTokenStore, TokenStore};

/// Authentication state of a request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Token {
    /// No authentication established
    #[default]
    Anonymous,
    /// Credential presented, not yet verified
    PreAuth(PreAuthToken),
    /// Fully authenticated
    Authenticated(AuthenticatedToken),
    /// Fully authenticated and signed
    Signed(SignedToken),
}

impl Token {
    /// True iff identity resolution, both policy gates and secret verification
    /// all succeeded for the attempt that produced this token
    #[must_use]
    pub fn is_fully_authenticated(&self) -> bool {
        matches!(self, Token::Authenticated(_) | Token::Signed(_))
    }

    /// Granted roles; anonymous and pre-auth tokens carry only [`ROLE_ANON`]
    #[must_use]
    pub fn roles(&self) -> BTreeSet<Role> {
        match self.authenticated() {
            Some(token) => token.roles.clone(),
            None => BTreeSet::from([ROLE_ANON]),
        }
    }

    /// Whether the token grants a role
    #[must_use]
    pub fn has_role(&self, role: &Role) -> bool {
        match self.authenticated() {
            Some(token) => token.roles.contains(role),
            None => *role == ROLE_ANON,
        }
    }

    /// Authenticated identity
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        self.authenticated().map(|token| &token.identity)
    }

    /// The authenticated payload of `Authenticated` and `Signed` tokens
    #[must_use]
    pub fn authenticated(&self) -> Option<&AuthenticatedToken> {
        match self {
            Token::Authenticated(token) => Some(token),
            Token::Signed(signed) => Some(&signed.token),
            Token::Anonymous | Token::PreAuth(_) => None,
        }
    }

    /// Short state name for logs
    #[must_use]
    pub fn state(&self) -> &'static str {
        match self {
            Token::Anonymous => "anonymous",
            Token::PreAuth(_) => "pre_auth",
            Token::Authenticated(_) => "authenticated",
            Token::Signed(_) => "signed",
        }
    }
}

/// Credential presented to a strategy, pending verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreAuthToken {
    strategy: String,
    credential: String,
}

impl PreAuthToken {
    /// Record a credential presented to a strategy
    pub fn new(strategy: impl Into<String>, credential: impl Into<String>) -> Self {
        Self { strategy: strategy.into(), credential: credential.into() }
    }

    /// Strategy that extracted the credential
    #[must_use]
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    /// Raw credential (lookup key)
    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

/// Identity that passed the full verification pipeline.
///
/// Only the crate's pipeline can construct one.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    identity: Identity,
    strategy: StrategyId,
}

impl VerifiedIdentity {
    pub(crate) fn new(identity: Identity, strategy: StrategyId) -> Self {
        Self { identity, strategy }
    }

    /// The verified identity
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Strategy that verified it
    #[must_use]
    pub fn strategy(&self) -> &StrategyId {
        &self.strategy
    }
}

/// Identity and roles of a fully authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedToken {
    identity: Identity,
    roles: BTreeSet<Role>,
    authenticated_at: DateTime<Utc>,
    strategy: String,
}

impl AuthenticatedToken {
    /// Build from a verified identity; the secret is erased
    #[must_use]
    pub fn new(verified: VerifiedIdentity) -> Self {
        let VerifiedIdentity { identity, strategy } = verified;
        let identity = identity.without_secret();
        Self {
            roles: identity.roles().clone(),
            identity,
            authenticated_at: Utc::now(),
            strategy: strategy.to_string(),
        }
    }

    /// Same authentication with a freshly loaded identity
    #[must_use]
    pub fn refreshed(&self, identity: Identity) -> Self {
        let identity = identity.without_secret();
        Self {
            roles: identity.roles().clone(),
            identity,
            authenticated_at: self.authenticated_at,
            strategy: self.strategy.clone(),
        }
    }

    /// Authenticated identity (secret erased)
    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Granted roles
    #[must_use]
    pub fn roles(&self) -> &BTreeSet<Role> {
        &self.roles
    }

    /// When verification completed
    #[must_use]
    pub fn authenticated_at(&self) -> DateTime<Utc> {
        self.authenticated_at
    }

    /// Strategy that authenticated the request
    #[must_use]
    pub fn strategy(&self) -> &str {
        &self.strategy
    }

    fn signing_payload(&self) -> Result<Vec<u8>, SignatureError> {
        serde_json::to_vec(self).map_err(|e| SignatureError::Payload(e.to_string()))
    }
}

/// Authenticated token with a detached signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedToken {
    token: AuthenticatedToken,
    key_id: String,
    signature: String,
}

impl SignedToken {
    /// Sign an authenticated token
    pub fn sign(token: AuthenticatedToken, signer: &dyn Signer) -> Result<Self, SignatureError> {
        let signature = signer.sign(&token.signing_payload()?)?;
        Ok(Self {
            token,
            key_id: signer.key_id().to_string(),
            signature: URL_SAFE_NO_PAD.encode(signature),
        })
    }

    /// Check the signature against the token contents
    pub fn verify(&self, verifier: &dyn SignatureVerifier) -> Result<(), SignatureError> {
        let signature = URL_SAFE_NO_PAD
            .decode(&self.signature)
            .map_err(|_| SignatureError::Mismatch)?;
        verifier.verify(&self.key_id, &self.token.signing_payload()?, &signature)
    }

    /// The signed payload
    #[must_use]
    pub fn token(&self) -> &AuthenticatedToken {
        &self.token
    }

    /// Id of the signing key
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Base64url signature
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }
}

/// Builds a token from a verified identity
pub trait TokenFactory: Send + Sync {
    /// Issue a fully authenticated token
    fn issue(&self, verified: VerifiedIdentity) -> Result<Token, StrategyError>;
}

/// Issues `Authenticated` tokens
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthenticatedTokenFactory;

impl TokenFactory for AuthenticatedTokenFactory {
    fn issue(&self, verified: VerifiedIdentity) -> Result<Token, StrategyError> {
        Ok(Token::Authenticated(AuthenticatedToken::new(verified)))
    }
}

/// Issues `Signed` tokens
#[derive(Clone)]
pub struct SigningTokenFactory {
    signer: Arc<dyn Signer>,
}

impl SigningTokenFactory {
    /// Create a factory signing with `signer`
    pub fn new(signer: Arc<dyn Signer>) -> Self {
        Self { signer }
    }
}

impl TokenFactory for SigningTokenFactory {
    fn issue(&self, verified: VerifiedIdentity) -> Result<Token, StrategyError> {
        SignedToken::sign(AuthenticatedToken::new(verified), self.signer.as_ref())
            .map(Token::Signed)
            .map_err(|e| StrategyError::TokenIssueFailed(e.to_string()))
    }
}
