use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::basic::authorization_param;
use super::Authenticator;
use crate::error::{SignatureError, StrategyError};
use crate::identity::{Identity, IdentityProvider};
use crate::request::AuthRequest;
use crate::role::Role;
use crate::token::HmacSigner;

/// Claims carried by a bearer token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerClaims {
    /// Subject; the identity's credential
    pub sub: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expires at (seconds since epoch)
    pub exp: i64,
    /// Roles granted when the token was minted
    #[serde(default)]
    pub roles: Vec<Role>,
}

/// Mints `<claims>.<mac>` bearer tokens: base64url JSON claims and a
/// base64url HMAC-SHA256 over the encoded claims
#[derive(Debug, Clone)]
pub struct BearerTokenIssuer {
    signer: Arc<HmacSigner>,
    ttl: Duration,
}

impl BearerTokenIssuer {
    /// Create an issuer; tokens live for `ttl`
    pub fn new(signer: Arc<HmacSigner>, ttl: Duration) -> Self {
        Self { signer, ttl }
    }

    /// Mint a token for an identity
    pub fn issue(&self, identity: &Identity) -> Result<String, SignatureError> {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        self.issue_claims(&BearerClaims {
            sub: identity.credential().to_string(),
            iat: now,
            exp: now.saturating_add(ttl),
            roles: identity.roles().iter().cloned().collect(),
        })
    }

    /// Mint a token for explicit claims
    pub fn issue_claims(&self, claims: &BearerClaims) -> Result<String, SignatureError> {
        let json = serde_json::to_vec(claims).map_err(|e| SignatureError::Payload(e.to_string()))?;
        let encoded = URL_SAFE_NO_PAD.encode(json);
        let mac = self.signer.tag(encoded.as_bytes())?;
        Ok(format!("{encoded}.{}", URL_SAFE_NO_PAD.encode(mac)))
    }
}

/// Parsed, not yet verified, bearer token
#[derive(Debug)]
pub struct BearerCredentials {
    claims: BearerClaims,
    signed_part: String,
    mac: Vec<u8>,
}

impl BearerCredentials {
    /// Claims as presented
    #[must_use]
    pub fn claims(&self) -> &BearerClaims {
        &self.claims
    }
}

/// Authenticates `Authorization: Bearer` tokens minted by [`BearerTokenIssuer`].
///
/// The subject is resolved through the identity provider; the MAC and the
/// expiry are checked in the secret verification step.
pub struct BearerTokenAuthenticator {
    signer: Arc<HmacSigner>,
    leeway: Duration,
}

impl BearerTokenAuthenticator {
    /// Strategy name
    pub const NAME: &'static str = "bearer";

    /// Create the authenticator
    pub fn new(signer: Arc<HmacSigner>) -> Self {
        Self { signer, leeway: Duration::ZERO }
    }

    /// Accept tokens up to `leeway` past their expiry
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }
}

#[async_trait]
impl Authenticator for BearerTokenAuthenticator {
    type Credentials = BearerCredentials;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self, request: &AuthRequest) -> bool {
        authorization_param(request, "Bearer").is_some()
    }

    fn extract_credentials(&self, request: &AuthRequest) -> Result<BearerCredentials, StrategyError> {
        let param = authorization_param(request, "Bearer")
            .ok_or_else(|| StrategyError::CredentialExtractionFailed("no bearer authorization header".into()))?;
        let (signed_part, mac) = param
            .split_once('.')
            .ok_or_else(|| StrategyError::CredentialExtractionFailed("malformed bearer token".into()))?;

        let mac = URL_SAFE_NO_PAD
            .decode(mac)
            .map_err(|_| StrategyError::CredentialExtractionFailed("invalid token signature encoding".into()))?;
        let json = URL_SAFE_NO_PAD
            .decode(signed_part)
            .map_err(|_| StrategyError::CredentialExtractionFailed("invalid token claims encoding".into()))?;
        let claims: BearerClaims = serde_json::from_slice(&json)
            .map_err(|e| StrategyError::CredentialExtractionFailed(format!("invalid token claims: {e}")))?;

        Ok(BearerCredentials { claims, signed_part: signed_part.to_string(), mac })
    }

    async fn resolve_identity(
        &self,
        identities: &dyn IdentityProvider,
        credentials: &BearerCredentials,
    ) -> Result<Identity, StrategyError> {
        Ok(identities.provide(&credentials.claims.sub).await?)
    }

    async fn verify(&self, credentials: &BearerCredentials, identity: &Identity) -> Result<(), StrategyError> {
        self.signer
            .check_tag(credentials.signed_part.as_bytes(), &credentials.mac)
            .map_err(|_| StrategyError::SecretMismatch)?;

        if credentials.claims.sub != identity.credential() {
            return Err(StrategyError::SecretMismatch);
        }

        let leeway = i64::try_from(self.leeway.as_secs()).unwrap_or(i64::MAX);
        if Utc::now().timestamp() > credentials.claims.exp.saturating_add(leeway) {
            return Err(StrategyError::CredentialExpired);
        }
        Ok(())
    }
}
