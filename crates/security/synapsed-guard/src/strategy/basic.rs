use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use http::header::AUTHORIZATION;
use zeroize::Zeroizing;

use super::{check_stored_secret, Authenticator};
use crate::error::StrategyError;
use crate::identity::{Identity, IdentityProvider};
use crate::request::AuthRequest;
use crate::secret::SecretChecker;

/// User id and password from an `Authorization: Basic` header
pub struct BasicCredentials {
    user: String,
    password: Zeroizing<String>,
}

impl BasicCredentials {
    /// User id
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// HTTP basic authentication (RFC 7617)
pub struct HttpBasicAuthenticator {
    secrets: Arc<dyn SecretChecker>,
}

impl HttpBasicAuthenticator {
    /// Strategy name
    pub const NAME: &'static str = "http_basic";

    /// Create the authenticator
    pub fn new(secrets: Arc<dyn SecretChecker>) -> Self {
        Self { secrets }
    }
}

/// Value after a case-insensitive `scheme` prefix in the Authorization header
pub(crate) fn authorization_param<'r>(request: &'r AuthRequest, scheme: &str) -> Option<&'r str> {
    let value = request.header_str(AUTHORIZATION)?;
    let (found, param) = value.split_once(' ')?;
    found.eq_ignore_ascii_case(scheme).then(|| param.trim())
}

#[async_trait]
impl Authenticator for HttpBasicAuthenticator {
    type Credentials = BasicCredentials;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self, request: &AuthRequest) -> bool {
        authorization_param(request, "Basic").is_some()
    }

    fn extract_credentials(&self, request: &AuthRequest) -> Result<BasicCredentials, StrategyError> {
        let param = authorization_param(request, "Basic")
            .ok_or_else(|| StrategyError::CredentialExtractionFailed("no basic authorization header".into()))?;

        let decoded = Zeroizing::new(
            STANDARD
                .decode(param)
                .map_err(|_| StrategyError::CredentialExtractionFailed("invalid base64".into()))?,
        );
        let decoded = std::str::from_utf8(&decoded)
            .map_err(|_| StrategyError::CredentialExtractionFailed("credentials are not UTF-8".into()))?;
        let (user, password) = decoded
            .split_once(':')
            .ok_or_else(|| StrategyError::CredentialExtractionFailed("missing ':' separator".into()))?;
        if user.is_empty() {
            return Err(StrategyError::CredentialExtractionFailed("empty user id".into()));
        }

        Ok(BasicCredentials {
            user: user.to_string(),
            password: Zeroizing::new(password.to_string()),
        })
    }

    async fn resolve_identity(
        &self,
        identities: &dyn IdentityProvider,
        credentials: &BasicCredentials,
    ) -> Result<Identity, StrategyError> {
        Ok(identities.provide(&credentials.user).await?)
    }

    async fn verify(&self, credentials: &BasicCredentials, identity: &Identity) -> Result<(), StrategyError> {
        check_stored_secret(self.secrets.as_ref(), credentials.password.as_bytes(), identity).await
    }
}
