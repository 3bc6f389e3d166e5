use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::Method;
use zeroize::Zeroizing;

use super::{check_stored_secret, Authenticator};
use crate::config::FormLoginConfig;
use crate::error::StrategyError;
use crate::identity::{Identity, IdentityProvider};
use crate::request::AuthRequest;
use crate::secret::SecretChecker;

/// Credential and password posted in a login form
pub struct FormCredentials {
    credential: String,
    password: Zeroizing<String>,
}

impl FormCredentials {
    /// Lookup key
    #[must_use]
    pub fn credential(&self) -> &str {
        &self.credential
    }
}

impl fmt::Debug for FormCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormCredentials")
            .field("credential", &self.credential)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Login with a credential and password posted as form fields
pub struct FormLoginAuthenticator {
    secrets: Arc<dyn SecretChecker>,
    credential_field: String,
    password_field: String,
}

impl FormLoginAuthenticator {
    /// Strategy name
    pub const NAME: &'static str = "form_login";

    /// Read `username` and `password` fields
    pub fn new(secrets: Arc<dyn SecretChecker>) -> Self {
        Self::from_config(&FormLoginConfig::default(), secrets)
    }

    /// Use the field names from configuration
    pub fn from_config(config: &FormLoginConfig, secrets: Arc<dyn SecretChecker>) -> Self {
        Self {
            secrets,
            credential_field: config.credential_field.clone(),
            password_field: config.password_field.clone(),
        }
    }

    fn fields<'r>(&self, request: &'r AuthRequest) -> Option<(&'r str, &'r str)> {
        if *request.method() != Method::POST {
            return None;
        }
        let credential = request.form_value(&self.credential_field).filter(|v| !v.is_empty())?;
        let password = request.form_value(&self.password_field).filter(|v| !v.is_empty())?;
        Some((credential, password))
    }
}

#[async_trait]
impl Authenticator for FormLoginAuthenticator {
    type Credentials = FormCredentials;

    fn name(&self) -> &str {
        Self::NAME
    }

    fn supports(&self, request: &AuthRequest) -> bool {
        self.fields(request).is_some()
    }

    fn extract_credentials(&self, request: &AuthRequest) -> Result<FormCredentials, StrategyError> {
        let (credential, password) = self.fields(request).ok_or_else(|| {
            StrategyError::CredentialExtractionFailed("login form fields missing".into())
        })?;
        Ok(FormCredentials {
            credential: credential.to_string(),
            password: Zeroizing::new(password.to_string()),
        })
    }

    async fn resolve_identity(
        &self,
        identities: &dyn IdentityProvider,
        credentials: &FormCredentials,
    ) -> Result<Identity, StrategyError> {
        Ok(identities.provide(&credentials.credential).await?)
    }

    async fn verify(&self, credentials: &FormCredentials, identity: &Identity) -> Result<(), StrategyError> {
        check_stored_secret(self.secrets.as_ref(), credentials.password.as_bytes(), identity).await
    }
}
