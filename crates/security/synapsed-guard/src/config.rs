//! Guard configuration
//!
//! Loaded through [`synapsed_core::config::ConfigManager`]:
//!
//! ```toml
//! [orchestrator]
//! deadline_ms = 2500
//! cancel_grace_ms = 500
//! revalidate_stored_token = false
//!
//! [form_login]
//! credential_field = "username"
//! password_field = "password"
//!
//! [password]
//! memory_cost = 65536
//! time_cost = 3
//! parallelism = 4
//! output_length = 32
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use synapsed_core::config::ConfigManager;
use synapsed_core::observability::LoggingConfig;
use synapsed_core::{SynapsedError, SynapsedResult, Validatable};

use crate::secret::PasswordConfig;

/// Race settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Deadline over the whole race; none when unset
    pub deadline_ms: Option<u64>,
    /// How long losing units may keep running after the decision before being aborted
    pub cancel_grace_ms: u64,
    /// Refresh a stored token's identity and rerun both policy gates before trusting it
    pub revalidate_stored_token: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            deadline_ms: None,
            cancel_grace_ms: 500,
            revalidate_stored_token: false,
        }
    }
}

impl OrchestratorConfig {
    /// Race deadline
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Straggler grace period
    #[must_use]
    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }
}

/// Form login field names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormLoginConfig {
    /// Field holding the credential
    pub credential_field: String,
    /// Field holding the password
    pub password_field: String,
}

impl Default for FormLoginConfig {
    fn default() -> Self {
        Self {
            credential_field: "username".to_string(),
            password_field: "password".to_string(),
        }
    }
}

/// Complete guard configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Race settings
    pub orchestrator: OrchestratorConfig,
    /// Form login settings
    pub form_login: FormLoginConfig,
    /// Argon2 parameters for stored secrets
    pub password: PasswordConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl GuardConfig {
    /// Extract and validate from a loaded configuration manager
    pub fn load(manager: &ConfigManager) -> SynapsedResult<Self> {
        let config: GuardConfig = manager.extract()?;
        config.validate()?;
        Ok(config)
    }
}

impl Validatable for GuardConfig {
    fn validate(&self) -> SynapsedResult<()> {
        if self.orchestrator.cancel_grace_ms == 0 {
            return Err(SynapsedError::config("orchestrator.cancel_grace_ms must be greater than zero"));
        }
        if self.orchestrator.deadline_ms == Some(0) {
            return Err(SynapsedError::config("orchestrator.deadline_ms must be greater than zero when set"));
        }

        let form = &self.form_login;
        if form.credential_field.is_empty() || form.password_field.is_empty() {
            return Err(SynapsedError::config("form_login field names must not be empty"));
        }
        if form.credential_field == form.password_field {
            return Err(SynapsedError::config("form_login credential and password fields must differ"));
        }

        self.password.params().map_err(SynapsedError::from)?;
        Ok(())
    }
}
