//! Granted roles

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role granted to an identity or carried by a token
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

/// Role carried by anonymous and pre-auth tokens
pub const ROLE_ANON: Role = Role(Cow::Borrowed("ROLE_ANON"));

/// Default role of a regular account
pub const ROLE_USER: Role = Role(Cow::Borrowed("ROLE_USER"));

/// Administrative role
pub const ROLE_ADMIN: Role = Role(Cow::Borrowed("ROLE_ADMIN"));

impl Role {
    /// Create a role from any name
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Role name
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(name: &str) -> Self {
        match name {
            "ROLE_ANON" => ROLE_ANON,
            "ROLE_USER" => ROLE_USER,
            "ROLE_ADMIN" => ROLE_ADMIN,
            other => Role::new(other),
        }
    }
}

impl From<String> for Role {
    fn from(name: String) -> Self {
        Role::from(name.as_str())
    }
}
