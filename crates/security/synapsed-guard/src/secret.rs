//! Secret hashing and verification
//!
//! Uses Argon2id for stored secrets. Verification runs on the blocking pool so
//! that racing strategies do not stall the async workers.

use argon2::password_hash::{self, rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Secret comparison failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SecretError {
    /// Supplied secret does not match
    #[error("secret mismatch")]
    Mismatch,

    /// Stored secret could not be parsed
    #[error("malformed stored secret: {0}")]
    MalformedHash(String),

    /// The checker could not run
    #[error("secret checker unavailable: {0}")]
    Unavailable(String),
}

/// Compares a supplied secret against stored material
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SecretChecker: Send + Sync {
    /// `Ok(())` iff `plain` matches `stored`
    async fn check_secret(&self, plain: &[u8], stored: &str) -> std::result::Result<(), SecretError>;
}

/// Argon2 hashing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Number of iterations
    pub time_cost: u32,
    /// Degree of parallelism
    pub parallelism: u32,
    /// Output hash length in bytes
    pub output_length: usize,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: 64 * 1024, // 64 MiB
            time_cost: 3,
            parallelism: 4,
            output_length: 32,
        }
    }
}

impl PasswordConfig {
    /// Argon2 parameters, rejecting values outside the algorithm's limits
    pub fn params(&self) -> Result<Params> {
        Params::new(self.memory_cost, self.time_cost, self.parallelism, Some(self.output_length))
            .map_err(|e| Error::Configuration(format!("invalid Argon2 parameters: {e}")))
    }
}

/// Produces PHC-formatted Argon2id hashes for storage
#[derive(Clone)]
pub struct Argon2SecretEncoder {
    argon2: Argon2<'static>,
}

impl Argon2SecretEncoder {
    /// Create an encoder with the given parameters
    pub fn new(config: &PasswordConfig) -> Result<Self> {
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, config.params()?),
        })
    }

    /// Hash a secret with a fresh random salt
    pub fn encode(&self, plain: &[u8]) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plain, &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| Error::SecretHashing(e.to_string()))
    }
}

/// Verifies secrets against PHC-formatted Argon2 hashes.
///
/// Parameters are read from the stored hash, so hashes produced with different
/// settings keep verifying.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2SecretChecker;

impl Argon2SecretChecker {
    /// Create a checker
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretChecker for Argon2SecretChecker {
    async fn check_secret(&self, plain: &[u8], stored: &str) -> std::result::Result<(), SecretError> {
        let plain = Zeroizing::new(plain.to_vec());
        let stored = stored.to_owned();

        tokio::task::spawn_blocking(move || {
            let hash = PasswordHash::new(&stored).map_err(|e| SecretError::MalformedHash(e.to_string()))?;
            Argon2::default()
                .verify_password(&plain, &hash)
                .map_err(|e| match e {
                    password_hash::Error::Password => SecretError::Mismatch,
                    other => SecretError::MalformedHash(other.to_string()),
                })
        })
        .await
        .map_err(|e| SecretError::Unavailable(e.to_string()))?
    }
}

/// Byte-for-byte comparison in constant time, for secrets stored in plain form
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstantTimeSecretChecker;

#[async_trait]
impl SecretChecker for ConstantTimeSecretChecker {
    async fn check_secret(&self, plain: &[u8], stored: &str) -> std::result::Result<(), SecretError> {
        if bool::from(plain.ct_eq(stored.as_bytes())) {
            Ok(())
        } else {
            Err(SecretError::Mismatch)
        }
    }
}
