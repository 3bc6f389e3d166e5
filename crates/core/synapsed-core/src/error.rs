//! Workspace-wide error type.
//!
//! Crates keep a detailed error enum of their own and convert into
//! [`SynapsedError`] where they hand errors to code outside the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse error shared across Synapsed crates
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SynapsedError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value failed validation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Credentials were not accepted
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Key, hash or signature handling failed
    #[error("Cryptographic error: {0}")]
    Cryptographic(String),

    /// Encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A deadline elapsed
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The caller gave up before the operation completed
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SynapsedError {
    /// Configuration error
    pub fn config<T: fmt::Display>(msg: T) -> Self {
        Self::Configuration(msg.to_string())
    }

    /// Validation error
    pub fn invalid_input<T: fmt::Display>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Internal error
    pub fn internal<T: fmt::Display>(msg: T) -> Self {
        Self::Internal(msg.to_string())
    }

    /// Whether repeating the operation unchanged may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Cancelled(_))
    }

    /// Whether the caller supplied something unacceptable
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Authentication(_))
    }
}

/// Result alias over [`SynapsedError`]
pub type SynapsedResult<T> = Result<T, SynapsedError>;
