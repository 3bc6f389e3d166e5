//! Core traits shared across Synapsed guard crates.

use crate::SynapsedResult;

/// Trait for validatable objects
pub trait Validatable {
    /// Validate this object
    fn validate(&self) -> SynapsedResult<()>;

    /// Check if this object is valid
    fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
