//! # Synapsed Core
//!
//! Foundation shared by the Synapsed guard crates.
//!
//! ## Features
//!
//! - **Error Handling**: Standardized error type and result alias
//! - **Configuration**: Layered file / environment configuration with serde extraction
//! - **Observability**: `tracing-subscriber` bootstrap driven by configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use synapsed_core::config::{ConfigManager, EnvConfigSource, FileConfigSource};
//! use synapsed_core::observability::{init_tracing, LoggingConfig};
//! use synapsed_core::SynapsedResult;
//!
//! fn bootstrap() -> SynapsedResult<()> {
//!     let mut manager = ConfigManager::new()
//!         .add_source(FileConfigSource::auto_detect("guard.toml")?.optional())
//!         .add_source(EnvConfigSource::new("GUARD"));
//!     manager.load()?;
//!
//!     let logging: LoggingConfig = manager.extract_section("logging")?;
//!     init_tracing(&logging)
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod observability;
pub mod traits;

// Re-export commonly used items
pub use error::{SynapsedError, SynapsedResult};
pub use traits::Validatable;

/// Version information for the Synapsed Core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The name of the Synapsed Core library
pub const NAME: &str = env!("CARGO_PKG_NAME");
