//! # Synapsed Guard
//!
//! Establishes a trusted identity for an incoming request by racing every
//! applicable authentication strategy and adopting the first success.
//!
//! ## Features
//!
//! - **Orchestrator**: concurrent fan-out over applicable strategies with a
//!   shared cancellation signal, optional deadline and bounded straggler cleanup
//! - **Pipeline**: extract → resolve identity → pre-auth policy → verify secret →
//!   post-auth policy → issue token, per strategy, with typed credentials
//! - **Strategies**: form login, HTTP basic, HMAC-signed bearer tokens, and a
//!   delaying decorator
//! - **Tokens**: `Anonymous`, `PreAuth`, `Authenticated` and `Signed` states,
//!   request-scoped storage and a codec for session layers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use synapsed_guard::{
//!     identity::{Identity, InMemoryIdentityProvider},
//!     policy::AccountStatusPolicy,
//!     secret::{Argon2SecretChecker, Argon2SecretEncoder, PasswordConfig},
//!     strategy::{FormLoginAuthenticator, HttpBasicAuthenticator},
//!     token::MemoryTokenStore,
//!     AuthRequest, Orchestrator, RequestContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let encoder = Argon2SecretEncoder::new(&PasswordConfig::default())?;
//!     let identities = Arc::new(InMemoryIdentityProvider::new().with_identity(
//!         Identity::new("u-1", "alice@example.org").with_secret(encoder.encode(b"s3cret")?),
//!     ));
//!
//!     let secrets = Arc::new(Argon2SecretChecker::new());
//!     let orchestrator = Orchestrator::builder()
//!         .identity_provider(identities)
//!         .policy(Arc::new(AccountStatusPolicy::new()))
//!         .authenticator(FormLoginAuthenticator::new(secrets.clone()))
//!         .authenticator(HttpBasicAuthenticator::new(secrets))
//!         .build()?;
//!
//!     let request = AuthRequest::post("/login")
//!         .with_form_field("username", "alice@example.org")
//!         .with_form_field("password", "s3cret");
//!     let ctx = RequestContext::with_store(request, Arc::new(MemoryTokenStore::new()));
//!
//!     let token = orchestrator.authenticate(&ctx).await?;
//!     assert!(token.is_fully_authenticated());
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

/// Guard configuration
pub mod config;

/// Request-scoped security context
pub mod context;

/// Error types for the library
pub mod error;

/// Identities and identity providers
pub mod identity;

/// Authentication orchestrator
pub mod orchestrator;

/// Pre/post authentication policy gates
pub mod policy;

/// Request view
pub mod request;

/// Roles
pub mod role;

/// Secret hashing and comparison
pub mod secret;

/// Authentication strategies
pub mod strategy;

/// Token state model
pub mod token;

// Re-export commonly used types
pub use config::GuardConfig;
pub use context::RequestContext;
pub use error::{AuthenticationError, Error, Result, SetupError, StrategyError};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use request::AuthRequest;
pub use token::Token;

// Re-export core types for convenience
pub use synapsed_core::{SynapsedError, SynapsedResult};
pub use tokio_util::sync::CancellationToken;
