use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{Attempt, Authenticator, Strategy, StrategyId};
use crate::error::{PolicyPhase, StrategyError};
use crate::request::AuthRequest;
use crate::token::{AuthenticatedTokenFactory, Token, TokenFactory, VerifiedIdentity};

/// Runs an [`Authenticator`] through the verification order
/// extract → resolve identity → pre-auth policy → verify secret → post-auth
/// policy → issue token, stopping at the first failing step.
pub struct Pipeline<A: Authenticator> {
    id: StrategyId,
    authenticator: A,
    factory: Arc<dyn TokenFactory>,
}

impl<A: Authenticator> Pipeline<A> {
    /// Wrap an authenticator; tokens are issued as `Authenticated`
    pub fn new(authenticator: A) -> Self {
        Self {
            id: StrategyId::from(authenticator.name()),
            authenticator,
            factory: Arc::new(AuthenticatedTokenFactory),
        }
    }

    /// Use a different token factory
    #[must_use]
    pub fn with_token_factory(mut self, factory: Arc<dyn TokenFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// The wrapped authenticator
    pub fn authenticator(&self) -> &A {
        &self.authenticator
    }

    fn stage_failed(&self, stage: &'static str) -> impl Fn(&StrategyError) + '_ {
        move |error| {
            debug!(strategy = %self.id, stage, reason = error.tag(), %error, "verification step failed");
        }
    }
}

#[async_trait]
impl<A: Authenticator> Strategy for Pipeline<A> {
    fn id(&self) -> &StrategyId {
        &self.id
    }

    fn supports(&self, request: &AuthRequest) -> bool {
        self.authenticator.supports(request)
    }

    async fn run(&self, attempt: &Attempt) -> Result<Token, StrategyError> {
        attempt.checkpoint()?;
        let credentials = self
            .authenticator
            .extract_credentials(attempt.request())
            .inspect_err(self.stage_failed("extract"))?;

        attempt.checkpoint()?;
        let identity = self
            .authenticator
            .resolve_identity(attempt.identities(), &credentials)
            .await
            .inspect_err(self.stage_failed("resolve_identity"))?;

        attempt.checkpoint()?;
        attempt
            .policy()
            .check_pre_auth(&identity)
            .await
            .map_err(|violation| StrategyError::PolicyRejected {
                phase: PolicyPhase::Pre,
                reason: violation.to_string(),
            })
            .inspect_err(self.stage_failed("pre_auth"))?;

        attempt.checkpoint()?;
        self.authenticator
            .verify(&credentials, &identity)
            .await
            .inspect_err(self.stage_failed("verify"))?;
        drop(credentials);

        attempt.checkpoint()?;
        attempt
            .policy()
            .check_post_auth(&identity)
            .await
            .map_err(|violation| StrategyError::PolicyRejected {
                phase: PolicyPhase::Post,
                reason: violation.to_string(),
            })
            .inspect_err(self.stage_failed("post_auth"))?;

        attempt.checkpoint()?;
        let verified = VerifiedIdentity::new(identity, self.id.clone());
        self.authenticator
            .issue_token(self.factory.as_ref(), verified)
            .inspect_err(self.stage_failed("issue_token"))
    }
}
