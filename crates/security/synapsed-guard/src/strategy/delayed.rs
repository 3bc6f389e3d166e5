use std::time::Duration;

use async_trait::async_trait;

use super::{Attempt, Strategy, StrategyId};
use crate::error::StrategyError;
use crate::request::AuthRequest;
use crate::token::Token;

/// Runs the inner strategy after a fixed delay.
///
/// The wait ends early with [`StrategyError::Cancelled`] when the race is
/// cancelled.
pub struct Delayed<S> {
    inner: S,
    delay: Duration,
}

impl<S: Strategy> Delayed<S> {
    /// Delay `inner` by `delay`
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }

    /// Configured delay
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[async_trait]
impl<S: Strategy> Strategy for Delayed<S> {
    fn id(&self) -> &StrategyId {
        self.inner.id()
    }

    fn supports(&self, request: &AuthRequest) -> bool {
        self.inner.supports(request)
    }

    async fn run(&self, attempt: &Attempt) -> Result<Token, StrategyError> {
        tokio::select! {
            _ = attempt.cancellation().cancelled() => Err(StrategyError::Cancelled),
            _ = tokio::time::sleep(self.delay) => self.inner.run(attempt).await,
        }
    }
}
