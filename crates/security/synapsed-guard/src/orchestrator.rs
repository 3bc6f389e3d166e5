//! Authentication orchestrator
//!
//! Per request: consult the token store, keep only the strategies that
//! support the request, race them on the runtime and adopt the first success.
//!
//! ```text
//! Idle -> Filtering -> Racing -> Decided(Success | Failure)
//! ```
//!
//! Losing units are told to stop through a shared cancellation token and are
//! reaped in the background: they get `cancel_grace` to finish and are aborted
//! afterwards. Dropping the `authenticate` future aborts every unit at once.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::config::OrchestratorConfig;
use crate::context::RequestContext;
use crate::error::{AttemptFailures, AuthenticationError, PolicyPhase, SetupError, StrategyError};
use crate::identity::IdentityProvider;
use crate::policy::{PermitAllPolicy, PolicyChecker};
use crate::strategy::{Attempt, AttemptResult, Authenticator, Pipeline, Strategy, StrategyId};
use crate::token::{Token, TokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RaceState {
    Idle,
    Filtering,
    Racing,
    Decided,
}

impl fmt::Display for RaceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RaceState::Idle => "idle",
            RaceState::Filtering => "filtering",
            RaceState::Racing => "racing",
            RaceState::Decided => "decided",
        };
        f.write_str(name)
    }
}

fn advance(state: &mut RaceState, next: RaceState) {
    trace!(from = %state, to = %next, "race state");
    *state = next;
}

/// Decrements the unit counter when a unit finishes or is aborted
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "strategy panicked".to_string())
}

/// Races authentication strategies for a request
pub struct Orchestrator {
    strategies: Vec<Arc<dyn Strategy>>,
    identities: Arc<dyn IdentityProvider>,
    policy: Arc<dyn PolicyChecker>,
    settings: OrchestratorConfig,
    in_flight: Arc<AtomicUsize>,
}

impl Orchestrator {
    /// Start building an orchestrator
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Configured strategies, in registration order
    pub fn strategy_ids(&self) -> impl Iterator<Item = &StrategyId> {
        self.strategies.iter().map(|s| s.id())
    }

    /// Race settings
    #[must_use]
    pub fn settings(&self) -> &OrchestratorConfig {
        &self.settings
    }

    /// Strategy units spawned by this orchestrator that have not finished yet
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Authenticate with the configured deadline
    pub async fn authenticate(&self, ctx: &RequestContext) -> Result<Token, AuthenticationError> {
        self.authenticate_with(ctx, &CancellationToken::new(), self.settings.deadline())
            .await
    }

    /// Authenticate with an explicit deadline over the whole race
    pub async fn authenticate_with_deadline(
        &self,
        ctx: &RequestContext,
        deadline: Duration,
    ) -> Result<Token, AuthenticationError> {
        self.authenticate_with(ctx, &CancellationToken::new(), Some(deadline))
            .await
    }

    /// Authenticate, stopping early when `cancel` fires or `deadline` elapses.
    ///
    /// A fully authenticated token already in the store is returned without a
    /// race. Otherwise the winning token replaces whatever the store held.
    pub async fn authenticate_with(
        &self,
        ctx: &RequestContext,
        cancel: &CancellationToken,
        deadline: Option<Duration>,
    ) -> Result<Token, AuthenticationError> {
        let store = ctx.token_store()?;
        let span = info_span!(
            "auth.race",
            request_id = %ctx.request_id(),
            strategies = tracing::field::Empty,
        );

        async move {
            if let Some(token) = self.stored_token(store).await {
                return Ok(token);
            }

            let token = self.race(ctx, cancel, deadline).await?;
            store.clear();
            store.write(token.clone());
            Ok(token)
        }
        .instrument(span)
        .await
    }

    async fn stored_token(&self, store: &dyn TokenStore) -> Option<Token> {
        let token = store.read()?;
        if !token.is_fully_authenticated() {
            return None;
        }
        if !self.settings.revalidate_stored_token {
            debug!(state = token.state(), "reusing stored token");
            return Some(token);
        }

        match self.revalidate(&token).await {
            Ok(fresh) => {
                debug!(state = fresh.state(), "stored token revalidated");
                store.write(fresh.clone());
                Some(fresh)
            }
            Err(error) => {
                info!(reason = error.tag(), %error, "stored token no longer valid");
                store.clear();
                None
            }
        }
    }

    async fn revalidate(&self, token: &Token) -> Result<Token, StrategyError> {
        let Some(authenticated) = token.authenticated() else {
            return Err(StrategyError::NotApplicable);
        };

        let identity = self.identities.refresh(authenticated.identity()).await?;
        self.policy
            .check_pre_auth(&identity)
            .await
            .map_err(|violation| StrategyError::PolicyRejected {
                phase: PolicyPhase::Pre,
                reason: violation.to_string(),
            })?;
        self.policy
            .check_post_auth(&identity)
            .await
            .map_err(|violation| StrategyError::PolicyRejected {
                phase: PolicyPhase::Post,
                reason: violation.to_string(),
            })?;

        Ok(match token {
            Token::Authenticated(current) => Token::Authenticated(current.refreshed(identity)),
            // the signature covers the roles granted at signing time
            other => other.clone(),
        })
    }

    async fn race(
        &self,
        ctx: &RequestContext,
        cancel: &CancellationToken,
        deadline: Option<Duration>,
    ) -> Result<Token, AuthenticationError> {
        let mut state = RaceState::Idle;
        advance(&mut state, RaceState::Filtering);

        let applicable: Vec<Arc<dyn Strategy>> = self
            .strategies
            .iter()
            .filter(|strategy| strategy.supports(ctx.request()))
            .cloned()
            .collect();

        if applicable.is_empty() {
            advance(&mut state, RaceState::Decided);
            info!(outcome = "no_applicable_strategy", "authentication failed");
            return Err(AuthenticationError::NoApplicableStrategy);
        }
        tracing::Span::current().record("strategies", applicable.len());

        advance(&mut state, RaceState::Racing);
        let started = Instant::now();
        let race_cancel = cancel.child_token();
        let _abandon = race_cancel.clone().drop_guard();

        let mut units = JoinSet::new();
        for strategy in applicable {
            let attempt = Attempt::new(
                ctx.shared_request(),
                Arc::clone(&self.identities),
                Arc::clone(&self.policy),
                race_cancel.clone(),
            );
            let id = strategy.id().clone();
            let span = info_span!("auth.attempt", strategy = %id);
            let in_flight = InFlight::enter(&self.in_flight);

            units.spawn(
                async move {
                    let _in_flight = in_flight;
                    let outcome = AssertUnwindSafe(strategy.run(&attempt))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|panic| Err(StrategyError::Internal(panic_message(&*panic))));
                    AttemptResult { strategy: id, outcome }
                }
                .instrument(span),
            );
        }

        let expiry = async {
            match deadline {
                Some(deadline) => tokio::time::sleep(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expiry);

        let mut failures = AttemptFailures::default();
        let decision = loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => break Err(AuthenticationError::Cancelled),
                () = &mut expiry => break Err(AuthenticationError::DeadlineExceeded),
                joined = units.join_next() => match joined {
                    None => break Err(AuthenticationError::AllStrategiesFailed {
                        failures: std::mem::take(&mut failures),
                    }),
                    Some(Ok(AttemptResult { strategy, outcome: Ok(token) })) if !token.is_fully_authenticated() => {
                        warn!(%strategy, state = token.state(), "strategy returned an unauthenticated token");
                        failures.record(
                            strategy,
                            StrategyError::Internal(format!("strategy returned a {} token", token.state())),
                        );
                    }
                    Some(Ok(AttemptResult { strategy, outcome: Ok(token) })) => {
                        info!(
                            outcome = "success",
                            %strategy,
                            identity = token.identity().map(|identity| identity.id()),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "authenticated"
                        );
                        break Ok(token);
                    }
                    Some(Ok(AttemptResult { strategy, outcome: Err(error) })) => {
                        debug!(%strategy, reason = error.tag(), %error, "strategy failed");
                        failures.record(strategy, error);
                    }
                    Some(Err(join_error)) => {
                        warn!(error = %join_error, "strategy unit ended abnormally");
                    }
                },
            }
        };
        advance(&mut state, RaceState::Decided);

        if let Err(error) = &decision {
            info!(
                outcome = ?error,
                failed = error.failures().map_or(0, AttemptFailures::len),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "authentication failed"
            );
        }

        race_cancel.cancel();
        self.release(units);
        decision
    }

    /// Give losing units `cancel_grace` to wind down, then abort them
    fn release(&self, mut units: JoinSet<AttemptResult>) {
        if units.is_empty() {
            return;
        }

        let grace = self.settings.cancel_grace();
        tokio::spawn(
            async move {
                let drained = tokio::time::timeout(grace, async {
                    while units.join_next().await.is_some() {}
                })
                .await;

                if drained.is_err() {
                    warn!(
                        remaining = units.len(),
                        grace_ms = grace.as_millis() as u64,
                        "strategies overran the cancel grace period; aborting"
                    );
                    units.shutdown().await;
                }
            }
            .in_current_span(),
        );
    }
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("strategies", &self.strategy_ids().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Builder for [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    strategies: Vec<Arc<dyn Strategy>>,
    identities: Option<Arc<dyn IdentityProvider>>,
    policy: Option<Arc<dyn PolicyChecker>>,
    settings: OrchestratorConfig,
}

impl OrchestratorBuilder {
    /// Add a strategy
    #[must_use]
    pub fn strategy(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategies.push(Arc::new(strategy));
        self
    }

    /// Add an authenticator, wrapped in a [`Pipeline`]
    #[must_use]
    pub fn authenticator<A: Authenticator>(self, authenticator: A) -> Self {
        self.strategy(Pipeline::new(authenticator))
    }

    /// Identity provider shared by all strategies
    #[must_use]
    pub fn identity_provider(mut self, identities: Arc<dyn IdentityProvider>) -> Self {
        self.identities = Some(identities);
        self
    }

    /// Policy gate; [`PermitAllPolicy`] when unset
    #[must_use]
    pub fn policy(mut self, policy: Arc<dyn PolicyChecker>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Race settings
    #[must_use]
    pub fn config(mut self, settings: OrchestratorConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Default deadline over each race
    #[must_use]
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.settings.deadline_ms = Some(u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Straggler grace period
    #[must_use]
    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.settings.cancel_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Revalidate stored tokens before trusting them
    #[must_use]
    pub fn revalidate_stored_token(mut self, enabled: bool) -> Self {
        self.settings.revalidate_stored_token = enabled;
        self
    }

    /// Finish building
    pub fn build(self) -> Result<Orchestrator, SetupError> {
        let identities = self.identities.ok_or(SetupError::IdentityProviderMissing)?;
        Ok(Orchestrator {
            strategies: self.strategies,
            identities,
            policy: self.policy.unwrap_or_else(|| Arc::new(PermitAllPolicy)),
            settings: self.settings,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::InMemoryIdentityProvider;

    #[test]
    fn test_build_requires_identity_provider() {
        let result = Orchestrator::builder().build();
        assert!(matches!(result, Err(SetupError::IdentityProviderMissing)));
    }

    #[test]
    fn test_builder_settings() {
        let orchestrator = Orchestrator::builder()
            .identity_provider(Arc::new(InMemoryIdentityProvider::new()))
            .deadline(Duration::from_millis(250))
            .cancel_grace(Duration::from_millis(50))
            .revalidate_stored_token(true)
            .build()
            .unwrap();

        assert_eq!(orchestrator.settings().deadline(), Some(Duration::from_millis(250)));
        assert_eq!(orchestrator.settings().cancel_grace(), Duration::from_millis(50));
        assert!(orchestrator.settings().revalidate_stored_token);
        assert_eq!(orchestrator.in_flight(), 0);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("kaboom"));
        assert_eq!(panic_message(&*boxed), "kaboom");

        let boxed: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*boxed), "strategy panicked");
    }

    #[test]
    fn test_in_flight_guard() {
        let counter = Arc::new(AtomicUsize::new(0));
        let guard = InFlight::enter(&counter);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        drop(guard);
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
