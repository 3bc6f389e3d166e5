//! Race semantics of the orchestrator: filtering, first success wins,
//! aggregate failure, deadlines, cancellation and straggler cleanup.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use synapsed_guard::error::PolicyPhase;
use synapsed_guard::policy::AccountStatusPolicy;
use synapsed_guard::role::ROLE_ADMIN;
use synapsed_guard::secret::Argon2SecretChecker;
use synapsed_guard::strategy::{Attempt, Delayed, FormLoginAuthenticator, Pipeline, Strategy, StrategyId};
use synapsed_guard::token::{MemoryTokenStore, PreAuthToken, TokenStore};
use synapsed_guard::{
    AuthRequest, AuthenticationError, CancellationToken, Orchestrator, RequestContext, SetupError,
    StrategyError, Token,
};
use test_case::test_case;
use tokio::time::Instant;

fn form_login() -> FormLoginAuthenticator {
    FormLoginAuthenticator::new(Arc::new(Argon2SecretChecker::new()))
}

/// Hand-written strategy that reports success with a token that is not
/// fully authenticated
struct Hollow {
    id: StrategyId,
    token: Token,
}

impl Hollow {
    fn new(name: &str, token: Token) -> Self {
        Self { id: StrategyId::from(name), token }
    }
}

#[async_trait]
impl Strategy for Hollow {
    fn id(&self) -> &StrategyId {
        &self.id
    }

    fn supports(&self, _request: &AuthRequest) -> bool {
        true
    }

    async fn run(&self, _attempt: &Attempt) -> Result<Token, StrategyError> {
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod filtering_tests {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;
    #[allow(unused_imports)]
    use test_case::test_case;

    /// A race with nothing to run fails without spawning anything
    #[tokio::test]
    async fn test_no_strategies_configured() {
        init_test_logging();
        let orchestrator = Orchestrator::builder().identity_provider(directory()).build().unwrap();
        let (ctx, store) = context(login_request(ALICE, ALICE_PASSWORD));

        let error = orchestrator.authenticate(&ctx).await.unwrap_err();

        assert_eq!(error, AuthenticationError::NoApplicableStrategy);
        assert_eq!(error.to_string(), "authentication failed");
        assert_eq!(orchestrator.in_flight(), 0);
        assert_eq!(store.read(), None);
    }

    #[tokio::test]
    async fn test_no_applicable_strategy_spawns_nothing() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::inapplicable("first", &counters))
            .authenticator(Scripted::inapplicable("second", &counters))
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let error = orchestrator.authenticate(&ctx).await.unwrap_err();

        assert_eq!(error, AuthenticationError::NoApplicableStrategy);
        assert_eq!(counters.started(), 0);
        assert_eq!(orchestrator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_only_applicable_strategies_run() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::inapplicable("skipped", &counters))
            .authenticator(Scripted::rejecting("failing", StrategyError::SecretMismatch, &counters))
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let error = orchestrator.authenticate(&ctx).await.unwrap_err();
        let failures = error.failures().unwrap();

        assert_eq!(counters.started(), 1);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures.get("failing"), Some(&StrategyError::SecretMismatch));
        assert_eq!(failures.get("skipped"), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        /// Exactly the applicable strategies are started, and none at all
        /// when nothing applies
        #[test]
        fn prop_only_applicable_strategies_start(applicable in proptest::collection::vec(any::<bool>(), 0..6)) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let counters = ScriptCounters::default();
            let names = ["p0", "p1", "p2", "p3", "p4", "p5"];

            let mut builder = Orchestrator::builder().identity_provider(directory());
            for (name, applies) in names.iter().zip(&applicable) {
                builder = builder.authenticator(
                    Scripted::rejecting(*name, StrategyError::SecretMismatch, &counters).applicable(*applies),
                );
            }
            let orchestrator = builder.build().unwrap();
            let (ctx, _store) = context(AuthRequest::get("/"));

            let error = runtime.block_on(orchestrator.authenticate(&ctx)).unwrap_err();
            let expected = applicable.iter().filter(|applies| **applies).count();

            prop_assert_eq!(counters.started(), expected);
            if expected == 0 {
                prop_assert_eq!(error, AuthenticationError::NoApplicableStrategy);
            } else {
                prop_assert_eq!(error.failures().map(|f| f.len()), Some(expected));
            }
        }
    }
}

#[cfg(test)]
mod decision_tests {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;
    #[allow(unused_imports)]
    use test_case::test_case;

    #[tokio::test]
    async fn test_single_strategy_success() {
        init_test_logging();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(form_login())
            .build()
            .unwrap();
        let (ctx, store) = context(login_request(ALICE, ALICE_PASSWORD));

        let token = orchestrator.authenticate(&ctx).await.unwrap();

        assert!(token.is_fully_authenticated());
        assert_eq!(token.identity().unwrap().credential(), ALICE);
        assert_eq!(token.identity().unwrap().secret(), None);
        assert_eq!(token.authenticated().unwrap().strategy(), "form_login");
        assert_eq!(store.read(), Some(token));
        assert!(ctx.is_fully_authenticated().unwrap());
    }

    /// The single successful strategy wins wherever it sits in the list
    #[test_case(0 ; "winner registered first")]
    #[test_case(1 ; "winner registered in the middle")]
    #[test_case(2 ; "winner registered last")]
    #[tokio::test]
    async fn test_one_success_among_failures(winner: usize) {
        init_test_logging();
        let counters = ScriptCounters::default();
        let mut scripts = vec![
            Scripted::rejecting("expired", StrategyError::CredentialExpired, &counters),
            Scripted::rejecting("mismatch", StrategyError::SecretMismatch, &counters),
        ];
        scripts.insert(winner, Scripted::accepting("winner", &counters));

        let orchestrator = scripts
            .into_iter()
            .fold(Orchestrator::builder().identity_provider(directory()), |builder, scripted| {
                builder.authenticator(scripted)
            })
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let token = orchestrator.authenticate(&ctx).await.unwrap();

        assert!(token.is_fully_authenticated());
        assert_eq!(token.authenticated().unwrap().strategy(), "winner");
    }

    /// Unknown credentials surface as an aggregate failure with the
    /// per-strategy reason kept for diagnostics
    #[tokio::test]
    async fn test_unknown_identity_fails() {
        init_test_logging();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(form_login())
            .build()
            .unwrap();
        let (ctx, store) = context(login_request("nobody@example.org", "whatever"));

        let error = orchestrator.authenticate(&ctx).await.unwrap_err();

        assert_eq!(error.to_string(), "authentication failed");
        let failures = error.failures().unwrap();
        assert!(matches!(failures.get("form_login"), Some(StrategyError::IdentityNotFound(_))));
        assert_eq!(store.read(), None);
        assert!(!error.is_retryable());
    }

    /// A slow success beats an early failure
    #[tokio::test(start_paused = true)]
    async fn test_slow_success_outlasts_fast_failure() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::accepting("slow", &counters).delayed(Duration::from_secs(2)))
            .authenticator(Scripted::rejecting("fast", StrategyError::SecretMismatch, &counters))
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let started = Instant::now();
        let token = orchestrator.authenticate(&ctx).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(token.authenticated().unwrap().strategy(), "slow");
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_panicking_strategy_is_internal_failure() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::panicking("fragile", &counters))
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let error = orchestrator.authenticate(&ctx).await.unwrap_err();

        assert_eq!(
            error.failures().unwrap().get("fragile"),
            Some(&StrategyError::Internal("scripted exploded".to_string()))
        );
        assert!(wait_until_idle(&orchestrator, Duration::from_secs(1)).await);
    }

    #[tokio::test]
    async fn test_panic_does_not_prevent_other_success() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::panicking("fragile", &counters))
            .authenticator(Scripted::accepting("sturdy", &counters).delayed(Duration::from_millis(20)))
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let token = orchestrator.authenticate(&ctx).await.unwrap();
        assert_eq!(token.authenticated().unwrap().strategy(), "sturdy");
    }

    /// A successful race replaces whatever the store held
    #[tokio::test]
    async fn test_success_replaces_partial_token() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::accepting("scripted", &counters))
            .build()
            .unwrap();
        let store = Arc::new(MemoryTokenStore::with_token(Token::PreAuth(PreAuthToken::new("scripted", ALICE))));
        let ctx = RequestContext::with_store(AuthRequest::get("/"), store.clone());

        let token = orchestrator.authenticate(&ctx).await.unwrap();

        assert!(token.is_fully_authenticated());
        assert_eq!(store.read(), Some(token));
    }

    /// A failed race leaves the store as it was
    #[tokio::test]
    async fn test_anonymous_token_survives_failure() {
        init_test_logging();
        let orchestrator = Orchestrator::builder().identity_provider(directory()).build().unwrap();
        let (ctx, store) = context(AuthRequest::get("/"));
        ctx.ensure_anonymous().unwrap();

        assert!(!ctx.is_fully_authenticated().unwrap());
        let error = orchestrator.authenticate(&ctx).await.unwrap_err();

        assert_eq!(error, AuthenticationError::NoApplicableStrategy);
        assert_eq!(store.read(), Some(Token::Anonymous));
    }

    /// Only a fully authenticated token counts as a win
    #[test_case(Token::Anonymous ; "anonymous token")]
    #[test_case(Token::PreAuth(PreAuthToken::new("hollow", ALICE)) ; "pre-auth token")]
    #[tokio::test]
    async fn test_unauthenticated_token_is_not_success(token: Token) {
        init_test_logging();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .strategy(Hollow::new("hollow", token.clone()))
            .build()
            .unwrap();
        let (ctx, store) = context(AuthRequest::get("/"));

        let error = orchestrator.authenticate(&ctx).await.unwrap_err();

        assert!(matches!(
            error.failures().unwrap().get("hollow"),
            Some(StrategyError::Internal(message)) if message.contains(token.state())
        ));
        assert_eq!(store.read(), None);
        assert!(!ctx.is_fully_authenticated().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_token_does_not_end_race() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .strategy(Hollow::new("hollow", Token::Anonymous))
            .authenticator(Scripted::accepting("genuine", &counters).delayed(Duration::from_millis(100)))
            .build()
            .unwrap();
        let (ctx, store) = context(AuthRequest::get("/"));

        let token = orchestrator.authenticate(&ctx).await.unwrap();

        assert!(token.is_fully_authenticated());
        assert_eq!(token.authenticated().unwrap().strategy(), "genuine");
        assert_eq!(store.read(), Some(token));
    }

    /// A policy rejection is one strategy's failure; siblings keep racing
    #[tokio::test(start_paused = true)]
    async fn test_post_auth_rejection_does_not_abort_siblings() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let revoked = StrategyError::PolicyRejected {
            phase: PolicyPhase::Post,
            reason: "account revoked".to_string(),
        };
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::rejecting("revoked", revoked, &counters))
            .authenticator(Scripted::accepting("steady", &counters).delayed(Duration::from_millis(200)))
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let token = orchestrator.authenticate(&ctx).await.unwrap();

        assert_eq!(token.authenticated().unwrap().strategy(), "steady");
        assert_eq!(counters.started(), 2);
    }
}

#[cfg(test)]
mod store_tests {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;
    #[allow(unused_imports)]
    use test_case::test_case;

    #[tokio::test]
    async fn test_missing_store_is_setup_error() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::accepting("scripted", &counters))
            .build()
            .unwrap();
        let ctx = RequestContext::new(AuthRequest::get("/"));

        let error = orchestrator.authenticate(&ctx).await.unwrap_err();

        assert_eq!(error, AuthenticationError::Setup(SetupError::TokenStoreMissing));
        assert!(error.is_setup_error());
        assert_eq!(counters.started(), 0);
    }

    /// A fully authenticated stored token is returned without racing
    #[tokio::test]
    async fn test_stored_token_short_circuits() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::accepting("scripted", &counters))
            .build()
            .unwrap();

        let (first, store) = context(AuthRequest::get("/"));
        let token = orchestrator.authenticate(&first).await.unwrap();
        assert_eq!(counters.started(), 1);

        let second = RequestContext::with_store(AuthRequest::get("/"), store.clone());
        let again = orchestrator.authenticate(&second).await.unwrap();

        assert_eq!(again, token);
        assert_eq!(counters.started(), 1);
    }

    #[tokio::test]
    async fn test_revalidation_picks_up_new_roles() {
        init_test_logging();
        let identities = directory();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(identities.clone())
            .policy(Arc::new(AccountStatusPolicy::new()))
            .authenticator(Scripted::accepting("scripted", &counters))
            .revalidate_stored_token(true)
            .build()
            .unwrap();

        let (first, store) = context(AuthRequest::get("/"));
        let token = orchestrator.authenticate(&first).await.unwrap();
        assert!(!token.has_role(&ROLE_ADMIN));

        assert!(identities.update(ALICE, |alice| alice.with_role(ROLE_ADMIN)));
        let second = RequestContext::with_store(AuthRequest::get("/"), store.clone());
        let refreshed = orchestrator.authenticate(&second).await.unwrap();

        assert!(refreshed.has_role(&ROLE_ADMIN));
        assert_eq!(store.read(), Some(refreshed));
        assert_eq!(counters.started(), 1);
    }

    /// A stored token whose identity got banned is dropped and the race runs
    #[tokio::test]
    async fn test_revalidation_drops_banned_identity() {
        init_test_logging();
        let identities = directory();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(identities.clone())
            .policy(Arc::new(AccountStatusPolicy::new()))
            .authenticator(Scripted::accepting("scripted", &counters))
            .revalidate_stored_token(true)
            .build()
            .unwrap();

        let (first, store) = context(AuthRequest::get("/"));
        orchestrator.authenticate(&first).await.unwrap();

        assert!(identities.update(ALICE, |alice| alice.with_banned(true)));
        let second = RequestContext::with_store(AuthRequest::get("/"), store.clone());
        let error = orchestrator.authenticate(&second).await.unwrap_err();

        assert!(matches!(
            error.failures().unwrap().get("scripted"),
            Some(StrategyError::PolicyRejected { .. })
        ));
        assert_eq!(store.read(), None);
        assert_eq!(counters.started(), 2);
    }
}

#[cfg(test)]
mod cancellation_tests {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;
    #[allow(unused_imports)]
    use test_case::test_case;

    fn stalling(counters: &ScriptCounters, delay: Duration) -> Orchestrator {
        Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::accepting("stubborn", counters).delayed(delay))
            .strategy(Delayed::new(Pipeline::new(Scripted::accepting("polite", counters)), delay))
            .cancel_grace(Duration::from_millis(100))
            .build()
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = stalling(&counters, Duration::from_secs(10));
        let (ctx, store) = context(AuthRequest::get("/"));

        let started = Instant::now();
        let error = orchestrator
            .authenticate_with_deadline(&ctx, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert_eq!(error, AuthenticationError::DeadlineExceeded);
        assert!(error.is_cancellation());
        assert!(error.is_retryable());
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(store.read(), None);

        // the cooperative unit stops at once, the other is aborted after the grace period
        assert!(wait_until_idle(&orchestrator, Duration::from_millis(500)).await);
        assert_eq!(counters.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_deadline() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::accepting("slow", &counters).delayed(Duration::from_secs(5)))
            .deadline(Duration::from_millis(200))
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let error = orchestrator.authenticate(&ctx).await.unwrap_err();
        assert_eq!(error, AuthenticationError::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_caller_cancellation() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = stalling(&counters, Duration::from_secs(10));
        let (ctx, _store) = context(AuthRequest::get("/"));

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        let error = orchestrator.authenticate_with(&ctx, &cancel, None).await.unwrap_err();

        assert_eq!(error, AuthenticationError::Cancelled);
        assert!(wait_until_idle(&orchestrator, Duration::from_millis(500)).await);
        assert_eq!(counters.live(), 0);
    }

    /// Losers keep nothing running once the winner is chosen
    #[tokio::test(start_paused = true)]
    async fn test_losers_are_released_after_success() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Orchestrator::builder()
            .identity_provider(directory())
            .authenticator(Scripted::accepting("quick", &counters))
            .authenticator(Scripted::accepting("sluggish", &counters).delayed(Duration::from_secs(60)))
            .cancel_grace(Duration::from_millis(100))
            .build()
            .unwrap();
        let (ctx, _store) = context(AuthRequest::get("/"));

        let token = orchestrator.authenticate(&ctx).await.unwrap();

        assert_eq!(token.authenticated().unwrap().strategy(), "quick");
        assert!(wait_until_idle(&orchestrator, Duration::from_millis(500)).await);
        assert_eq!(counters.live(), 0);
    }

    /// Dropping the authenticate future aborts every unit
    #[tokio::test(start_paused = true)]
    async fn test_dropped_future_leaks_nothing() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = stalling(&counters, Duration::from_secs(10));
        let (ctx, store) = context(AuthRequest::get("/"));

        let mut pending = tokio_test::task::spawn(orchestrator.authenticate(&ctx));
        tokio_test::assert_pending!(pending.poll());
        assert_eq!(orchestrator.in_flight(), 2);
        drop(pending);

        assert!(wait_until_idle(&orchestrator, Duration::from_millis(50)).await);
        assert_eq!(counters.live(), 0);
        assert_eq!(store.read(), None);
    }
}

#[cfg(test)]
mod concurrency_tests {
    use super::*;
    #[allow(unused_imports)]
    use pretty_assertions::assert_eq;
    #[allow(unused_imports)]
    use test_case::test_case;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_are_isolated() {
        init_test_logging();
        let counters = ScriptCounters::default();
        let orchestrator = Arc::new(
            Orchestrator::builder()
                .identity_provider(directory())
                .authenticator(Scripted::accepting("alice", &counters).for_credential(ALICE))
                .authenticator(Scripted::rejecting("dave", StrategyError::SecretMismatch, &counters).for_credential(DAVE))
                .build()
                .unwrap(),
        );

        let mut requests = tokio::task::JoinSet::new();
        for _ in 0..32 {
            let orchestrator = Arc::clone(&orchestrator);
            requests.spawn(async move {
                let (ctx, store) = context(AuthRequest::get("/"));
                let token = orchestrator.authenticate(&ctx).await?;
                assert_eq!(store.read().as_ref(), Some(&token));
                Ok::<_, AuthenticationError>(token)
            });
        }

        while let Some(joined) = requests.join_next().await {
            let token = joined.unwrap().unwrap();
            assert_eq!(token.identity().unwrap().credential(), ALICE);
        }

        // losers may be cancelled before they reach identity resolution
        assert!(counters.started() >= 32);
        assert!(wait_until_idle(&orchestrator, Duration::from_secs(2)).await);
    }
}
