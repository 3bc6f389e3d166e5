//! Shared fixtures for the guard integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

use async_trait::async_trait;
use synapsed_guard::identity::{Identity, IdentityProvider, InMemoryIdentityProvider};
use synapsed_guard::role::{ROLE_ADMIN, ROLE_USER};
use synapsed_guard::secret::{Argon2SecretEncoder, PasswordConfig};
use synapsed_guard::strategy::Authenticator;
use synapsed_guard::token::MemoryTokenStore;
use synapsed_guard::{AuthRequest, Orchestrator, RequestContext, StrategyError};

pub const ALICE: &str = "alice@example.org";
pub const ALICE_PASSWORD: &str = "wonderland";
pub const BOB: &str = "bob@example.org";
pub const CAROL: &str = "carol@example.org";
pub const DAVE: &str = "dave@example.org";
pub const SHARED_PASSWORD: &str = "correct horse";

static LOGGING: Once = Once::new();

/// Route tracing output through the test harness; `RUST_LOG` controls verbosity
pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Argon2 parameters cheap enough for tests
pub fn fast_password_config() -> PasswordConfig {
    PasswordConfig {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
        output_length: 32,
    }
}

/// alice (user), bob (banned), carol (inactive), dave (admin)
pub fn directory() -> Arc<InMemoryIdentityProvider> {
    let encoder = Argon2SecretEncoder::new(&fast_password_config()).unwrap();
    let hash = |plain: &str| encoder.encode(plain.as_bytes()).unwrap();

    Arc::new(
        InMemoryIdentityProvider::new()
            .with_identity(Identity::new("u-alice", ALICE).with_secret(hash(ALICE_PASSWORD)))
            .with_identity(Identity::new("u-bob", BOB).with_secret(hash(SHARED_PASSWORD)).with_banned(true))
            .with_identity(Identity::new("u-carol", CAROL).with_secret(hash(SHARED_PASSWORD)).with_active(false))
            .with_identity(
                Identity::new("u-dave", DAVE)
                    .with_secret(hash(SHARED_PASSWORD))
                    .with_roles([ROLE_USER, ROLE_ADMIN]),
            ),
    )
}

/// POST form login
pub fn login_request(credential: &str, password: &str) -> AuthRequest {
    AuthRequest::post("/login")
        .with_form_field("username", credential)
        .with_form_field("password", password)
}

/// Context over a fresh in-memory token store
pub fn context(request: AuthRequest) -> (RequestContext, Arc<MemoryTokenStore>) {
    let store = Arc::new(MemoryTokenStore::new());
    (RequestContext::with_store(request, store.clone()), store)
}

/// Poll until the orchestrator has no units left, or give up after `limit`
pub async fn wait_until_idle(orchestrator: &Orchestrator, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while orchestrator.in_flight() > 0 {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

/// Counters shared between a test and its scripts
#[derive(Debug, Clone, Default)]
pub struct ScriptCounters {
    started: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl ScriptCounters {
    /// Scripts that reached identity resolution
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Scripts currently inside identity resolution
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct Live(Arc<AtomicUsize>);

impl Drop for Live {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How a scripted authenticator ends its secret check
#[derive(Debug, Clone)]
pub enum Verdict {
    Accept,
    Reject(StrategyError),
    Panic,
}

/// Scriptable authenticator: waits `delay` while resolving, ignoring
/// cancellation, then applies its verdict
#[derive(Debug, Clone)]
pub struct Scripted {
    name: &'static str,
    applicable: bool,
    credential: String,
    delay: Duration,
    verdict: Verdict,
    counters: ScriptCounters,
}

impl Scripted {
    pub fn accepting(name: &'static str, counters: &ScriptCounters) -> Self {
        Self {
            name,
            applicable: true,
            credential: ALICE.to_string(),
            delay: Duration::ZERO,
            verdict: Verdict::Accept,
            counters: counters.clone(),
        }
    }

    pub fn rejecting(name: &'static str, error: StrategyError, counters: &ScriptCounters) -> Self {
        Self { verdict: Verdict::Reject(error), ..Self::accepting(name, counters) }
    }

    pub fn panicking(name: &'static str, counters: &ScriptCounters) -> Self {
        Self { verdict: Verdict::Panic, ..Self::accepting(name, counters) }
    }

    pub fn inapplicable(name: &'static str, counters: &ScriptCounters) -> Self {
        Self { applicable: false, ..Self::accepting(name, counters) }
    }

    pub fn applicable(mut self, applicable: bool) -> Self {
        self.applicable = applicable;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn for_credential(mut self, credential: &str) -> Self {
        self.credential = credential.to_string();
        self
    }
}

#[async_trait]
impl Authenticator for Scripted {
    type Credentials = String;

    fn name(&self) -> &str {
        self.name
    }

    fn supports(&self, _request: &AuthRequest) -> bool {
        self.applicable
    }

    fn extract_credentials(&self, _request: &AuthRequest) -> Result<String, StrategyError> {
        Ok(self.credential.clone())
    }

    async fn resolve_identity(
        &self,
        identities: &dyn IdentityProvider,
        credential: &String,
    ) -> Result<Identity, StrategyError> {
        self.counters.started.fetch_add(1, Ordering::SeqCst);
        self.counters.live.fetch_add(1, Ordering::SeqCst);
        let _live = Live(Arc::clone(&self.counters.live));

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(identities.provide(credential).await?)
    }

    async fn verify(&self, _credential: &String, _identity: &Identity) -> Result<(), StrategyError> {
        match &self.verdict {
            Verdict::Accept => Ok(()),
            Verdict::Reject(error) => Err(error.clone()),
            Verdict::Panic => panic!("scripted exploded"),
        }
    }
}
