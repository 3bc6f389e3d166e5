use parking_lot::Mutex;

use super::Token;

/// Request-scoped token storage.
///
/// Lives as long as one request. Persisting a token across requests is the job
/// of an outer session layer (see [`TokenCodec`](super::TokenCodec)).
pub trait TokenStore: Send + Sync {
    /// Current token, if any
    fn read(&self) -> Option<Token>;

    /// Replace the current token
    fn write(&self, token: Token);

    /// Remove the current token
    fn clear(&self);
}

/// Token store holding one token behind a mutex
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: Mutex<Option<Token>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding a token
    #[must_use]
    pub fn with_token(token: Token) -> Self {
        Self { slot: Mutex::new(Some(token)) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn read(&self) -> Option<Token> {
        self.slot.lock().clone()
    }

    fn write(&self, token: Token) {
        *self.slot.lock() = Some(token);
    }

    fn clear(&self) {
        self.slot.lock().take();
    }
}
