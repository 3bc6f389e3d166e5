//! Request-scoped security context

use std::sync::Arc;

use uuid::Uuid;

use crate::error::SetupError;
use crate::request::AuthRequest;
use crate::token::{Token, TokenStore};

/// Everything the orchestrator needs to know about one request.
///
/// Created by the transport layer per request and passed by parameter; the
/// token store must be attached before authentication runs.
#[derive(Clone)]
pub struct RequestContext {
    request_id: Uuid,
    request: Arc<AuthRequest>,
    store: Option<Arc<dyn TokenStore>>,
}

impl RequestContext {
    /// Context without a token store
    pub fn new(request: AuthRequest) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            request: Arc::new(request),
            store: None,
        }
    }

    /// Context with a token store attached
    pub fn with_store(request: AuthRequest, store: Arc<dyn TokenStore>) -> Self {
        Self::new(request).attach_store(store)
    }

    /// Attach a token store
    #[must_use]
    pub fn attach_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the generated request id
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// Request id used in logs
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The request
    #[must_use]
    pub fn request(&self) -> &AuthRequest {
        &self.request
    }

    pub(crate) fn shared_request(&self) -> Arc<AuthRequest> {
        Arc::clone(&self.request)
    }

    /// The token store, or [`SetupError::TokenStoreMissing`]
    pub fn token_store(&self) -> Result<&dyn TokenStore, SetupError> {
        self.store.as_deref().ok_or(SetupError::TokenStoreMissing)
    }

    /// Current token
    pub fn token(&self) -> Result<Option<Token>, SetupError> {
        Ok(self.token_store()?.read())
    }

    /// Whether the current token is fully authenticated
    pub fn is_fully_authenticated(&self) -> Result<bool, SetupError> {
        Ok(self.token()?.is_some_and(|token| token.is_fully_authenticated()))
    }

    /// Store an anonymous token when the store is empty; returns the current token
    pub fn ensure_anonymous(&self) -> Result<Token, SetupError> {
        let store = self.token_store()?;
        match store.read() {
            Some(token) => Ok(token),
            None => {
                store.write(Token::Anonymous);
                Ok(Token::Anonymous)
            }
        }
    }

    /// Drop a fully authenticated token; returns whether one was dropped
    pub fn logout(&self) -> Result<bool, SetupError> {
        let store = self.token_store()?;
        match store.read() {
            Some(token) if token.is_fully_authenticated() => {
                store.clear();
                tracing::debug!(request_id = %self.request_id, "logged out");
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl std::fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("request", &self.request)
            .field("has_store", &self.store.is_some())
            .finish()
    }
}
