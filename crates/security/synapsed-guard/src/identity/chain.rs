use std::sync::Arc;

use async_trait::async_trait;

use super::{Identity, IdentityProvider, ProviderError};

/// Ordered list of providers queried in turn.
///
/// `provide` returns the first hit; a backend failure stops the walk.
/// `refresh` goes to the first provider whose `supports` accepts the identity.
#[derive(Default, Clone)]
pub struct ChainIdentityProvider {
    providers: Vec<Arc<dyn IdentityProvider>>,
}

impl ChainIdentityProvider {
    /// Create an empty chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Number of providers in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Whether the chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

#[async_trait]
impl IdentityProvider for ChainIdentityProvider {
    async fn provide(&self, credential: &str) -> Result<Identity, ProviderError> {
        for provider in &self.providers {
            match provider.provide(credential).await {
                Ok(identity) => return Ok(identity),
                Err(ProviderError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(ProviderError::NotFound(credential.to_string()))
    }

    async fn refresh(&self, identity: &Identity) -> Result<Identity, ProviderError> {
        match self.providers.iter().find(|p| p.supports(identity)) {
            Some(provider) => provider.refresh(identity).await,
            None => Err(ProviderError::NotFound(identity.credential().to_string())),
        }
    }

    fn supports(&self, identity: &Identity) -> bool {
        self.providers.iter().any(|p| p.supports(identity))
    }
}
