use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use super::Token;
use crate::identity::IdentityRegistry;
use crate::{Error, Result};

/// Encodes tokens for an external session layer.
///
/// Tokens are JSON, base64url-wrapped. Tokens whose identity kind is not in
/// the registry are refused in both directions.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    registry: Arc<IdentityRegistry>,
}

impl TokenCodec {
    /// Create a codec accepting the kinds in `registry`
    pub fn new(registry: Arc<IdentityRegistry>) -> Self {
        Self { registry }
    }

    /// Serialize a token
    pub fn encode(&self, token: &Token) -> Result<String> {
        self.check_kind(token)?;
        let json = serde_json::to_vec(token)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Deserialize a token
    pub fn decode(&self, encoded: &str) -> Result<Token> {
        let json = URL_SAFE_NO_PAD
            .decode(encoded.trim())
            .map_err(|e| Error::Codec(format!("invalid base64: {e}")))?;
        let token: Token = serde_json::from_slice(&json)?;
        self.check_kind(&token)?;
        Ok(token)
    }

    fn check_kind(&self, token: &Token) -> Result<()> {
        match token.identity() {
            Some(identity) if !self.registry.contains(identity.kind()) => Err(Error::Codec(format!(
                "identity kind \"{}\" is not registered",
                identity.kind()
            ))),
            _ => Ok(()),
        }
    }
}
