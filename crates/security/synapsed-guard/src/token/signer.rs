use std::fmt;

use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::SignatureError;

type HmacSha256 = Hmac<Sha256>;

/// Produces signatures over token payloads
pub trait Signer: Send + Sync {
    /// Id of the key, stored alongside the signature
    fn key_id(&self) -> &str;

    /// Sign a payload
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignatureError>;
}

/// Checks signatures produced by a [`Signer`]
pub trait SignatureVerifier: Send + Sync {
    /// `Ok(())` iff `signature` was made over `payload` with key `key_id`
    fn verify(&self, key_id: &str, payload: &[u8], signature: &[u8]) -> Result<(), SignatureError>;
}

/// HMAC-SHA256 signer and verifier with a single symmetric key
#[derive(Clone)]
pub struct HmacSigner {
    key_id: String,
    key: Zeroizing<Vec<u8>>,
}

impl HmacSigner {
    /// Create a signer from key material
    pub fn new(key_id: impl Into<String>, key: &[u8]) -> Result<Self, SignatureError> {
        if key.is_empty() {
            return Err(SignatureError::InvalidKey("empty key".into()));
        }
        Ok(Self {
            key_id: key_id.into(),
            key: Zeroizing::new(key.to_vec()),
        })
    }

    /// Create a signer with 32 random bytes of key material
    #[must_use]
    pub fn generate(key_id: impl Into<String>) -> Self {
        let mut key = Zeroizing::new(vec![0u8; 32]);
        OsRng.fill_bytes(&mut key);
        Self { key_id: key_id.into(), key }
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| SignatureError::InvalidKey(e.to_string()))
    }

    /// MAC over `payload`
    pub fn tag(&self, payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    /// Constant-time check of a MAC over `payload`
    pub fn check_tag(&self, payload: &[u8], tag: &[u8]) -> Result<(), SignatureError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        mac.verify_slice(tag).map_err(|_| SignatureError::Mismatch)
    }
}

impl fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacSigner")
            .field("key_id", &self.key_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl Signer for HmacSigner {
    fn key_id(&self) -> &str {
        &self.key_id
    }

    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, SignatureError> {
        self.tag(payload)
    }
}

impl SignatureVerifier for HmacSigner {
    fn verify(&self, key_id: &str, payload: &[u8], signature: &[u8]) -> Result<(), SignatureError> {
        if key_id != self.key_id {
            return Err(SignatureError::UnknownKey(key_id.to_string()));
        }
        self.check_tag(payload, signature)
    }
}
