//! HMAC-SHA-256 receipt signer.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::hook::ports::{ReceiptSigner, ReceiptVerifier, Signature, SigningError};

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies receipts with a shared secret.
#[derive(Clone)]
pub struct HmacReceiptSigner {
    key_id: String,
    secret: Vec<u8>,
}

impl HmacReceiptSigner {
    /// Creates a signer for `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidKey`] for an empty secret.
    pub fn new(key_id: impl Into<String>, secret: impl Into<Vec<u8>>) -> Result<Self, SigningError> {
        let secret = secret.into();
        let key_id = key_id.into();
        if secret.is_empty() {
            return Err(SigningError::InvalidKey(format!("{key_id}: empty secret")));
        }
        Ok(Self { key_id, secret })
    }

    fn mac(&self) -> Result<HmacSha256, SigningError> {
        HmacSha256::new_from_slice(&self.secret)
            .map_err(|err| SigningError::InvalidKey(err.to_string()))
    }
}

impl fmt::Debug for HmacReceiptSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacReceiptSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl ReceiptSigner for HmacReceiptSigner {
    fn key_id(&self) -> String {
        self.key_id.clone()
    }

    fn sign(&self, payload: &[u8]) -> Result<Signature, SigningError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(Signature {
            signature: STANDARD.encode(mac.finalize().into_bytes()),
            key_id: self.key_id.clone(),
        })
    }
}

impl ReceiptVerifier for HmacReceiptSigner {
    fn verify(&self, payload: &[u8], signature: &str, key_id: &str) -> Result<bool, SigningError> {
        if key_id != self.key_id {
            return Err(SigningError::UnknownKey(key_id.to_owned()));
        }
        let expected = STANDARD
            .decode(signature)
            .map_err(|err| SigningError::MalformedSignature(err.to_string()))?;
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(mac.verify_slice(&expected).is_ok())
    }
}
