//! Receipt signing capability.

use thiserror::Error;

/// Signature produced over a receipt payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Encoded signature.
    pub signature: String,
    /// Identifier of the key that produced it.
    pub key_id: String,
}

/// Errors raised while signing or verifying.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SigningError {
    /// The key material is unusable.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    /// The signature is not well-formed.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// The receipt names a key this verifier does not hold.
    #[error("unknown signing key: {0}")]
    UnknownKey(String),
}

/// Signs receipt payloads.
#[cfg_attr(test, mockall::automock)]
pub trait ReceiptSigner: Send + Sync {
    /// Identifier recorded with every signature.
    fn key_id(&self) -> String;

    /// Signs `payload`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] when the key cannot be used.
    fn sign(&self, payload: &[u8]) -> Result<Signature, SigningError>;
}

/// Checks receipt signatures.
pub trait ReceiptVerifier: Send + Sync {
    /// Returns whether `signature` is valid for `payload` under `key_id`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError`] for unknown keys or malformed signatures.
    fn verify(&self, payload: &[u8], signature: &str, key_id: &str) -> Result<bool, SigningError>;
}
