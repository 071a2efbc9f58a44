//! Receipt issuance and verification.

use crate::hook::{
    domain::{ReceiptId, ReceiptPayload, ValidationReceipt},
    ports::{ReceiptSigner, ReceiptVerifier, SigningError},
};
use crate::validation::CommandRun;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;

/// Returns the full hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Errors raised while issuing or verifying receipts.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The payload could not be encoded.
    #[error("failed to encode receipt payload: {0}")]
    Encode(#[from] serde_json::Error),

    /// Signing or verification failed.
    #[error(transparent)]
    Signing(#[from] SigningError),

    /// The signer signed with a key other than the one the payload names.
    #[error("signer used key {actual} but the receipt names key {expected}")]
    KeyMismatch {
        /// Key recorded in the signed payload.
        expected: String,
        /// Key reported with the signature.
        actual: String,
    },
}

/// Outcome of checking a receipt against captured output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptCheck {
    /// Whether both output hashes match.
    pub hashes_match: bool,
    /// Whether the signature is valid for the payload.
    pub signature_valid: bool,
}

impl ReceiptCheck {
    /// Returns whether the receipt is authentic and matches the output.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.hashes_match && self.signature_valid
    }
}

/// Turns command runs into signed receipts.
pub struct ReceiptLedger<S>
where
    S: ReceiptSigner + ?Sized,
{
    signer: Arc<S>,
}

impl<S> Clone for ReceiptLedger<S>
where
    S: ReceiptSigner + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            signer: Arc::clone(&self.signer),
        }
    }
}

impl<S> ReceiptLedger<S>
where
    S: ReceiptSigner + ?Sized,
{
    /// Creates a ledger signing with `signer`.
    #[must_use]
    pub const fn new(signer: Arc<S>) -> Self {
        Self { signer }
    }

    /// Issues a signed receipt for `run`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the payload cannot be encoded or signed,
    /// and [`LedgerError::KeyMismatch`] when the signature was made with a
    /// key other than the one recorded in the payload.
    pub fn issue(&self, step_name: &str, run: &CommandRun) -> Result<ValidationReceipt, LedgerError> {
        let payload = ReceiptPayload {
            receipt_id: ReceiptId::new(),
            step_name: step_name.to_owned(),
            command: run.command.clone(),
            exit_code: run.receipt_exit_code(),
            started_at: run.started_at,
            completed_at: run.completed_at,
            duration_ms: run.duration_ms,
            stdout_hash: sha256_hex(run.stdout.as_bytes()),
            stderr_hash: sha256_hex(run.stderr.as_bytes()),
            key_id: self.signer.key_id(),
        };
        let signature = self.signer.sign(&payload.canonical_bytes()?)?;
        if signature.key_id != payload.key_id {
            return Err(LedgerError::KeyMismatch {
                expected: payload.key_id,
                actual: signature.key_id,
            });
        }
        Ok(ValidationReceipt::new(payload, signature.signature))
    }
}

/// Checks `receipt` against the output it claims to cover.
///
/// # Errors
///
/// Returns [`LedgerError`] when the payload cannot be encoded or the
/// verifier rejects the key or signature encoding.
pub fn verify_receipt(
    receipt: &ValidationReceipt,
    stdout: &[u8],
    stderr: &[u8],
    verifier: &(impl ReceiptVerifier + ?Sized),
) -> Result<ReceiptCheck, LedgerError> {
    let hashes_match =
        receipt.stdout_hash() == sha256_hex(stdout) && receipt.stderr_hash() == sha256_hex(stderr);
    let signature_valid = verifier.verify(
        &receipt.payload().canonical_bytes()?,
        receipt.signature(),
        receipt.key_id(),
    )?;
    Ok(ReceiptCheck {
        hashes_match,
        signature_valid,
    })
}
