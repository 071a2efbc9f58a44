//! Signed proof that a validation command ran.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(Uuid);

impl ReceiptId {
    /// Creates a new random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ReceiptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The signed portion of a receipt.
///
/// Field order is part of the signature: the payload is signed over its
/// compact JSON encoding, which follows declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPayload {
    /// Receipt identifier.
    pub receipt_id: ReceiptId,
    /// Step the command belonged to.
    pub step_name: String,
    /// Command line as executed.
    pub command: String,
    /// Process exit code; `-1` when killed by a signal.
    pub exit_code: i32,
    /// Start time.
    pub started_at: DateTime<Utc>,
    /// End time.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Hex SHA-256 of standard output.
    pub stdout_hash: String,
    /// Hex SHA-256 of standard error.
    pub stderr_hash: String,
    /// Identifier of the signing key.
    pub key_id: String,
}

impl ReceiptPayload {
    /// Returns the canonical bytes that are signed.
    ///
    /// # Errors
    ///
    /// Returns the encoder error; this cannot happen for well-formed values.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Immutable validation receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReceipt {
    #[serde(flatten)]
    payload: ReceiptPayload,
    signature: String,
}

impl ValidationReceipt {
    /// Pairs a payload with its signature.
    #[must_use]
    pub const fn new(payload: ReceiptPayload, signature: String) -> Self {
        Self { payload, signature }
    }

    /// Returns the signed payload.
    #[must_use]
    pub const fn payload(&self) -> &ReceiptPayload {
        &self.payload
    }

    /// Returns the receipt identifier.
    #[must_use]
    pub const fn receipt_id(&self) -> ReceiptId {
        self.payload.receipt_id
    }

    /// Returns the step name.
    #[must_use]
    pub fn step_name(&self) -> &str {
        &self.payload.step_name
    }

    /// Returns the command line.
    #[must_use]
    pub fn command(&self) -> &str {
        &self.payload.command
    }

    /// Returns the exit code.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        self.payload.exit_code
    }

    /// Returns the start time.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.payload.started_at
    }

    /// Returns the end time.
    #[must_use]
    pub const fn completed_at(&self) -> DateTime<Utc> {
        self.payload.completed_at
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub const fn duration_ms(&self) -> u64 {
        self.payload.duration_ms
    }

    /// Returns the standard output hash.
    #[must_use]
    pub fn stdout_hash(&self) -> &str {
        &self.payload.stdout_hash
    }

    /// Returns the standard error hash.
    #[must_use]
    pub fn stderr_hash(&self) -> &str {
        &self.payload.stderr_hash
    }

    /// Returns the base64 signature.
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns the signing key identifier.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.payload.key_id
    }
}
