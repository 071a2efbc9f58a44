//! Application services for hooks: durable transitions, checkpoints,
//! crash diagnosis and receipts.

mod checkpoint;
mod hook_service;
mod ledger;
mod recovery;

pub use checkpoint::{
    CheckpointError, CheckpointRequest, CheckpointService, FINGERPRINT_LEN, fingerprint,
};
pub use hook_service::{HookService, HookServiceError, HookServiceResult};
pub use ledger::{LedgerError, ReceiptCheck, ReceiptLedger, sha256_hex, verify_receipt};
pub use recovery::{DEFAULT_CHECKPOINT_WINDOW, DiagnosisInput, RecoveryDiagnoser};
