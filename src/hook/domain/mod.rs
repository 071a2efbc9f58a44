//! Domain model for the crash-recovery hook.

mod checkpoint;
mod context;
mod error;
mod event;
mod hook;
mod receipt;
mod recovery;
mod state;

pub use checkpoint::{CheckpointId, CheckpointTrigger, FileSnapshot, GitSnapshot, StepCheckpoint};
pub use context::{LAST_OUTPUT_LIMIT, StepContext};
pub use error::HookDomainError;
pub use event::HookEvent;
pub use hook::{
    HOOK_SCHEMA_VERSION, Hook, MAX_CHECKPOINTS, MAX_HISTORY, TRIGGER_CRASH_DETECTED,
    TRIGGER_CREATED,
};
pub use receipt::{ReceiptId, ReceiptPayload, ValidationReceipt};
pub use recovery::{CrashType, RecoveryAction, RecoveryContext};
pub use state::{HookState, validate_transition};
