//! Capabilities the loop controller drives once per iteration.

use crate::looping::domain::{IterationResult, LoopConfig, LoopState};
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Runs the inner steps of one iteration.
///
/// Failures of inner steps are reported through
/// [`IterationResult::error`], not as an `Err`, so the controller can count
/// them.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IterationRunner: Send + Sync {
    /// Runs iteration `state.current_iteration`, starting at
    /// `state.inner_step_index`.
    async fn run_iteration(
        &self,
        state: &LoopState,
        config: &LoopConfig,
        cancel: &CancellationToken,
    ) -> IterationResult;
}

/// Error raised when a loop checkpoint cannot be taken.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("loop checkpoint failed: {0}")]
pub struct LoopCheckpointError(pub String);

/// Takes a recovery checkpoint after an iteration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LoopCheckpointer: Send + Sync {
    /// Records a checkpoint for the iteration that just finished.
    async fn checkpoint(&self, state: &LoopState) -> Result<(), LoopCheckpointError>;
}
