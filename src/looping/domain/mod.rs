//! Domain model for loop steps.

mod config;
mod state;

pub use config::{
    DEFAULT_CHECKPOINT_FAILURE_THRESHOLD, DEFAULT_ERROR_THRESHOLD, DEFAULT_STAGNATION_THRESHOLD,
    LoopConfig, SuccessCondition,
};
pub use state::{IterationResult, LoopExitReason, LoopState};
