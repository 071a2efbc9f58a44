//! Error types for hook state changes.

use super::HookState;
use thiserror::Error;

/// Errors returned by hook state changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HookDomainError {
    /// The target state is not reachable from the current state.
    #[error("invalid hook transition: {from} -> {to}")]
    InvalidTransition {
        /// Current state.
        from: HookState,
        /// Requested state.
        to: HookState,
    },

    /// The hook is in a terminal state.
    #[error("hook is in terminal state {0}")]
    TerminalState(HookState),

    /// The operation needs a step context but none is set.
    #[error("hook has no current step")]
    NoCurrentStep,
}
