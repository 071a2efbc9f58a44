//! Hook states and the crash-recovery transition table.

use super::HookDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a task in the crash-recovery state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookState {
    /// No hook exists yet.
    #[default]
    Uninitialized,
    /// The hook was created and the task is being prepared.
    Initializing,
    /// The next step is ready to start.
    StepPending,
    /// A step is executing.
    StepRunning,
    /// Validation commands for the current step are executing.
    StepValidating,
    /// Blocked on a human decision.
    AwaitingHuman,
    /// A crash was detected and a recovery action is being applied.
    Recovering,
    /// All steps finished.
    Completed,
    /// The task failed and cannot continue.
    Failed,
    /// The task was abandoned.
    Abandoned,
}

impl HookState {
    /// Every state, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Uninitialized,
        Self::Initializing,
        Self::StepPending,
        Self::StepRunning,
        Self::StepValidating,
        Self::AwaitingHuman,
        Self::Recovering,
        Self::Completed,
        Self::Failed,
        Self::Abandoned,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::StepPending => "step_pending",
            Self::StepRunning => "step_running",
            Self::StepValidating => "step_validating",
            Self::AwaitingHuman => "awaiting_human",
            Self::Recovering => "recovering",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    /// Returns whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Abandoned)
    }

    /// Returns the states reachable from this one.
    #[must_use]
    pub const fn allowed_targets(self) -> &'static [Self] {
        match self {
            Self::Uninitialized => &[Self::Initializing],
            Self::Initializing => &[Self::StepPending, Self::Failed],
            Self::StepPending => &[Self::StepRunning, Self::Completed, Self::Abandoned],
            Self::StepRunning => &[
                Self::StepValidating,
                Self::StepPending,
                Self::AwaitingHuman,
                Self::Failed,
                Self::Abandoned,
            ],
            Self::StepValidating => &[Self::StepPending, Self::AwaitingHuman, Self::Failed],
            Self::AwaitingHuman => &[Self::StepPending, Self::StepRunning, Self::Abandoned],
            Self::Recovering => &[
                Self::StepPending,
                Self::StepRunning,
                Self::AwaitingHuman,
                Self::Failed,
            ],
            Self::Completed | Self::Failed | Self::Abandoned => &[],
        }
    }

    /// Returns whether `target` is reachable in one transition.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Returns whether a hook in this state may enter recovery.
    #[must_use]
    pub const fn can_enter_recovery(self) -> bool {
        !self.is_terminal() && !matches!(self, Self::Uninitialized)
    }
}

impl fmt::Display for HookState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks a transition against the table.
///
/// # Errors
///
/// Returns [`HookDomainError::TerminalState`] when `from` is terminal and
/// [`HookDomainError::InvalidTransition`] when `to` is not reachable.
pub fn validate_transition(from: HookState, to: HookState) -> Result<(), HookDomainError> {
    if from.is_terminal() {
        return Err(HookDomainError::TerminalState(from));
    }
    if !from.can_transition_to(to) {
        return Err(HookDomainError::InvalidTransition { from, to });
    }
    Ok(())
}
