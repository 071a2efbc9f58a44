//! Crash diagnosis.

use crate::hook::domain::{
    CrashType, Hook, HookState, RecoveryAction, RecoveryContext, StepContext,
};
use chrono::{DateTime, Duration, Utc};

/// Default age limit for a checkpoint to be resumable.
pub const DEFAULT_CHECKPOINT_WINDOW: std::time::Duration = std::time::Duration::from_secs(15 * 60);

/// Evidence gathered outside the hook record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosisInput {
    /// Whether the previous process is known to have been killed by a
    /// signal.
    pub terminated_by_signal: bool,
    /// Validation PIDs still recorded on the task.
    pub stale_pids: Vec<u32>,
    /// Whether the interrupted step's validation commands may be re-run.
    pub step_idempotent: bool,
}

/// Classifies the last known state of a crashed task and recommends how to
/// resume it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryDiagnoser {
    checkpoint_window: Duration,
}

impl Default for RecoveryDiagnoser {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_WINDOW)
    }
}

impl RecoveryDiagnoser {
    /// Creates a diagnoser with the given checkpoint recency window.
    #[must_use]
    pub fn new(checkpoint_window: std::time::Duration) -> Self {
        Self {
            checkpoint_window: Duration::from_std(checkpoint_window).unwrap_or(Duration::MAX),
        }
    }

    /// Diagnoses `hook` at `now`.
    #[must_use]
    pub fn diagnose(&self, hook: &Hook, input: &DiagnosisInput, now: DateTime<Utc>) -> RecoveryContext {
        let last_known_state = hook.state();
        let step = hook.current_step();
        let crash_type = classify(step, hook.updated_at(), input.terminated_by_signal);
        let validation_in_flight =
            !input.stale_pids.is_empty() || step.is_some_and(|ctx| ctx.validation_in_flight);

        let recent_checkpoint = hook
            .latest_checkpoint()
            .filter(|cp| now.signed_duration_since(cp.created_at) <= self.checkpoint_window);
        let human_gated = step.is_some_and(|ctx| ctx.step_type.is_human_gated())
            || last_known_state == HookState::AwaitingHuman;

        let (recommended_action, reason, checkpoint_id) = if last_known_state
            == HookState::StepValidating
            && input.step_idempotent
        {
            (
                RecoveryAction::RetryStep,
                "validation was interrupted and its commands are idempotent".to_owned(),
                None,
            )
        } else if let Some(checkpoint) = recent_checkpoint.filter(|_| !validation_in_flight) {
            (
                RecoveryAction::RetryFromCheckpoint,
                format!(
                    "checkpoint '{}' from {} is within the recovery window",
                    checkpoint.description, checkpoint.created_at
                ),
                Some(checkpoint.checkpoint_id),
            )
        } else if human_gated {
            (
                RecoveryAction::Manual,
                "step is waiting on a human decision".to_owned(),
                None,
            )
        } else {
            (RecoveryAction::Manual, fallback_reason(validation_in_flight, hook), None)
        };

        RecoveryContext {
            detected_at: now,
            crash_type,
            last_known_state,
            validation_in_flight,
            stale_pids: input.stale_pids.clone(),
            recommended_action,
            reason,
            checkpoint_id,
        }
    }
}

fn classify(step: Option<&StepContext>, last_write: DateTime<Utc>, by_signal: bool) -> CrashType {
    if step.is_some_and(|ctx| ctx.deadline() <= last_write) {
        CrashType::Timeout
    } else if by_signal {
        CrashType::Signal
    } else {
        CrashType::Unknown
    }
}

fn fallback_reason(validation_in_flight: bool, hook: &Hook) -> String {
    if validation_in_flight {
        "validation commands may still have been running; inspect side effects before resuming"
            .to_owned()
    } else if hook.latest_checkpoint().is_some() {
        "latest checkpoint is older than the recovery window".to_owned()
    } else {
        "no checkpoint to resume from".to_owned()
    }
}
