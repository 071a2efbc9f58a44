//! Hook aggregate: the durable crash-recovery record of one task.

use super::{
    CheckpointId, HookDomainError, HookEvent, HookState, RecoveryContext, StepCheckpoint,
    StepContext, ValidationReceipt, validate_transition,
};
use crate::task::domain::{TaskId, WorkspaceName};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Current on-disk schema version of hook records.
pub const HOOK_SCHEMA_VERSION: u32 = 1;
/// Maximum number of history events kept.
pub const MAX_HISTORY: usize = 200;
/// Maximum number of checkpoints kept.
pub const MAX_CHECKPOINTS: usize = 50;

/// Trigger recorded for the event that creates a hook.
pub const TRIGGER_CREATED: &str = "created";
/// Trigger recorded when a hook enters recovery.
pub const TRIGGER_CRASH_DETECTED: &str = "crash_detected";

/// Crash-recovery record of a task.
///
/// History and checkpoints are bounded and evict their oldest entries;
/// receipts are never pruned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    task_id: TaskId,
    workspace: WorkspaceName,
    state: HookState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_step: Option<StepContext>,
    #[serde(default)]
    history: VecDeque<HookEvent>,
    #[serde(default)]
    checkpoints: VecDeque<StepCheckpoint>,
    #[serde(default)]
    receipts: Vec<ValidationReceipt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recovery: Option<RecoveryContext>,
    schema_version: u32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Hook {
    /// Creates a hook in [`HookState::Initializing`], recording the creation
    /// as the first history event.
    #[must_use]
    pub fn new(task_id: TaskId, workspace: WorkspaceName, clock: &impl Clock) -> Self {
        let now = clock.utc();
        let mut hook = Self {
            task_id,
            workspace,
            state: HookState::Uninitialized,
            current_step: None,
            history: VecDeque::new(),
            checkpoints: VecDeque::new(),
            receipts: Vec::new(),
            recovery: None,
            schema_version: HOOK_SCHEMA_VERSION,
            created_at: now,
            updated_at: now,
        };
        hook.apply(HookState::Initializing, TRIGGER_CREATED.to_owned(), None, now);
        hook
    }

    /// Returns the owning task.
    #[must_use]
    pub const fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns the owning workspace.
    #[must_use]
    pub const fn workspace(&self) -> &WorkspaceName {
        &self.workspace
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> HookState {
        self.state
    }

    /// Returns whether the hook reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the tracked step, if any.
    #[must_use]
    pub const fn current_step(&self) -> Option<&StepContext> {
        self.current_step.as_ref()
    }

    /// Returns the event history, oldest first.
    #[must_use]
    pub const fn history(&self) -> &VecDeque<HookEvent> {
        &self.history
    }

    /// Returns the retained checkpoints, oldest first.
    #[must_use]
    pub const fn checkpoints(&self) -> &VecDeque<StepCheckpoint> {
        &self.checkpoints
    }

    /// Returns the newest checkpoint.
    #[must_use]
    pub fn latest_checkpoint(&self) -> Option<&StepCheckpoint> {
        self.checkpoints.back()
    }

    /// Finds a retained checkpoint by identifier.
    #[must_use]
    pub fn checkpoint(&self, id: CheckpointId) -> Option<&StepCheckpoint> {
        self.checkpoints.iter().find(|cp| cp.checkpoint_id == id)
    }

    /// Returns every receipt, oldest first.
    #[must_use]
    pub fn receipts(&self) -> &[ValidationReceipt] {
        &self.receipts
    }

    /// Returns the recovery diagnosis, if any.
    #[must_use]
    pub const fn recovery(&self) -> Option<&RecoveryContext> {
        self.recovery.as_ref()
    }

    /// Returns the record schema version.
    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the last write timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Moves the hook to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`HookDomainError`] when the table forbids the transition.
    pub fn transition(
        &mut self,
        to: HookState,
        trigger: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), HookDomainError> {
        validate_transition(self.state, to)?;
        self.apply(to, trigger.into(), None, clock.utc());
        Ok(())
    }

    /// Moves the hook to `to`, attaching structured details to the event.
    ///
    /// # Errors
    ///
    /// Returns [`HookDomainError`] when the table forbids the transition.
    pub fn transition_with_details(
        &mut self,
        to: HookState,
        trigger: impl Into<String>,
        details: serde_json::Value,
        clock: &impl Clock,
    ) -> Result<(), HookDomainError> {
        validate_transition(self.state, to)?;
        self.apply(to, trigger.into(), Some(details), clock.utc());
        Ok(())
    }

    /// Starts tracking a step and moves to [`HookState::StepRunning`].
    ///
    /// # Errors
    ///
    /// Returns [`HookDomainError`] when the table forbids the transition; the
    /// previous step context is kept in that case.
    pub fn start_step(
        &mut self,
        context: StepContext,
        trigger: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), HookDomainError> {
        validate_transition(self.state, HookState::StepRunning)?;
        self.current_step = Some(context);
        self.apply(HookState::StepRunning, trigger.into(), None, clock.utc());
        Ok(())
    }

    /// Updates the tracked step in place.
    ///
    /// # Errors
    ///
    /// Returns [`HookDomainError::NoCurrentStep`] when no step is tracked.
    pub fn update_step(
        &mut self,
        clock: &impl Clock,
        update: impl FnOnce(&mut StepContext, DateTime<Utc>),
    ) -> Result<(), HookDomainError> {
        let now = clock.utc();
        let context = self
            .current_step
            .as_mut()
            .ok_or(HookDomainError::NoCurrentStep)?;
        update(context, now);
        self.updated_at = now;
        Ok(())
    }

    /// Stops tracking the current step.
    pub fn clear_step(&mut self, clock: &impl Clock) {
        self.current_step = None;
        self.updated_at = clock.utc();
    }

    /// Stores a checkpoint, evicting the oldest beyond [`MAX_CHECKPOINTS`].
    pub fn add_checkpoint(&mut self, checkpoint: StepCheckpoint, clock: &impl Clock) {
        self.checkpoints.push_back(checkpoint);
        while self.checkpoints.len() > MAX_CHECKPOINTS {
            self.checkpoints.pop_front();
        }
        self.updated_at = clock.utc();
    }

    /// Appends a receipt. Receipts are never evicted.
    pub fn append_receipt(&mut self, receipt: ValidationReceipt, clock: &impl Clock) {
        self.receipts.push(receipt);
        self.updated_at = clock.utc();
    }

    /// Enters [`HookState::Recovering`] with a diagnosis.
    ///
    /// Recovery may start from any live state. A hook that is already
    /// recovering only has its diagnosis replaced.
    ///
    /// # Errors
    ///
    /// Returns [`HookDomainError::TerminalState`] for terminal hooks and
    /// [`HookDomainError::InvalidTransition`] for a hook that was never
    /// initialised.
    pub fn enter_recovery(
        &mut self,
        context: RecoveryContext,
        clock: &impl Clock,
    ) -> Result<(), HookDomainError> {
        if self.state.is_terminal() {
            return Err(HookDomainError::TerminalState(self.state));
        }
        if !self.state.can_enter_recovery() {
            return Err(HookDomainError::InvalidTransition {
                from: self.state,
                to: HookState::Recovering,
            });
        }

        let now = clock.utc();
        let details = serde_json::json!({
            "crash_type": context.crash_type,
            "recommended_action": context.recommended_action,
            "validation_in_flight": context.validation_in_flight,
        });
        self.recovery = Some(context);
        if self.state == HookState::Recovering {
            self.updated_at = now;
        } else {
            self.apply(
                HookState::Recovering,
                TRIGGER_CRASH_DETECTED.to_owned(),
                Some(details),
                now,
            );
        }
        Ok(())
    }

    /// Leaves [`HookState::Recovering`] and drops the diagnosis.
    ///
    /// # Errors
    ///
    /// Returns [`HookDomainError`] when the hook is not recovering or the
    /// target is not reachable from recovery.
    pub fn resolve_recovery(
        &mut self,
        to: HookState,
        trigger: impl Into<String>,
        clock: &impl Clock,
    ) -> Result<(), HookDomainError> {
        if self.state != HookState::Recovering {
            return Err(HookDomainError::InvalidTransition {
                from: self.state,
                to,
            });
        }
        validate_transition(self.state, to)?;
        let details = self
            .recovery
            .take()
            .and_then(|context| serde_json::to_value(context).ok());
        self.apply(to, trigger.into(), details, clock.utc());
        Ok(())
    }

    /// Attaches a diagnosis without changing state.
    ///
    /// Used when the engine hits an error it cannot handle, so the next run
    /// finds the diagnosis on disk.
    pub fn record_diagnosis(&mut self, context: RecoveryContext, clock: &impl Clock) {
        self.recovery = Some(context);
        self.updated_at = clock.utc();
    }

    fn apply(
        &mut self,
        to: HookState,
        trigger: String,
        details: Option<serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        let event = HookEvent {
            timestamp: now,
            from_state: self.state,
            to_state: to,
            trigger,
            step_name: self
                .current_step
                .as_ref()
                .map(|context| context.step_name.clone()),
            details,
        };
        self.history.push_back(event);
        while self.history.len() > MAX_HISTORY {
            self.history.pop_front();
        }
        self.state = to;
        self.updated_at = now;
    }
}
