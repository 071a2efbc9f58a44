//! Startup crash recovery.

use super::error::{EngineError, EngineResult};
use crate::hook::domain::{Hook, HookState, RecoveryAction, RecoveryContext};
use crate::hook::ports::HookRepository;
use crate::hook::services::{DiagnosisInput, RecoveryDiagnoser};
use crate::storage::{LockError, TaskLockProvider};
use crate::task::domain::{Task, TaskId, TaskStatus};
use crate::task::ports::TaskRepository;
use crate::validation::ProcessSignaller;
use mockable::Clock;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Finds hooks left mid-flight by a previous process and diagnoses them.
pub struct RecoveryService<T, H, C>
where
    T: TaskRepository,
    H: HookRepository,
    C: Clock + Send + Sync,
{
    tasks: Arc<T>,
    hooks: Arc<H>,
    locks: Arc<dyn TaskLockProvider>,
    signaller: Arc<dyn ProcessSignaller>,
    diagnoser: RecoveryDiagnoser,
    clock: Arc<C>,
}

impl<T, H, C> RecoveryService<T, H, C>
where
    T: TaskRepository,
    H: HookRepository,
    C: Clock + Send + Sync,
{
    /// Creates a recovery service.
    #[must_use]
    pub fn new(
        tasks: Arc<T>,
        hooks: Arc<H>,
        locks: Arc<dyn TaskLockProvider>,
        signaller: Arc<dyn ProcessSignaller>,
        diagnoser: RecoveryDiagnoser,
        clock: Arc<C>,
    ) -> Self {
        Self {
            tasks,
            hooks,
            locks,
            signaller,
            diagnoser,
            clock,
        }
    }

    /// Diagnoses one task and moves its hook into recovery.
    ///
    /// Yields `Ok(None)` for hooks that need no recovery: terminal hooks,
    /// hooks still initialising, and hooks parked for a human while the
    /// task waits on attention. Validation PIDs the previous run left
    /// behind are reported in the diagnosis but never signalled, since the
    /// OS may have handed them to unrelated processes.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Lock`] when another writer is active, and
    /// persistence or state-machine errors.
    pub async fn recover(
        &self,
        task_id: TaskId,
        terminated_by_signal: bool,
    ) -> EngineResult<Option<RecoveryContext>> {
        let _lease = self.locks.acquire(task_id)?;
        let mut hook = self.hooks.load(task_id).await?;
        // An initialising hook has run no step, so there is nothing to resume.
        if hook.is_terminal() || hook.state() == HookState::Initializing {
            return Ok(None);
        }
        let mut task = self.tasks.load(task_id).await?;
        if is_parked(&task, &hook) {
            debug!(%task_id, status = %task.status(), "task is waiting on a human; not recovering");
            return Ok(None);
        }

        let stale_pids: Vec<u32> = task.running_validation_pids().iter().copied().collect();
        self.report_orphans(task_id, &stale_pids);
        let input = DiagnosisInput {
            terminated_by_signal,
            stale_pids,
            step_idempotent: current_step_idempotent(&task),
        };
        let context = self.diagnoser.diagnose(&hook, &input, self.clock.utc());

        task.drain_validation_pids(&*self.clock);
        hook.enter_recovery(context.clone(), &*self.clock)?;
        if task.status().can_transition_to(TaskStatus::Interrupted) {
            task.transition_to(
                TaskStatus::Interrupted,
                format!("crash detected: {}", context.reason),
                &*self.clock,
            )?;
        }
        self.tasks.update(&task).await?;
        self.hooks.save(&hook).await?;
        info!(
            %task_id,
            crash_type = ?context.crash_type,
            action = %context.recommended_action,
            reason = %context.reason,
            "crash diagnosed"
        );
        Ok(Some(context))
    }

    /// Diagnoses every live hook that has no active writer.
    ///
    /// # Errors
    ///
    /// Returns the first error other than a held lease.
    pub async fn recover_all(
        &self,
        terminated_by_signal: bool,
    ) -> EngineResult<Vec<(TaskId, RecoveryContext)>> {
        let mut recovered = Vec::new();
        for hook in self.hooks.list().await? {
            if hook.is_terminal() {
                continue;
            }
            let task_id = hook.task_id();
            match self.recover(task_id, terminated_by_signal).await {
                Ok(Some(context)) => recovered.push((task_id, context)),
                Ok(None) => {}
                Err(EngineError::Lock(LockError::Held(_))) => {
                    debug!(%task_id, "task has an active writer; not recovering");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(recovered)
    }

    /// Applies the recommended action of a recovering hook.
    ///
    /// Retry actions and skips return the hook to
    /// [`HookState::StepPending`] and the task to running from any status
    /// that allows it; a manual recommendation hands the task to a human.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRunnable`] unless the hook is recovering,
    /// [`EngineError::NoDiagnosis`] when it carries no diagnosis, and
    /// persistence or state-machine errors.
    pub async fn apply_recommendation(&self, task_id: TaskId) -> EngineResult<RecoveryAction> {
        let _lease = self.locks.acquire(task_id)?;
        let mut hook = self.hooks.load(task_id).await?;
        let mut task = self.tasks.load(task_id).await?;
        if hook.state() != HookState::Recovering {
            return Err(EngineError::NotRunnable {
                task_id,
                operation: "apply a recovery recommendation",
                status: task.status(),
                hook_state: hook.state(),
            });
        }
        let context = hook
            .recovery()
            .cloned()
            .ok_or(EngineError::NoDiagnosis(task_id))?;
        let action = context.recommended_action;

        match action {
            RecoveryAction::RetryStep | RecoveryAction::RetryFromCheckpoint => {
                if !task.is_finished() {
                    task.reset_current_step(&*self.clock)?;
                }
                self.resume(&mut task, &mut hook, action).await?;
            }
            RecoveryAction::SkipStep => {
                if !task.is_finished() {
                    task.skip_current_step("skipped during recovery", &*self.clock)?;
                }
                self.resume(&mut task, &mut hook, action).await?;
            }
            RecoveryAction::Manual => {
                hook.resolve_recovery(HookState::AwaitingHuman, action.as_str(), &*self.clock)?;
                self.hooks.save(&hook).await?;
                self.tasks.update(&task).await?;
            }
        }
        info!(
            %task_id,
            %action,
            checkpoint_id = ?context.checkpoint_id,
            "recovery recommendation applied"
        );
        Ok(action)
    }

    async fn resume(
        &self,
        task: &mut Task,
        hook: &mut Hook,
        action: RecoveryAction,
    ) -> EngineResult<()> {
        hook.resolve_recovery(HookState::StepPending, action.as_str(), &*self.clock)?;
        if task.status() != TaskStatus::Running
            && task.status().can_transition_to(TaskStatus::Running)
        {
            task.transition_to(
                TaskStatus::Running,
                format!("recovered: {action}"),
                &*self.clock,
            )?;
        }
        self.tasks.update(task).await?;
        self.hooks.save(hook).await?;
        Ok(())
    }

    fn report_orphans(&self, task_id: TaskId, pids: &[u32]) {
        for &pid in pids {
            if self.signaller.is_alive(pid) {
                warn!(%task_id, pid, "stale validation PID is alive; left for an operator");
            } else {
                debug!(%task_id, pid, "stale validation PID has exited");
            }
        }
    }
}

/// A hook waiting on a human whose task sits in an attention status was
/// parked on purpose, not interrupted.
fn is_parked(task: &Task, hook: &Hook) -> bool {
    hook.state() == HookState::AwaitingHuman
        && (task.status().needs_attention() || task.status() == TaskStatus::Interrupted)
}

fn current_step_idempotent(task: &Task) -> bool {
    task.current()
        .is_some_and(|step| step.definition().idempotent)
}
