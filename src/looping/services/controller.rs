//! Bounded iteration with circuit breakers.

use crate::looping::{
    domain::{LoopConfig, LoopExitReason, LoopState},
    ports::{IterationRunner, LoopCheckpointer, LoopStateStore, LoopStoreError},
};
use crate::task::domain::TaskId;
use mockable::Clock;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors that abort a loop instead of ending it.
#[derive(Debug, Error)]
pub enum LoopError {
    /// Checkpoints or state saves kept failing, so progress is no longer
    /// recoverable.
    #[error("loop checkpoint circuit open after {failures} consecutive failures: {last_error}")]
    CheckpointCircuitOpen {
        /// Consecutive failures observed.
        failures: u32,
        /// Most recent failure.
        last_error: String,
    },

    /// Saved state could not be loaded.
    #[error(transparent)]
    Store(#[from] LoopStoreError),
}

/// How a loop ended, with everything it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    /// Why the loop stopped.
    pub exit_reason: LoopExitReason,
    /// Final state, including every iteration result.
    pub state: LoopState,
}

/// Drives a loop step until a limit, a signal or a breaker stops it.
pub struct LoopController<I, S, K, C>
where
    I: IterationRunner + ?Sized,
    S: LoopStateStore + ?Sized,
    K: LoopCheckpointer + ?Sized,
    C: Clock + Send + Sync,
{
    runner: Arc<I>,
    store: Arc<S>,
    checkpointer: Arc<K>,
    clock: Arc<C>,
}

impl<I, S, K, C> LoopController<I, S, K, C>
where
    I: IterationRunner + ?Sized,
    S: LoopStateStore + ?Sized,
    K: LoopCheckpointer + ?Sized,
    C: Clock + Send + Sync,
{
    /// Creates a controller.
    #[must_use]
    pub const fn new(runner: Arc<I>, store: Arc<S>, checkpointer: Arc<K>, clock: Arc<C>) -> Self {
        Self {
            runner,
            store,
            checkpointer,
            clock,
        }
    }

    /// Resumes the saved state of a loop step, or starts it fresh.
    ///
    /// A loop that already stopped returns its recorded outcome without
    /// running again.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::Store`] when saved state cannot be read, and
    /// the errors of [`LoopController::run`].
    pub async fn start_or_resume(
        &self,
        task_id: TaskId,
        step_index: usize,
        step_name: &str,
        config: &LoopConfig,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, LoopError> {
        let state = match self.store.load(task_id, step_index).await? {
            Some(state) => {
                info!(%task_id, step_index, iteration = state.current_iteration, "resuming loop");
                state
            }
            None => LoopState::new(
                task_id,
                step_index,
                step_name,
                config.max_iterations,
                self.clock.utc(),
            ),
        };
        if let Some(exit_reason) = state.exit_reason {
            return Ok(LoopOutcome { exit_reason, state });
        }
        self.run(state, config, cancel).await
    }

    /// Runs iterations from `state` until the loop stops.
    ///
    /// Circuit breakers and limits end the loop with an `Ok` outcome;
    /// only sustained checkpoint failure is an error.
    ///
    /// # Errors
    ///
    /// Returns [`LoopError::CheckpointCircuitOpen`] once consecutive
    /// checkpoint failures exceed the configured threshold.
    pub async fn run(
        &self,
        mut state: LoopState,
        config: &LoopConfig,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, LoopError> {
        loop {
            if cancel.is_cancelled() {
                return Ok(self.finish(state, LoopExitReason::ContextCanceled).await);
            }
            if config.is_exhausted(state.current_iteration) {
                return Ok(self.finish(state, LoopExitReason::MaxIterationsReached).await);
            }

            state.current_iteration += 1;
            state.updated_at = self.clock.utc();
            let result = self.runner.run_iteration(&state, config, cancel).await;
            debug!(
                task_id = %state.task_id,
                iteration = result.iteration,
                files_changed = result.files_changed.len(),
                error = result.error.as_deref(),
                "loop iteration finished"
            );
            state.record_iteration(result, self.clock.utc());

            let checkpoint_error = self.checkpoint(&mut state).await;
            if cancel.is_cancelled() {
                return Ok(self.finish(state, LoopExitReason::ContextCanceled).await);
            }
            if let Some(last_error) = checkpoint_error
                && state.consecutive_checkpoint_failures > config.checkpoint_failure_threshold
            {
                warn!(
                    task_id = %state.task_id,
                    failures = state.consecutive_checkpoint_failures,
                    "loop checkpoint circuit open"
                );
                return Err(LoopError::CheckpointCircuitOpen {
                    failures: state.consecutive_checkpoint_failures,
                    last_error,
                });
            }

            if let Some(exit_reason) = evaluate(&state, config) {
                if exit_reason.is_circuit_breaker() {
                    warn!(task_id = %state.task_id, %exit_reason, "loop circuit breaker tripped");
                }
                return Ok(self.finish(state, exit_reason).await);
            }
        }
    }

    /// Checkpoints and saves `state`, returning the error text when either
    /// write fails. The state is saved even when the checkpoint failed, so
    /// a resumed loop never repeats an iteration that already ran.
    async fn checkpoint(&self, state: &mut LoopState) -> Option<String> {
        let previous = state.consecutive_checkpoint_failures;
        let mut failure = match self.checkpointer.checkpoint(state).await {
            Ok(()) => {
                state.last_checkpoint_at = Some(self.clock.utc());
                state.consecutive_checkpoint_failures = 0;
                None
            }
            Err(err) => {
                state.consecutive_checkpoint_failures = previous + 1;
                Some(err.to_string())
            }
        };
        if let Err(err) = self.store.save(state).await {
            state.consecutive_checkpoint_failures = previous + 1;
            failure.get_or_insert_with(|| err.to_string());
        }
        if let Some(error) = &failure {
            warn!(
                task_id = %state.task_id,
                failures = state.consecutive_checkpoint_failures,
                %error,
                "loop checkpoint failed"
            );
        }
        failure
    }

    async fn finish(&self, mut state: LoopState, exit_reason: LoopExitReason) -> LoopOutcome {
        state.exit_reason = Some(exit_reason);
        state.updated_at = self.clock.utc();
        if let Err(err) = self.store.save(&state).await {
            warn!(task_id = %state.task_id, %err, "final loop state not saved");
        }
        info!(
            task_id = %state.task_id,
            iterations = state.current_iteration,
            %exit_reason,
            "loop finished"
        );
        LoopOutcome { exit_reason, state }
    }
}

/// Applies the exit checks that follow cancellation and checkpointing, in
/// priority order.
fn evaluate(state: &LoopState, config: &LoopConfig) -> Option<LoopExitReason> {
    let last = state.last_iteration()?;
    if last.exit_signal {
        Some(LoopExitReason::ExitSignal)
    } else if config
        .success_condition
        .as_ref()
        .is_some_and(|condition| last.error.is_none() && condition.is_met(&last.step_results))
    {
        Some(LoopExitReason::ConditionMet)
    } else if state.stagnation_count > config.stagnation_threshold {
        Some(LoopExitReason::CircuitBreakerStagnation)
    } else if state.consecutive_errors > config.error_threshold {
        Some(LoopExitReason::CircuitBreakerErrors)
    } else if config.is_exhausted(state.current_iteration) {
        Some(LoopExitReason::MaxIterationsReached)
    } else {
        None
    }
}
