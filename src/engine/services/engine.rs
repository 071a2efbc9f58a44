//! Step-by-step task execution.

use super::error::{EngineError, EngineResult};
use super::loop_step::HookLoopCheckpointer;
use super::prompt::PromptRenderer;
use crate::config::OrchestratorConfig;
use crate::engine::ports::{
    AgentError, AgentRunner, AiRequest, ArtifactStore, CiFailureHandling, CiVerdict,
    ExternalStepRunner, PermissionMode, StepOutcome, StepRequest,
};
use crate::hook::domain::{
    CheckpointTrigger, CrashType, Hook, HookState, RecoveryAction, RecoveryContext, StepContext,
};
use crate::hook::ports::{HookRepository, ReceiptSigner, VcsInspector};
use crate::hook::services::{CheckpointRequest, CheckpointService, HookService, ReceiptLedger};
use crate::looping::domain::{LoopConfig, LoopExitReason, LoopState};
use crate::looping::ports::{IterationRunner, LoopStateStore};
use crate::looping::services::{LoopController, LoopOutcome};
use crate::storage::TaskLockProvider;
use crate::task::domain::{
    StepDefinition, StepResult, StepType, Task, TaskDomainError, TaskId, TaskStatus,
};
use crate::task::ports::TaskRepository;
use crate::task::services::{CreateTaskRequest, TaskLifecycleService};
use crate::validation::{
    CommandSpec, ProcessRegistry, ProcessSignaller, RunOutcome, ValidationError, ValidationRunner,
};
use mockable::Clock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// External capabilities the engine calls out to.
#[derive(Clone)]
pub struct EngineCollaborators {
    /// Runs AI steps.
    pub agent: Arc<dyn AgentRunner>,
    /// Runs git, CI, design and verification steps.
    pub external: Arc<dyn ExternalStepRunner>,
    /// Runs one iteration of a loop step.
    pub iterations: Arc<dyn IterationRunner>,
    /// Stores step artifacts.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Decides how CI failures are routed.
    pub ci: Arc<dyn CiFailureHandling>,
    /// Reads working-tree state for checkpoints.
    pub vcs: Arc<dyn VcsInspector>,
    /// Signs validation receipts.
    pub signer: Arc<dyn ReceiptSigner>,
    /// Kills validation processes on abandon.
    pub signaller: Arc<dyn ProcessSignaller>,
    /// Grants single-writer leases.
    pub locks: Arc<dyn TaskLockProvider>,
}

/// Engine knobs that are not per task.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Working tree steps run in.
    pub workdir: PathBuf,
    /// Permission mode handed to agents.
    pub permission_mode: PermissionMode,
    /// Loop configuration for loop steps that carry none.
    pub loop_defaults: LoopConfig,
}

impl EngineSettings {
    /// Creates settings with default permission mode and loop limits.
    #[must_use]
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            permission_mode: PermissionMode::default(),
            loop_defaults: LoopConfig::default(),
        }
    }

    /// Creates settings from the orchestrator configuration.
    #[must_use]
    pub fn from_config(config: &OrchestratorConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            loop_defaults: config.loop_defaults.clone(),
            ..Self::new(workdir)
        }
    }

    /// Sets the agent permission mode.
    #[must_use]
    pub const fn with_permission_mode(mut self, mode: PermissionMode) -> Self {
        self.permission_mode = mode;
        self
    }
}

/// What one call to [`TaskEngine::run_next_step`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepReport {
    /// The step succeeded and the cursor moved on.
    Completed {
        /// Step index.
        step_index: usize,
        /// Step name.
        step_name: String,
    },
    /// The attempt failed; another attempt is allowed.
    Retrying {
        /// Step index.
        step_index: usize,
        /// Step name.
        step_name: String,
        /// Attempt that failed.
        attempt: u32,
        /// Failure description.
        error: String,
    },
    /// The step failed for good and the task needs attention.
    Failed {
        /// Step index.
        step_index: usize,
        /// Step name.
        step_name: String,
        /// Status the task moved to.
        status: TaskStatus,
        /// Failure description.
        error: String,
    },
    /// A human step is waiting for approval.
    AwaitingHuman {
        /// Step index.
        step_index: usize,
        /// Step name.
        step_name: String,
    },
    /// The run was cancelled mid-step.
    Cancelled {
        /// Step index.
        step_index: usize,
        /// Step name.
        step_name: String,
    },
    /// Every step was done; the task is complete.
    TaskCompleted,
}

/// Result of [`TaskEngine::abandon`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbandonReport {
    /// Validation processes that were killed.
    pub killed_pids: Vec<u32>,
    /// State the hook ended in.
    pub hook_state: HookState,
}

struct StepPlan {
    index: usize,
    attempt: u32,
    definition: StepDefinition,
    timeout: Duration,
}

impl StepPlan {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn failure(&self, error: impl Into<String>, now: chrono::DateTime<chrono::Utc>) -> StepResult {
        StepResult::failure(self.index, self.name(), error, now)
    }
}

enum Execution {
    Succeeded(StepResult, Option<CheckpointTrigger>),
    Failed(StepResult),
    Escalated(StepResult, TaskStatus),
    AwaitHuman,
    Cancelled,
}

/// Drives tasks through their steps, keeping the hook in lockstep.
///
/// Every mutating operation except [`TaskEngine::abandon`] holds the task's
/// lease for its whole duration.
pub struct TaskEngine<T, H, L, C>
where
    T: TaskRepository,
    H: HookRepository,
    L: LoopStateStore,
    C: Clock + Send + Sync,
{
    tasks: Arc<T>,
    hooks: Arc<H>,
    loops: Arc<L>,
    clock: Arc<C>,
    lifecycle: TaskLifecycleService<T, C>,
    hook_service: HookService<H, C>,
    validation: ValidationRunner<T, C>,
    checkpoints: Arc<CheckpointService<H, dyn VcsInspector, C>>,
    ledger: ReceiptLedger<dyn ReceiptSigner>,
    prompts: PromptRenderer,
    collaborators: EngineCollaborators,
    settings: EngineSettings,
}

impl<T, H, L, C> TaskEngine<T, H, L, C>
where
    T: TaskRepository,
    H: HookRepository,
    L: LoopStateStore,
    C: Clock + Send + Sync,
{
    /// Creates an engine.
    #[must_use]
    pub fn new(
        tasks: Arc<T>,
        hooks: Arc<H>,
        loops: Arc<L>,
        registry: ProcessRegistry,
        collaborators: EngineCollaborators,
        settings: EngineSettings,
        clock: Arc<C>,
    ) -> Self {
        Self {
            lifecycle: TaskLifecycleService::new(Arc::clone(&tasks), Arc::clone(&clock)),
            hook_service: HookService::new(Arc::clone(&hooks), Arc::clone(&clock)),
            validation: ValidationRunner::new(Arc::clone(&tasks), registry, Arc::clone(&clock)),
            checkpoints: Arc::new(CheckpointService::new(
                Arc::clone(&hooks),
                Arc::clone(&collaborators.vcs),
                Arc::clone(&clock),
            )),
            ledger: ReceiptLedger::new(Arc::clone(&collaborators.signer)),
            prompts: PromptRenderer::new(),
            tasks,
            hooks,
            loops,
            clock,
            collaborators,
            settings,
        }
    }

    /// Creates a pending task and its hook.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the request is invalid or either record
    /// cannot be stored.
    pub async fn create(&self, request: CreateTaskRequest) -> EngineResult<(Task, Hook)> {
        let task = self.lifecycle.create(request).await?;
        let hook = self.hook_service.create_for(&task).await?;
        Ok((task, hook))
    }

    /// Moves a pending task to running and its hook out of initialisation.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the lease is held, the records are
    /// missing or either state machine refuses.
    pub async fn start(&self, task_id: TaskId) -> EngineResult<(Task, Hook)> {
        let _lease = self.collaborators.locks.acquire(task_id)?;
        let (mut task, mut hook) = self.load(task_id).await?;
        task.transition_to(TaskStatus::Running, "task started", &*self.clock)?;
        hook.transition(HookState::StepPending, "task_started", &*self.clock)?;
        self.persist(&task, &hook).await?;
        info!(%task_id, "task started");
        Ok((task, hook))
    }

    /// Runs one attempt of the current step, or completes a task whose steps
    /// are all done.
    ///
    /// Errors the engine cannot handle are recorded as a diagnosis on the
    /// hook before they are returned.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRunnable`] unless the task is running with
    /// its hook at [`HookState::StepPending`], and any error that stopped
    /// the attempt.
    pub async fn run_next_step(
        &self,
        task_id: TaskId,
        cancel: &CancellationToken,
    ) -> EngineResult<StepReport> {
        let _lease = self.collaborators.locks.acquire(task_id)?;
        let (mut task, mut hook) = self.load(task_id).await?;
        if task.status() != TaskStatus::Running || hook.state() != HookState::StepPending {
            return Err(not_runnable(&task, &hook, "run a step"));
        }
        match self.advance(&mut task, &mut hook, cancel).await {
            Ok(report) => Ok(report),
            Err(err @ EngineError::Abandoned(_)) => Err(err),
            Err(err) => {
                self.record_failure(&task, &mut hook, &err).await;
                Err(err)
            }
        }
    }

    /// Runs steps until the task completes or stops for attention.
    ///
    /// # Errors
    ///
    /// Returns the first error of [`TaskEngine::run_next_step`].
    pub async fn run_to_completion(
        &self,
        task_id: TaskId,
        cancel: &CancellationToken,
    ) -> EngineResult<StepReport> {
        loop {
            let report = self.run_next_step(task_id, cancel).await?;
            if !matches!(
                report,
                StepReport::Completed { .. } | StepReport::Retrying { .. }
            ) {
                return Ok(report);
            }
        }
    }

    /// Approves the human step a task is waiting on.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotRunnable`] unless the task awaits approval
    /// of a human step.
    pub async fn approve(&self, task_id: TaskId, note: &str) -> EngineResult<Task> {
        let _lease = self.collaborators.locks.acquire(task_id)?;
        let (mut task, mut hook) = self.load(task_id).await?;
        let Some(step) = task.current().filter(|step| step.step_type() == StepType::Human) else {
            return Err(not_runnable(&task, &hook, "approve"));
        };
        if task.status() != TaskStatus::AwaitingApproval || hook.state() != HookState::AwaitingHuman
        {
            return Err(not_runnable(&task, &hook, "approve"));
        }
        let result =
            StepResult::success(task.current_step(), step.name(), self.clock.utc()).with_output(note);
        task.complete_current_step(result, &*self.clock)?;
        task.transition_to(TaskStatus::Running, format!("approved: {note}"), &*self.clock)?;
        hook.transition(HookState::StepPending, "approved", &*self.clock)?;
        hook.clear_step(&*self.clock);
        self.persist(&task, &hook).await?;
        info!(%task_id, "step approved");
        Ok(task)
    }

    /// Rejects a task that awaits approval.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when either state machine refuses.
    pub async fn reject(&self, task_id: TaskId, reason: &str) -> EngineResult<Task> {
        let _lease = self.collaborators.locks.acquire(task_id)?;
        let (mut task, mut hook) = self.load(task_id).await?;
        task.transition_to(TaskStatus::Rejected, reason, &*self.clock)?;
        hook.transition_with_details(
            HookState::Abandoned,
            "rejected",
            serde_json::json!({ "reason": reason }),
            &*self.clock,
        )?;
        self.persist(&task, &hook).await?;
        info!(%task_id, reason, "task rejected");
        Ok(task)
    }

    /// Gives the current step a fresh attempt budget and resumes the task.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] unless the hook is waiting on a human and the
    /// task can return to running.
    pub async fn retry_step(&self, task_id: TaskId, reason: &str) -> EngineResult<Task> {
        let _lease = self.collaborators.locks.acquire(task_id)?;
        let (mut task, mut hook) = self.load(task_id).await?;
        hook.transition(HookState::StepPending, "operator_retry", &*self.clock)?;
        task.rearm_current_step(&*self.clock)?;
        task.transition_to(TaskStatus::Running, format!("retry: {reason}"), &*self.clock)?;
        hook.clear_step(&*self.clock);
        self.persist(&task, &hook).await?;
        info!(%task_id, step = task.current_step(), "step retried by operator");
        Ok(task)
    }

    /// Skips the current step and resumes the task.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] unless the hook is waiting on a human and the
    /// task can return to running.
    pub async fn skip_step(&self, task_id: TaskId, reason: &str) -> EngineResult<Task> {
        let _lease = self.collaborators.locks.acquire(task_id)?;
        let (mut task, mut hook) = self.load(task_id).await?;
        hook.transition(HookState::StepPending, "operator_skip", &*self.clock)?;
        task.skip_current_step(reason, &*self.clock)?;
        task.transition_to(TaskStatus::Running, format!("skipped: {reason}"), &*self.clock)?;
        hook.clear_step(&*self.clock);
        self.persist(&task, &hook).await?;
        info!(%task_id, reason, "step skipped by operator");
        Ok(task)
    }

    /// Abandons a task from outside its writer.
    ///
    /// Does not take the lease: the writer may be blocked in a validation
    /// command, and killing that command is the point. The task moves to
    /// `abandoned` and the hook is retired before recorded PIDs are killed,
    /// so a writer woken by the kill finds the terminal records and stops
    /// without saving.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the records are missing, the task is
    /// already terminal or saving fails.
    pub async fn abandon(&self, task_id: TaskId, reason: &str) -> EngineResult<AbandonReport> {
        let (mut task, mut hook) = self.load(task_id).await?;
        let mut pids = task.drain_validation_pids(&*self.clock);
        for pid in self.validation.registry().take(task_id) {
            if !pids.contains(&pid) {
                pids.push(pid);
            }
        }

        task.transition_to(TaskStatus::Abandoned, reason, &*self.clock)?;
        if !hook.is_terminal() {
            let target = if hook.state().can_transition_to(HookState::Abandoned) {
                HookState::Abandoned
            } else {
                HookState::Failed
            };
            hook.transition_with_details(
                target,
                "abandoned",
                serde_json::json!({ "reason": reason, "validation_pids": pids }),
                &*self.clock,
            )?;
        }
        self.tasks.update(&task).await?;
        self.hooks.save(&hook).await?;

        let signaller = &self.collaborators.signaller;
        let mut killed_pids = Vec::new();
        for pid in pids {
            if !signaller.is_alive(pid) {
                continue;
            }
            match signaller.kill(pid) {
                Ok(()) => killed_pids.push(pid),
                Err(err) => warn!(%task_id, pid, %err, "failed to kill validation process"),
            }
        }
        info!(%task_id, reason, killed = killed_pids.len(), "task abandoned");
        Ok(AbandonReport {
            killed_pids,
            hook_state: hook.state(),
        })
    }

    async fn load(&self, task_id: TaskId) -> EngineResult<(Task, Hook)> {
        let task = self.tasks.load(task_id).await?;
        let hook = self.hooks.load(task_id).await?;
        Ok((task, hook))
    }

    /// Saves both records unless the task was abandoned behind our back.
    async fn persist(&self, task: &Task, hook: &Hook) -> EngineResult<()> {
        self.ensure_not_abandoned(task.id()).await?;
        self.tasks.update(task).await?;
        self.hooks.save(hook).await?;
        Ok(())
    }

    async fn save_hook(&self, hook: &Hook) -> EngineResult<()> {
        self.ensure_not_abandoned(hook.task_id()).await?;
        self.hooks.save(hook).await?;
        Ok(())
    }

    async fn ensure_not_abandoned(&self, task_id: TaskId) -> EngineResult<()> {
        if self.tasks.load(task_id).await?.status() == TaskStatus::Abandoned {
            warn!(%task_id, "task abandoned mid-step; discarding in-flight changes");
            return Err(EngineError::Abandoned(task_id));
        }
        Ok(())
    }

    async fn advance(
        &self,
        task: &mut Task,
        hook: &mut Hook,
        cancel: &CancellationToken,
    ) -> EngineResult<StepReport> {
        if task.is_finished() {
            task.transition_to(TaskStatus::Completed, "all steps finished", &*self.clock)?;
            hook.transition(HookState::Completed, "task_completed", &*self.clock)?;
            self.persist(task, hook).await?;
            info!(task_id = %task.id(), "task completed");
            return Ok(StepReport::TaskCompleted);
        }

        let Some(step) = task.current() else {
            return Err(TaskDomainError::NoRemainingSteps(task.id()).into());
        };
        let definition = step.definition().clone();
        let previous_attempts = step.attempts();
        let began = task.begin_step_attempt(&*self.clock);
        let attempt = match &began {
            Ok(attempt) => *attempt,
            Err(TaskDomainError::RetryLimitExceeded { .. }) => previous_attempts,
            Err(err) => return Err(err.clone().into()),
        };
        let timeout_secs = definition
            .timeout_secs
            .unwrap_or(task.config().timeout_secs);
        let plan = StepPlan {
            index: task.current_step(),
            attempt,
            timeout: Duration::from_secs(timeout_secs),
            definition,
        };

        let context = StepContext::new(
            plan.name(),
            plan.index,
            plan.definition.step_type,
            attempt,
            timeout_secs,
            self.clock.utc(),
        );
        hook.start_step(context, "step_started", &*self.clock)?;
        self.persist(task, hook).await?;
        info!(
            task_id = %task.id(),
            step = plan.name(),
            step_type = %plan.definition.step_type,
            attempt,
            "step started"
        );

        let execution = match began {
            Err(err) => Execution::Failed(plan.failure(err.to_string(), self.clock.utc())),
            Ok(_) => match plan.definition.step_type {
                StepType::Ai => self.run_ai(task, hook, &plan, cancel).await?,
                StepType::Validation => {
                    let base = StepResult::success(plan.index, plan.name(), self.clock.utc());
                    self.validate(task, hook, &plan, base, cancel).await?
                }
                StepType::Human => Execution::AwaitHuman,
                StepType::Loop => self.run_loop(task, hook, &plan, cancel).await?,
                StepType::Git | StepType::Ci | StepType::Sdd | StepType::Verify => {
                    self.run_external(task, hook, &plan, cancel).await?
                }
            },
        };
        // Agents, commands and loops can run for a long time.
        self.ensure_not_abandoned(task.id()).await?;
        self.conclude(task, hook, &plan, execution).await
    }

    async fn run_ai(
        &self,
        task: &mut Task,
        hook: &mut Hook,
        plan: &StepPlan,
        cancel: &CancellationToken,
    ) -> EngineResult<Execution> {
        let prompt = self.prompts.render(task, plan.attempt)?;
        hook.update_step(&*self.clock, |ctx, now| ctx.set_working_on("running agent", now))?;
        let request = AiRequest {
            prompt,
            context: None,
            agent: task.config().agent,
            model: task.config().model.clone(),
            timeout: plan.timeout,
            workdir: self.settings.workdir.clone(),
            permission_mode: self.settings.permission_mode,
        };

        let reply = match self.collaborators.agent.run(request, cancel).await {
            Err(AgentError::Cancelled) => return Ok(Execution::Cancelled),
            _ if cancel.is_cancelled() => return Ok(Execution::Cancelled),
            Err(err) => {
                return Ok(Execution::Failed(
                    plan.failure(err.to_string(), self.clock.utc()),
                ));
            }
            Ok(reply) => reply,
        };

        let artifact = artifact_name(plan.name(), plan.attempt);
        self.collaborators
            .artifacts
            .save(task.workspace(), task.id(), &artifact, reply.output.as_bytes())
            .await?;
        hook.update_step(&*self.clock, |ctx, now| {
            ctx.record_output(&reply.output, now);
            ctx.touch_files(reply.files_changed.iter().cloned(), now);
        })?;

        let mut result = StepResult::success(plan.index, plan.name(), self.clock.utc())
            .with_output(reply.output.clone())
            .with_files_changed(reply.files_changed.clone())
            .with_duration_ms(reply.duration_ms)
            .with_artifact(artifact);
        if let Some(session_id) = &reply.session_id {
            result = result.with_session_id(session_id.clone());
        }
        if !reply.success {
            result.success = false;
            result.error = Some("agent reported the work unfinished".to_owned());
            return Ok(Execution::Failed(result));
        }
        if plan.definition.commands.is_empty() {
            return Ok(Execution::Succeeded(result, None));
        }
        self.validate(task, hook, plan, result, cancel).await
    }

    /// Runs the step's validation commands, issuing a receipt for each.
    ///
    /// Stops at the first failing command. The in-flight flag is saved
    /// before each command starts.
    async fn validate(
        &self,
        task: &mut Task,
        hook: &mut Hook,
        plan: &StepPlan,
        mut result: StepResult,
        cancel: &CancellationToken,
    ) -> EngineResult<Execution> {
        if plan.definition.commands.is_empty() {
            return Ok(Execution::Succeeded(result, None));
        }
        hook.transition(HookState::StepValidating, "validation_started", &*self.clock)?;
        if task.status() == TaskStatus::Running {
            task.transition_to(TaskStatus::Validating, "validating step", &*self.clock)?;
        }
        self.persist(task, hook).await?;

        for command in &plan.definition.commands {
            hook.update_step(&*self.clock, |ctx, now| {
                ctx.set_working_on(command.clone(), now);
                ctx.set_validation_in_flight(true, now);
            })?;
            self.save_hook(hook).await?;

            let spec = CommandSpec::new(command.clone(), &self.settings.workdir, plan.timeout);
            let run = match self.validation.run(task, &spec, cancel).await {
                Ok(run) => run,
                Err(ValidationError::Abandoned(task_id)) => {
                    return Err(EngineError::Abandoned(task_id));
                }
                Err(err) => return Err(err.into()),
            };
            let receipt = self.ledger.issue(plan.name(), &run)?;
            hook.append_receipt(receipt, &*self.clock);
            hook.update_step(&*self.clock, |ctx, now| {
                ctx.set_validation_in_flight(false, now);
                ctx.record_output(&format!("{}{}", run.stdout, run.stderr), now);
            })?;
            self.save_hook(hook).await?;

            if run.outcome == RunOutcome::Cancelled {
                return Ok(Execution::Cancelled);
            }
            if let Some(message) = run.failure_message() {
                result.success = false;
                result.error = Some(message);
                result.output = format!("{}{}", run.stdout, run.stderr);
                return Ok(Execution::Failed(result));
            }
        }
        Ok(Execution::Succeeded(
            result,
            Some(CheckpointTrigger::PostValidation),
        ))
    }

    async fn run_external(
        &self,
        task: &Task,
        hook: &mut Hook,
        plan: &StepPlan,
        cancel: &CancellationToken,
    ) -> EngineResult<Execution> {
        let request = StepRequest {
            task_id: task.id(),
            workspace: task.workspace().clone(),
            step_name: plan.name().to_owned(),
            step_index: plan.index,
            step_type: plan.definition.step_type,
            attempt: plan.attempt,
            workdir: self.settings.workdir.clone(),
            timeout: plan.timeout,
            commands: plan.definition.commands.clone(),
        };
        let outcome = match self.collaborators.external.run(request, cancel).await {
            _ if cancel.is_cancelled() => return Ok(Execution::Cancelled),
            Ok(outcome) => outcome,
            Err(err) => {
                return Ok(Execution::Failed(
                    plan.failure(err.to_string(), self.clock.utc()),
                ));
            }
        };
        hook.update_step(&*self.clock, |ctx, now| {
            ctx.record_output(&outcome.output, now);
            ctx.touch_files(outcome.files_changed.iter().cloned(), now);
        })?;
        Ok(self.classify_external(plan, outcome))
    }

    fn classify_external(&self, plan: &StepPlan, outcome: StepOutcome) -> Execution {
        let now = self.clock.utc();
        if outcome.success {
            let result = StepResult::success(plan.index, plan.name(), now)
                .with_output(outcome.output)
                .with_files_changed(outcome.files_changed);
            return Execution::Succeeded(result, outcome.checkpoint);
        }
        let error = outcome
            .error
            .unwrap_or_else(|| format!("{} step failed", plan.definition.step_type));
        let result = plan
            .failure(error, now)
            .with_output(outcome.output)
            .with_files_changed(outcome.files_changed);
        let escalation = match outcome.ci_verdict {
            Some(CiVerdict::Failed) => Some(TaskStatus::CiFailed),
            Some(CiVerdict::TimedOut) => Some(TaskStatus::CiTimeout),
            Some(CiVerdict::Passed) | None => None,
        };
        match escalation {
            Some(status)
                if plan.definition.step_type == StepType::Ci
                    && self.collaborators.ci.is_configured() =>
            {
                Execution::Escalated(result, status)
            }
            _ => Execution::Failed(result),
        }
    }

    async fn run_loop(
        &self,
        task: &Task,
        hook: &mut Hook,
        plan: &StepPlan,
        cancel: &CancellationToken,
    ) -> EngineResult<Execution> {
        let config = plan
            .definition
            .loop_config
            .clone()
            .unwrap_or_else(|| self.settings.loop_defaults.clone());
        let checkpointer = Arc::new(HookLoopCheckpointer::new(
            Arc::clone(&self.hooks),
            Arc::clone(&self.checkpoints),
            self.settings.workdir.clone(),
        ));
        let controller = LoopController::new(
            Arc::clone(&self.collaborators.iterations),
            Arc::clone(&self.loops),
            checkpointer,
            Arc::clone(&self.clock),
        );

        // A finished loop from an earlier attempt starts over.
        let state = match self.loops.load(task.id(), plan.index).await? {
            Some(saved) if !saved.is_finished() => saved,
            _ => LoopState::new(
                task.id(),
                plan.index,
                plan.name(),
                config.max_iterations,
                self.clock.utc(),
            ),
        };
        let outcome = controller.run(state, &config, cancel).await?;
        *hook = self.hooks.load(task.id()).await?;
        Ok(self.classify_loop(plan, outcome))
    }

    fn classify_loop(&self, plan: &StepPlan, outcome: LoopOutcome) -> Execution {
        let mut files: Vec<String> = Vec::new();
        for iteration in &outcome.state.iterations {
            for file in &iteration.files_changed {
                if !files.contains(file) {
                    files.push(file.clone());
                }
            }
        }
        let summary = format!(
            "loop stopped after {} iterations: {}",
            outcome.state.current_iteration, outcome.exit_reason
        );
        let now = self.clock.utc();
        match outcome.exit_reason {
            LoopExitReason::ContextCanceled => Execution::Cancelled,
            reason if reason.is_circuit_breaker() => Execution::Failed(
                plan.failure(summary.clone(), now)
                    .with_output(summary)
                    .with_files_changed(files),
            ),
            _ => Execution::Succeeded(
                StepResult::success(plan.index, plan.name(), now)
                    .with_output(summary)
                    .with_files_changed(files),
                None,
            ),
        }
    }

    async fn conclude(
        &self,
        task: &mut Task,
        hook: &mut Hook,
        plan: &StepPlan,
        execution: Execution,
    ) -> EngineResult<StepReport> {
        let task_id = task.id();
        let step_name = plan.name().to_owned();
        let step_index = plan.index;
        match execution {
            Execution::Succeeded(result, trigger) => {
                let artifacts = result.artifacts.clone();
                self.checkpoint_step(hook, plan, trigger, artifacts).await?;
                task.complete_current_step(result, &*self.clock)?;
                if task.status() == TaskStatus::Validating {
                    task.transition_to(TaskStatus::Running, "validation passed", &*self.clock)?;
                }
                hook.transition(HookState::StepPending, "step_completed", &*self.clock)?;
                hook.clear_step(&*self.clock);
                self.persist(task, hook).await?;
                info!(%task_id, step = %step_name, "step completed");
                Ok(StepReport::Completed {
                    step_index,
                    step_name,
                })
            }
            Execution::Failed(result) => {
                let error = result.error.clone().unwrap_or_default();
                let retryable = task.current().is_some_and(|step| step.has_attempts_left());
                if retryable {
                    task.record_attempt_failure(result, &*self.clock)?;
                    if task.status() == TaskStatus::Validating {
                        task.transition_to(TaskStatus::Running, "retrying step", &*self.clock)?;
                    }
                    hook.transition(HookState::StepPending, "step_retry", &*self.clock)?;
                    hook.clear_step(&*self.clock);
                    self.persist(task, hook).await?;
                    warn!(%task_id, step = %step_name, attempt = plan.attempt, %error, "step attempt failed");
                    return Ok(StepReport::Retrying {
                        step_index,
                        step_name,
                        attempt: plan.attempt,
                        error,
                    });
                }
                let status = plan.definition.step_type.failure_status();
                self.fail_step(task, hook, result, status, "step_failed").await?;
                Ok(StepReport::Failed {
                    step_index,
                    step_name,
                    status,
                    error,
                })
            }
            Execution::Escalated(result, status) => {
                let error = result.error.clone().unwrap_or_default();
                self.fail_step(task, hook, result, status, "ci_failed").await?;
                Ok(StepReport::Failed {
                    step_index,
                    step_name,
                    status,
                    error,
                })
            }
            Execution::AwaitHuman => {
                hook.transition(HookState::AwaitingHuman, "awaiting_approval", &*self.clock)?;
                task.transition_to(
                    TaskStatus::AwaitingApproval,
                    format!("waiting for approval of {step_name}"),
                    &*self.clock,
                )?;
                self.persist(task, hook).await?;
                info!(%task_id, step = %step_name, "waiting for approval");
                Ok(StepReport::AwaitingHuman {
                    step_index,
                    step_name,
                })
            }
            Execution::Cancelled => {
                task.reset_current_step(&*self.clock)?;
                task.transition_to(TaskStatus::Interrupted, "cancelled", &*self.clock)?;
                hook.transition_with_details(
                    HookState::AwaitingHuman,
                    "cancelled",
                    serde_json::json!({ "step": step_name, "attempt": plan.attempt }),
                    &*self.clock,
                )?;
                self.persist(task, hook).await?;
                warn!(%task_id, step = %step_name, "step cancelled");
                Ok(StepReport::Cancelled {
                    step_index,
                    step_name,
                })
            }
        }
    }

    async fn fail_step(
        &self,
        task: &mut Task,
        hook: &mut Hook,
        result: StepResult,
        status: TaskStatus,
        trigger: &str,
    ) -> EngineResult<()> {
        let error = result.error.clone().unwrap_or_default();
        task.fail_current_step(result, &*self.clock)?;
        task.transition_to(status, error.clone(), &*self.clock)?;
        hook.transition_with_details(
            HookState::AwaitingHuman,
            trigger,
            serde_json::json!({ "error": error }),
            &*self.clock,
        )?;
        self.persist(task, hook).await?;
        warn!(task_id = %task.id(), %status, %error, "step failed");
        Ok(())
    }

    /// Takes the completion checkpoint. A step does not complete without
    /// one; the error leaves the step open for recovery.
    async fn checkpoint_step(
        &self,
        hook: &mut Hook,
        plan: &StepPlan,
        trigger: Option<CheckpointTrigger>,
        artifacts: Vec<String>,
    ) -> EngineResult<()> {
        let files = hook
            .current_step()
            .map(|ctx| ctx.files_touched.clone())
            .unwrap_or_default();
        let request = CheckpointRequest::new(
            plan.name(),
            plan.index,
            trigger.unwrap_or(CheckpointTrigger::StepComplete),
            format!("{} completed", plan.name()),
        )
        .with_workdir(self.settings.workdir.clone())
        .with_artifacts(artifacts)
        .with_files(files);
        if let Err(err) = self.checkpoints.create(hook, request).await {
            warn!(task_id = %hook.task_id(), step = plan.name(), %err, "checkpoint failed");
            return Err(err.into());
        }
        Ok(())
    }

    async fn record_failure(&self, task: &Task, hook: &mut Hook, err: &EngineError) {
        let context = RecoveryContext {
            detected_at: self.clock.utc(),
            crash_type: CrashType::Unknown,
            last_known_state: hook.state(),
            validation_in_flight: hook
                .current_step()
                .is_some_and(|ctx| ctx.validation_in_flight),
            stale_pids: task.running_validation_pids().iter().copied().collect(),
            recommended_action: RecoveryAction::Manual,
            reason: err.to_string(),
            checkpoint_id: None,
        };
        hook.record_diagnosis(context, &*self.clock);
        if let Err(save_err) = self.save_hook(hook).await {
            warn!(task_id = %hook.task_id(), %save_err, "failed to record diagnosis");
        }
    }
}

fn not_runnable(task: &Task, hook: &Hook, operation: &'static str) -> EngineError {
    EngineError::NotRunnable {
        task_id: task.id(),
        operation,
        status: task.status(),
        hook_state: hook.state(),
    }
}

fn artifact_name(step_name: &str, attempt: u32) -> String {
    let stem: String = step_name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '-' })
        .collect();
    format!("{stem}-attempt-{attempt}.md")
}
