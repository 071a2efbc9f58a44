//! Given steps for crash recovery BDD scenarios.

use std::sync::Arc;

use super::world::{RecoveryWorld, run_async};
use chrono::Duration;
use eyre::WrapErr;
use mockable::Clock;
use rstest_bdd_macros::given;
use waymark::hook::domain::{
    CheckpointId, CheckpointTrigger, Hook, HookState, StepCheckpoint, StepContext,
};
use waymark::hook::ports::HookRepository;
use waymark::task::domain::{StepDefinition, StepResult, StepType, Task, TaskStatus};
use waymark::task::ports::TaskRepository;
use waymark::task::services::{CreateTaskRequest, TaskLifecycleService};

const STEP: &str = "implement";

#[given("a task whose validation command timed out before the process died")]
fn validation_timed_out(world: &mut RecoveryWorld) -> Result<(), eyre::Report> {
    seed_validation_timeout(world)
}

/// Writes the records of a process that died while validation timed out.
fn seed_validation_timeout(world: &mut RecoveryWorld) -> Result<(), eyre::Report> {
    let clock = &*world.clock;
    let step = StepDefinition::new(STEP, StepType::Ai)
        .wrap_err("build step")?
        .with_commands(vec!["cargo test".to_owned()]);
    let lifecycle = TaskLifecycleService::new(Arc::clone(&world.tasks), Arc::clone(&world.clock));
    let request = CreateTaskRequest::new("parser", "bugfix", "Fix the lexer").with_step(step);
    let mut task: Task = run_async(lifecycle.create(request)).wrap_err("create task")?;

    task.transition_to(TaskStatus::Running, "task started", clock)?;
    task.begin_step_attempt(clock)?;
    task.transition_to(TaskStatus::Validating, "validating step", clock)?;
    run_async(world.tasks.update(&task)).wrap_err("store task")?;

    let mut hook = Hook::new(task.id(), task.workspace().clone(), clock);
    hook.transition(HookState::StepPending, "task_started", clock)?;
    let context = StepContext::new(STEP, 0, StepType::Ai, 1, 60, clock.utc());
    hook.start_step(context, "step_started", clock)?;
    hook.transition(HookState::StepValidating, "validation_started", clock)?;
    world.clock.advance(Duration::seconds(90));
    hook.update_step(clock, |ctx, now| ctx.record_output("cargo test timed out", now))?;
    run_async(world.hooks.save(&hook)).wrap_err("store hook")?;

    world.task_id = Some(task.id());
    Ok(())
}

#[given("a task whose validation failed for good")]
fn validation_failed_for_good(world: &mut RecoveryWorld) -> Result<(), eyre::Report> {
    seed_validation_timeout(world)?;
    let clock = &*world.clock;
    let task_id = world.task_id()?;
    let mut task = run_async(world.tasks.load(task_id)).wrap_err("load task")?;
    let error = "`cargo test` exited with code 101";
    task.fail_current_step(StepResult::failure(0, STEP, error, clock.utc()), clock)?;
    task.transition_to(TaskStatus::ValidationFailed, error, clock)?;
    run_async(world.tasks.update(&task)).wrap_err("store task")?;

    let mut hook = run_async(world.hooks.load(task_id)).wrap_err("load hook")?;
    hook.transition(HookState::AwaitingHuman, "step_failed", clock)?;
    run_async(world.hooks.save(&hook)).wrap_err("store hook")?;
    Ok(())
}

#[given("the hook holds a checkpoint from the same step")]
fn hook_holds_checkpoint(world: &mut RecoveryWorld) -> Result<(), eyre::Report> {
    let clock = &*world.clock;
    let mut hook = run_async(world.hooks.load(world.task_id()?)).wrap_err("load hook")?;
    hook.add_checkpoint(
        StepCheckpoint {
            checkpoint_id: CheckpointId::new(),
            created_at: clock.utc(),
            step_name: STEP.to_owned(),
            step_index: 0,
            description: "agent finished".to_owned(),
            trigger: CheckpointTrigger::StepComplete,
            git: None,
            artifacts: Vec::new(),
            files: Vec::new(),
        },
        clock,
    );
    run_async(world.hooks.save(&hook)).wrap_err("store hook")?;
    Ok(())
}

#[given("validation process {pid:u32} is still running")]
fn validation_process_running(world: &mut RecoveryWorld, pid: u32) -> Result<(), eyre::Report> {
    let mut task = run_async(world.tasks.load(world.task_id()?)).wrap_err("load task")?;
    task.register_validation_pid(pid, &*world.clock);
    run_async(world.tasks.update(&task)).wrap_err("store task")?;
    world.alive_pids.push(pid);
    Ok(())
}
