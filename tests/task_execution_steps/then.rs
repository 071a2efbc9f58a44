//! Then steps for task execution BDD scenarios.

use super::world::{ExecutionWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use waymark::engine::services::StepReport;
use waymark::hook::ports::HookRepository;
use waymark::task::domain::TaskStatus;
use waymark::task::ports::TaskRepository;

const fn report_kind(report: &StepReport) -> &'static str {
    match report {
        StepReport::Completed { .. } => "completed",
        StepReport::Retrying { .. } => "retrying",
        StepReport::Failed { .. } => "failed",
        StepReport::AwaitingHuman { .. } => "awaiting_human",
        StepReport::Cancelled { .. } => "cancelled",
        StepReport::TaskCompleted => "task_completed",
    }
}

#[then(r#"the step report is "{kind}""#)]
fn step_report_is(world: &ExecutionWorld, kind: String) -> Result<(), eyre::Report> {
    let report = world
        .last_report
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing step report"))?;
    if report_kind(report) != kind {
        return Err(eyre::eyre!("expected a {kind} report, got {report:?}"));
    }
    Ok(())
}

#[then(r#"the task status is "{status}""#)]
fn task_status_is(world: &ExecutionWorld, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    let task = run_async(world.tasks.load(world.task_id()?)).wrap_err("load task")?;
    if task.status() != expected {
        return Err(eyre::eyre!(
            "expected status {}, found {}",
            expected.as_str(),
            task.status().as_str()
        ));
    }
    Ok(())
}

#[then(r#"the hook state is "{state}""#)]
fn hook_state_is(world: &ExecutionWorld, state: String) -> Result<(), eyre::Report> {
    let hook = run_async(world.hooks.load(world.task_id()?)).wrap_err("load hook")?;
    if hook.state().as_str() != state {
        return Err(eyre::eyre!(
            "expected hook state {state}, found {}",
            hook.state()
        ));
    }
    Ok(())
}

#[then(r#"the hook history is "{states}""#)]
fn hook_history_is(world: &ExecutionWorld, states: String) -> Result<(), eyre::Report> {
    let hook = run_async(world.hooks.load(world.task_id()?)).wrap_err("load hook")?;
    let expected: Vec<&str> = states.split(',').map(str::trim).collect();
    let actual: Vec<&str> = hook
        .history()
        .iter()
        .map(|event| event.to_state.as_str())
        .collect();
    if actual != expected {
        return Err(eyre::eyre!("expected history {expected:?}, found {actual:?}"));
    }
    Ok(())
}

#[then("the hook holds {count:usize} receipt")]
fn hook_holds_receipts(world: &ExecutionWorld, count: usize) -> Result<(), eyre::Report> {
    let hook = run_async(world.hooks.load(world.task_id()?)).wrap_err("load hook")?;
    if hook.receipts().len() != count {
        return Err(eyre::eyre!(
            "expected {count} receipts, found {}",
            hook.receipts().len()
        ));
    }
    Ok(())
}
