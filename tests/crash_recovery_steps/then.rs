//! Then steps for crash recovery BDD scenarios.

use super::world::{RecoveryWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::then;
use waymark::hook::domain::RecoveryContext;
use waymark::hook::ports::HookRepository;
use waymark::task::domain::TaskStatus;
use waymark::task::ports::TaskRepository;

fn diagnosis(world: &RecoveryWorld) -> Result<&RecoveryContext, eyre::Report> {
    world
        .diagnosis
        .as_ref()
        .ok_or_else(|| eyre::eyre!("task was not diagnosed"))
}

#[then(r#"the hook state is "{state}""#)]
fn hook_state_is(world: &RecoveryWorld, state: String) -> Result<(), eyre::Report> {
    let hook = run_async(world.hooks.load(world.task_id()?)).wrap_err("load hook")?;
    if hook.state().as_str() != state {
        return Err(eyre::eyre!(
            "expected hook state {state}, found {}",
            hook.state()
        ));
    }
    Ok(())
}

#[then(r#"the task status is "{status}""#)]
fn task_status_is(world: &RecoveryWorld, status: String) -> Result<(), eyre::Report> {
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

#[then(r#"the crash type is "{crash_type}""#)]
fn crash_type_is(world: &RecoveryWorld, crash_type: String) -> Result<(), eyre::Report> {
    let actual = serde_json::to_value(diagnosis(world)?.crash_type)?;
    if actual != serde_json::Value::String(crash_type.clone()) {
        return Err(eyre::eyre!("expected crash type {crash_type}, found {actual}"));
    }
    Ok(())
}

#[then(r#"the recommended action is "{action}""#)]
fn recommended_action_is(world: &RecoveryWorld, action: String) -> Result<(), eyre::Report> {
    let recommended = diagnosis(world)?.recommended_action;
    if recommended.as_str() != action {
        return Err(eyre::eyre!(
            "expected recommendation {action}, found {recommended}"
        ));
    }
    Ok(())
}

#[then("the diagnosis lists stale process {pid:u32}")]
fn diagnosis_lists_stale_process(world: &RecoveryWorld, pid: u32) -> Result<(), eyre::Report> {
    let stale = &diagnosis(world)?.stale_pids;
    if !stale.contains(&pid) {
        return Err(eyre::eyre!("expected stale PID {pid}, found {stale:?}"));
    }
    Ok(())
}

#[then("process {pid:u32} has not been signalled")]
fn process_not_signalled(world: &RecoveryWorld, pid: u32) -> Result<(), eyre::Report> {
    let signaller = world
        .signaller
        .as_ref()
        .ok_or_else(|| eyre::eyre!("orchestrator has not restarted"))?;
    if signaller.killed().contains(&pid) {
        return Err(eyre::eyre!("process {pid} was killed"));
    }
    Ok(())
}

#[then("the task was not diagnosed")]
fn task_not_diagnosed(world: &RecoveryWorld) -> Result<(), eyre::Report> {
    if let Some(context) = &world.diagnosis {
        return Err(eyre::eyre!("unexpected diagnosis: {}", context.reason));
    }
    Ok(())
}
