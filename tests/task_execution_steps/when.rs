//! When steps for task execution BDD scenarios.

use super::world::{ExecutionWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;
use tokio_util::sync::CancellationToken;

#[when("the task is started")]
fn task_is_started(world: &mut ExecutionWorld) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    run_async(world.engine.start(task_id)).wrap_err("start task")?;
    Ok(())
}

#[when("the next step is run")]
fn next_step_is_run(world: &mut ExecutionWorld) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    let report = run_async(world.engine.run_next_step(task_id, &CancellationToken::new()))
        .wrap_err("run next step")?;
    world.last_report = Some(report);
    Ok(())
}

#[when("the task is run to completion")]
fn task_is_run_to_completion(world: &mut ExecutionWorld) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    let report = run_async(
        world
            .engine
            .run_to_completion(task_id, &CancellationToken::new()),
    )
    .wrap_err("run task to completion")?;
    world.last_report = Some(report);
    Ok(())
}

#[when(r#"the step is approved with "{note}""#)]
fn step_is_approved(world: &mut ExecutionWorld, note: String) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    run_async(world.engine.approve(task_id, &note)).wrap_err("approve step")?;
    Ok(())
}

#[when("the task is abandoned")]
fn task_is_abandoned(world: &mut ExecutionWorld) -> Result<(), eyre::Report> {
    let task_id = world.task_id()?;
    run_async(world.engine.abandon(task_id, "superseded")).wrap_err("abandon task")?;
    Ok(())
}
