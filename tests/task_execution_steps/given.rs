//! Given steps for task execution BDD scenarios.

use super::world::{ExecutionWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::given;
use waymark::task::domain::{StepDefinition, StepType};
use waymark::task::services::CreateTaskRequest;

fn create_task(world: &mut ExecutionWorld, step: StepDefinition) -> Result<(), eyre::Report> {
    let request = CreateTaskRequest::new("parser", "feature", "Add span tracking").with_step(step);
    let (task, _) = run_async(world.engine.create(request)).wrap_err("create scenario task")?;
    world.task_id = Some(task.id());
    Ok(())
}

#[given(r#"a task with an AI step validated by "{command}""#)]
fn task_with_validated_ai_step(
    world: &mut ExecutionWorld,
    command: String,
) -> Result<(), eyre::Report> {
    let step = StepDefinition::new("implement", StepType::Ai)
        .wrap_err("build AI step")?
        .with_commands(vec![command]);
    create_task(world, step)
}

#[given(r#"a task with a human step "{name}""#)]
fn task_with_human_step(world: &mut ExecutionWorld, name: String) -> Result<(), eyre::Report> {
    let step = StepDefinition::new(name, StepType::Human).wrap_err("build human step")?;
    create_task(world, step)
}
