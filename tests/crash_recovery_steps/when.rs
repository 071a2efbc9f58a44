//! When steps for crash recovery BDD scenarios.

use super::world::{RecoveryWorld, run_async};
use eyre::WrapErr;
use rstest_bdd_macros::when;

#[when("the orchestrator restarts")]
fn orchestrator_restarts(world: &mut RecoveryWorld) -> Result<(), eyre::Report> {
    world.restart();
    let recovery = world
        .recovery
        .as_ref()
        .ok_or_else(|| eyre::eyre!("recovery service not built"))?;
    let recovered = run_async(recovery.recover_all(false)).wrap_err("recover tasks")?;
    let task_id = world.task_id()?;
    world.diagnosis = recovered
        .into_iter()
        .find_map(|(id, context)| (id == task_id).then_some(context));
    Ok(())
}

#[when("the recommendation is applied")]
fn recommendation_applied(world: &mut RecoveryWorld) -> Result<(), eyre::Report> {
    let recovery = world
        .recovery
        .as_ref()
        .ok_or_else(|| eyre::eyre!("recovery service not built"))?;
    run_async(recovery.apply_recommendation(world.task_id()?))
        .wrap_err("apply recommendation")?;
    Ok(())
}
