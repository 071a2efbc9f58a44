//! Tests for validation command execution and PID bookkeeping.

use super::{CommandSpec, ProcessRegistry, RunOutcome, ValidationRunner};
use crate::task::adapters::memory::InMemoryTaskRepository;
use crate::task::domain::{
    StepDefinition, StepType, Task, TaskConfig, TaskDraft, TaskId, TaskStatus, WorkspaceName,
};
use crate::task::ports::TaskRepository;
use mockable::DefaultClock;
use rstest::{fixture, rstest};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

struct Harness {
    repository: Arc<InMemoryTaskRepository>,
    runner: ValidationRunner<InMemoryTaskRepository, DefaultClock>,
    task: Task,
    workdir: tempfile::TempDir,
}

#[fixture]
async fn harness() -> Harness {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let task = Task::new(
        TaskDraft {
            workspace: WorkspaceName::new("validation").expect("valid workspace"),
            template: "check".to_owned(),
            description: "run checks".to_owned(),
            steps: vec![StepDefinition::new("check", StepType::Validation).expect("valid step")],
            config: TaskConfig::default(),
        },
        &DefaultClock,
    )
    .expect("valid task");
    repository.store(&task).await.expect("store");
    Harness {
        runner: ValidationRunner::new(
            Arc::clone(&repository),
            ProcessRegistry::new(),
            Arc::new(DefaultClock),
        ),
        repository,
        task,
        workdir: tempfile::tempdir().expect("tempdir"),
    }
}

fn spec(harness: &Harness, command: &str, timeout: Duration) -> CommandSpec {
    CommandSpec::new(command, harness.workdir.path(), timeout)
}

#[rstest]
fn registry_tracks_pids_per_task() {
    let registry = ProcessRegistry::new();
    let first = TaskId::new();
    let second = TaskId::new();

    assert!(registry.add(first, 10));
    assert!(!registry.add(first, 10));
    assert!(registry.add(first, 11));
    assert!(registry.add(second, 20));
    assert!(registry.remove(first, 10));
    assert!(!registry.remove(first, 10));

    assert_eq!(registry.pids(first), vec![11]);
    assert_eq!(registry.take(second), vec![20]);
    assert!(registry.pids(second).is_empty());
}

#[cfg(unix)]
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn successful_command_captures_output_and_clears_pid(#[future] harness: Harness) {
    let mut harness = harness.await;
    let spec = spec(&harness, "echo hello; echo oops >&2", Duration::from_secs(10));

    let run = harness
        .runner
        .run(&mut harness.task, &spec, &CancellationToken::new())
        .await
        .expect("run");

    assert!(run.succeeded());
    assert_eq!(run.outcome, RunOutcome::Exited);
    assert_eq!(run.stdout, "hello\n");
    assert_eq!(run.stderr, "oops\n");
    assert!(run.pid.is_some());
    assert!(run.completed_at >= run.started_at);
    assert!(harness.task.running_validation_pids().is_empty());
    let stored = harness.repository.load(harness.task.id()).await.expect("load");
    assert!(stored.running_validation_pids().is_empty());
    assert!(harness.runner.registry().pids(harness.task.id()).is_empty());
}

#[cfg(unix)]
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn non_zero_exit_is_reported_not_raised(#[future] harness: Harness) {
    let mut harness = harness.await;
    let spec = spec(&harness, "exit 3", Duration::from_secs(10));

    let run = harness
        .runner
        .run(&mut harness.task, &spec, &CancellationToken::new())
        .await
        .expect("run");

    assert!(!run.succeeded());
    assert_eq!(run.exit_code, Some(3));
    assert_eq!(run.failure_message().as_deref(), Some("`exit 3` exited with code 3"));
}

#[cfg(unix)]
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn slow_command_is_killed_at_timeout(#[future] harness: Harness) {
    let mut harness = harness.await;
    let spec = spec(&harness, "exec sleep 30", Duration::from_millis(200));

    let run = harness
        .runner
        .run(&mut harness.task, &spec, &CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(run.outcome, RunOutcome::TimedOut);
    assert_eq!(run.exit_code, None);
    assert_eq!(run.receipt_exit_code(), -1);
    assert!(harness.task.running_validation_pids().is_empty());
}

#[cfg(unix)]
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancellation_kills_the_command(#[future] harness: Harness) {
    let mut harness = harness.await;
    let spec = spec(&harness, "exec sleep 30", Duration::from_secs(30));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let run = harness
        .runner
        .run(&mut harness.task, &spec, &cancel)
        .await
        .expect("run");

    assert_eq!(run.outcome, RunOutcome::Cancelled);
    assert!(run.duration_ms < 30_000);
    assert!(harness.task.running_validation_pids().is_empty());
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn missing_working_directory_fails_to_spawn(#[future] harness: Harness) {
    let mut harness = harness.await;
    let spec = CommandSpec::new(
        "echo unreachable",
        harness.workdir.path().join("missing"),
        Duration::from_secs(1),
    );

    let result = harness
        .runner
        .run(&mut harness.task, &spec, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(super::ValidationError::Spawn { .. })));
    assert!(harness.task.running_validation_pids().is_empty());
}

#[cfg(unix)]
#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn abandoned_task_is_not_overwritten_when_the_command_ends(#[future] harness: Harness) {
    let mut harness = harness.await;
    let spec = spec(&harness, "exec sleep 1", Duration::from_secs(10));
    let task_id = harness.task.id();
    let repository = Arc::clone(&harness.repository);
    let abandon = async move {
        for _ in 0..200 {
            let mut stored = repository.load(task_id).await.expect("load");
            if !stored.running_validation_pids().is_empty() {
                stored.drain_validation_pids(&DefaultClock);
                stored
                    .transition_to(TaskStatus::Abandoned, "stopped", &DefaultClock)
                    .expect("abandon");
                repository.update(&stored).await.expect("update");
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("validation PID was never recorded");
    };

    let never_cancel = CancellationToken::new();
    let (result, ()) = tokio::join!(
        harness
            .runner
            .run(&mut harness.task, &spec, &never_cancel),
        abandon
    );

    assert!(matches!(
        result,
        Err(super::ValidationError::Abandoned(id)) if id == task_id
    ));
    let stored = harness.repository.load(task_id).await.expect("load");
    assert_eq!(stored.status(), TaskStatus::Abandoned);
    assert!(stored.running_validation_pids().is_empty());
    assert!(harness.runner.registry().pids(task_id).is_empty());
}
