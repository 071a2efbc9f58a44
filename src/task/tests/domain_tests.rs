//! Domain-focused tests for task construction and step progress.

use crate::task::domain::{
    StepDefinition, StepResult, StepStatus, StepType, Task, TaskConfig, TaskDomainError,
    TaskDraft, TaskStatus, WorkspaceName,
};
use crate::test_support::ManualClock;
use chrono::Duration;
use mockable::Clock;
use rstest::{fixture, rstest};

#[fixture]
fn clock() -> ManualClock {
    ManualClock::at_epoch()
}

fn step(name: &str, step_type: StepType) -> StepDefinition {
    StepDefinition::new(name, step_type).expect("valid step")
}

fn draft(steps: Vec<StepDefinition>) -> TaskDraft {
    TaskDraft {
        workspace: WorkspaceName::new("feature-login").expect("valid workspace"),
        template: "task".to_owned(),
        description: "Add login form".to_owned(),
        steps,
        config: TaskConfig::default(),
    }
}

#[fixture]
fn task(clock: ManualClock) -> (Task, ManualClock) {
    let task = Task::new(
        draft(vec![
            step("implement", StepType::Ai).with_max_attempts(2),
            step("validate", StepType::Validation),
        ]),
        &clock,
    )
    .expect("valid task");
    (task, clock)
}

#[rstest]
#[case("feature-login")]
#[case("a")]
#[case("fix_42")]
fn workspace_names_accept_lowercase_identifiers(#[case] raw: &str) {
    assert_eq!(WorkspaceName::new(raw).expect("valid").as_str(), raw);
}

#[rstest]
#[case("Feature", TaskDomainError::InvalidWorkspaceName("Feature".to_owned()))]
#[case("a/b", TaskDomainError::InvalidWorkspaceName("a/b".to_owned()))]
#[case("   ", TaskDomainError::EmptyWorkspaceName)]
fn workspace_names_reject_other_input(#[case] raw: &str, #[case] expected: TaskDomainError) {
    assert_eq!(WorkspaceName::new(raw), Err(expected));
}

#[rstest]
fn workspace_names_reject_overlong_values() {
    let raw = "a".repeat(WorkspaceName::MAX_LEN + 1);
    assert!(matches!(
        WorkspaceName::new(raw),
        Err(TaskDomainError::InvalidWorkspaceName(_))
    ));
}

#[rstest]
fn new_task_is_pending_at_first_step(task: (Task, ManualClock)) {
    let (task, _) = task;
    assert_eq!(task.status(), TaskStatus::Pending);
    assert_eq!(task.current_step(), 0);
    assert_eq!(task.created_at(), task.updated_at());
    assert!(task.transitions().is_empty());
    assert!(
        task.steps()
            .iter()
            .all(|step| step.status() == StepStatus::Pending && step.attempts() == 0)
    );
}

#[rstest]
fn task_requires_steps_and_template(clock: ManualClock) {
    assert_eq!(
        Task::new(draft(Vec::new()), &clock),
        Err(TaskDomainError::NoSteps)
    );
    let mut blank_template = draft(vec![step("implement", StepType::Ai)]);
    blank_template.template = "  ".to_owned();
    assert_eq!(
        Task::new(blank_template, &clock),
        Err(TaskDomainError::EmptyTemplateName)
    );
}

#[rstest]
fn transitions_append_audit_records(task: (Task, ManualClock)) {
    let (mut task, clock) = task;
    clock.advance(Duration::seconds(5));

    task.transition_to(TaskStatus::Running, "start", &clock)
        .expect("pending -> running");

    assert_eq!(task.status(), TaskStatus::Running);
    let [transition] = task.transitions() else {
        panic!("expected one transition");
    };
    assert_eq!(transition.from, TaskStatus::Pending);
    assert_eq!(transition.to, TaskStatus::Running);
    assert_eq!(transition.reason, "start");
    assert!(!transition.operator_override);
    assert_eq!(task.updated_at(), clock.utc());
}

#[rstest]
fn transitions_outside_the_table_are_rejected(task: (Task, ManualClock)) {
    let (mut task, clock) = task;
    let result = task.transition_to(TaskStatus::Completed, "skip ahead", &clock);

    assert_eq!(
        result,
        Err(TaskDomainError::InvalidStateTransition {
            task_id: task.id(),
            from: TaskStatus::Pending,
            to: TaskStatus::Completed,
        })
    );
    assert_eq!(task.status(), TaskStatus::Pending);
    assert!(task.transitions().is_empty());
}

#[rstest]
fn terminal_tasks_only_change_by_override(task: (Task, ManualClock)) {
    let (mut task, clock) = task;
    task.transition_to(TaskStatus::Abandoned, "dropped", &clock)
        .expect("pending -> abandoned");

    let result = task.transition_to(TaskStatus::Running, "resume", &clock);
    assert_eq!(
        result,
        Err(TaskDomainError::TerminalStatus {
            task_id: task.id(),
            status: TaskStatus::Abandoned,
        })
    );

    task.override_status(TaskStatus::Running, "operator resumed", &clock);
    assert_eq!(task.status(), TaskStatus::Running);
    let last = task.transitions().last().expect("override recorded");
    assert!(last.operator_override);
    assert_eq!(last.from, TaskStatus::Abandoned);
}

#[rstest]
fn attempts_stop_at_the_limit(task: (Task, ManualClock)) {
    let (mut task, clock) = task;

    assert_eq!(task.begin_step_attempt(&clock), Ok(1));
    task.record_attempt_failure(
        StepResult::failure(0, "implement", "agent crashed", clock.utc()),
        &clock,
    )
    .expect("record failure");
    assert_eq!(task.current().map(|step| step.status()), Some(StepStatus::Pending));
    assert_eq!(task.current().and_then(|step| step.error()), Some("agent crashed"));

    assert_eq!(task.begin_step_attempt(&clock), Ok(2));
    assert_eq!(
        task.begin_step_attempt(&clock),
        Err(TaskDomainError::RetryLimitExceeded {
            step: "implement".to_owned(),
            limit: 2,
        })
    );
    assert_eq!(task.step_results().len(), 1);
}

#[rstest]
fn completing_steps_advances_but_never_past_the_end(task: (Task, ManualClock)) {
    let (mut task, clock) = task;
    let now = clock.utc();

    task.begin_step_attempt(&clock).expect("attempt");
    task.complete_current_step(StepResult::success(0, "implement", now), &clock)
        .expect("complete first");
    task.skip_current_step("not needed", &clock)
        .expect("skip second");

    assert!(task.is_finished());
    assert_eq!(task.current_step(), task.steps().len());
    assert!(task.current().is_none());
    assert_eq!(task.steps()[0].status(), StepStatus::Completed);
    assert_eq!(task.steps()[1].status(), StepStatus::Skipped);
    assert_eq!(
        task.begin_step_attempt(&clock),
        Err(TaskDomainError::NoRemainingSteps(task.id()))
    );
    assert_eq!(
        task.skip_current_step("again", &clock),
        Err(TaskDomainError::NoRemainingSteps(task.id()))
    );
}

#[rstest]
fn failing_a_step_keeps_the_cursor(task: (Task, ManualClock)) {
    let (mut task, clock) = task;
    let now = clock.utc();
    task.begin_step_attempt(&clock).expect("attempt");

    task.fail_current_step(StepResult::failure(0, "implement", "boom", now), &clock)
        .expect("fail");

    assert_eq!(task.current_step(), 0);
    assert_eq!(task.steps()[0].status(), StepStatus::Failed);
    assert_eq!(task.steps()[0].error(), Some("boom"));
    assert_eq!(task.steps()[0].completed_at(), Some(now));

    task.reset_current_step(&clock).expect("reset");
    assert_eq!(task.steps()[0].status(), StepStatus::Pending);
    assert_eq!(task.steps()[0].attempts(), 1);
}

#[rstest]
fn validation_pids_are_tracked_as_a_set(task: (Task, ManualClock)) {
    let (mut task, clock) = task;

    assert!(task.register_validation_pid(4242, &clock));
    assert!(!task.register_validation_pid(4242, &clock));
    assert!(task.register_validation_pid(4343, &clock));
    assert!(task.release_validation_pid(4242, &clock));
    assert!(!task.release_validation_pid(4242, &clock));

    assert_eq!(task.drain_validation_pids(&clock), vec![4343]);
    assert!(task.running_validation_pids().is_empty());
}

#[rstest]
#[case(StepType::Git, TaskStatus::GhFailed)]
#[case(StepType::Ci, TaskStatus::CiFailed)]
#[case(StepType::Human, TaskStatus::AwaitingApproval)]
#[case(StepType::Ai, TaskStatus::ValidationFailed)]
#[case(StepType::Validation, TaskStatus::ValidationFailed)]
#[case(StepType::Loop, TaskStatus::ValidationFailed)]
fn step_failures_map_to_attention_statuses(
    #[case] step_type: StepType,
    #[case] expected: TaskStatus,
) {
    assert_eq!(step_type.failure_status(), expected);
    assert!(expected.needs_attention());
}

#[rstest]
fn task_json_round_trips(task: (Task, ManualClock)) {
    let (mut task, clock) = task;
    task.transition_to(TaskStatus::Running, "start", &clock)
        .expect("transition");
    task.register_validation_pid(7, &clock);

    let json = serde_json::to_string(&task).expect("serialize");
    let decoded: Task = serde_json::from_str(&json).expect("deserialize");

    assert_eq!(decoded, task);
    assert!(json.contains("\"running_validation_pids\":[7]"));
}

#[rstest]
fn cloned_tasks_are_independent(task: (Task, ManualClock)) {
    let (original, clock) = task;
    let mut copy = original.clone();

    copy.transition_to(TaskStatus::Running, "start", &clock)
        .expect("transition");
    copy.register_validation_pid(1, &clock);

    assert_eq!(original.status(), TaskStatus::Pending);
    assert!(original.transitions().is_empty());
    assert!(original.running_validation_pids().is_empty());
}
