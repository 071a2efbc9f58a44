//! Checkpoint capture against a mocked version-control inspector.

use crate::hook::adapters::memory::InMemoryHookRepository;
use crate::hook::domain::{CheckpointTrigger, GitSnapshot, Hook};
use crate::hook::ports::{HookRepository, MockVcsInspector, VcsError};
use crate::hook::services::{
    CheckpointError, CheckpointRequest, CheckpointService, FINGERPRINT_LEN, fingerprint,
};
use crate::task::domain::{TaskId, WorkspaceName};
use crate::test_support::ManualClock;
use rstest::rstest;
use std::sync::Arc;

fn hook(clock: &ManualClock) -> Hook {
    Hook::new(
        TaskId::new(),
        WorkspaceName::new("parser").expect("valid workspace"),
        clock,
    )
}

fn vcs_returning(result: Result<GitSnapshot, VcsError>) -> MockVcsInspector {
    let mut vcs = MockVcsInspector::new();
    vcs.expect_snapshot()
        .times(1)
        .returning(move |_| result.clone());
    vcs
}

#[rstest]
fn fingerprints_are_truncated_sha256() {
    let value = fingerprint(b"hello");

    assert_eq!(value.len(), FINGERPRINT_LEN);
    assert_eq!(value, "2cf24dba5fb0a30e");
}

#[rstest]
#[tokio::test]
async fn create_snapshots_git_and_files_then_saves() {
    let temp = tempfile::tempdir().expect("tempdir");
    std::fs::write(temp.path().join("lib.rs"), b"hello").expect("write file");
    let clock = Arc::new(ManualClock::at_epoch());
    let repository = Arc::new(InMemoryHookRepository::new());
    let vcs = vcs_returning(Ok(GitSnapshot {
        branch: "feature/parser".to_owned(),
        commit: "abc123".to_owned(),
        dirty: true,
    }));
    let service = CheckpointService::new(Arc::clone(&repository), Arc::new(vcs), Arc::clone(&clock));
    let mut hook = hook(&clock);

    let request = CheckpointRequest::new("implement", 0, CheckpointTrigger::PostCommit, "after commit")
        .with_workdir(temp.path())
        .with_artifacts(vec!["artifacts/plan.md".to_owned()])
        .with_files(vec!["lib.rs".to_owned(), "gone.rs".to_owned()]);
    let id = service.create(&mut hook, request).await.expect("checkpoint");

    let stored = repository
        .load(hook.task_id())
        .await
        .expect("hook saved");
    let checkpoint = stored.checkpoint(id).expect("checkpoint stored");
    assert_eq!(checkpoint.git.as_ref().map(|git| git.dirty), Some(true));
    assert_eq!(checkpoint.artifacts, vec!["artifacts/plan.md"]);
    let present = checkpoint.files.first().expect("present file");
    assert!(present.exists);
    assert_eq!(present.size, 5);
    assert_eq!(present.content_hash, fingerprint(b"hello"));
    let missing = checkpoint.files.get(1).expect("missing file");
    assert!(!missing.exists);
    assert!(missing.content_hash.is_empty());
}

#[rstest]
#[tokio::test]
async fn vcs_failures_leave_the_hook_untouched() {
    let temp = tempfile::tempdir().expect("tempdir");
    let clock = Arc::new(ManualClock::at_epoch());
    let vcs = vcs_returning(Err(VcsError::Failed {
        command: "git rev-parse HEAD".to_owned(),
        status: "exit status: 128".to_owned(),
        stderr: "not a git repository".to_owned(),
    }));
    let service = CheckpointService::new(
        Arc::new(InMemoryHookRepository::new()),
        Arc::new(vcs),
        Arc::clone(&clock),
    );
    let mut hook = hook(&clock);
    let before = hook.clone();

    let request = CheckpointRequest::new("implement", 0, CheckpointTrigger::Manual, "manual")
        .with_workdir(temp.path());
    let result = service.create(&mut hook, request).await;

    assert!(matches!(result, Err(CheckpointError::Vcs(_))));
    assert_eq!(hook, before);
}

#[rstest]
#[tokio::test]
async fn requests_without_workdir_skip_git() {
    let clock = Arc::new(ManualClock::at_epoch());
    let mut vcs = MockVcsInspector::new();
    vcs.expect_snapshot().never();
    let service = CheckpointService::new(
        Arc::new(InMemoryHookRepository::new()),
        Arc::new(vcs),
        Arc::clone(&clock),
    );

    let checkpoint = service
        .capture(CheckpointRequest::new("loop", 2, CheckpointTrigger::Interval, "iteration 1"))
        .await
        .expect("capture");

    assert!(checkpoint.git.is_none());
    assert!(checkpoint.files.is_empty());
}
