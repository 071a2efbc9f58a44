//! Receipt issuance, verification and durable recording.

use crate::hook::adapters::{memory::InMemoryHookRepository, signer::HmacReceiptSigner};
use crate::hook::domain::{Hook, HookDomainError, HookState};
use crate::hook::ports::{HookRepository, MockReceiptSigner, Signature, SigningError};
use crate::hook::services::{
    HookService, HookServiceError, LedgerError, ReceiptLedger, sha256_hex, verify_receipt,
};
use crate::task::domain::{StepDefinition, StepType, Task, TaskConfig, TaskDraft, WorkspaceName};
use crate::test_support::ManualClock;
use crate::validation::{CommandRun, RunOutcome};
use chrono::Duration;
use mockable::Clock;
use rstest::{fixture, rstest};
use std::sync::Arc;

#[fixture]
fn signer() -> Arc<HmacReceiptSigner> {
    Arc::new(HmacReceiptSigner::new("local", b"test-secret".to_vec()).expect("valid key"))
}

fn run(clock: &ManualClock, exit_code: Option<i32>, outcome: RunOutcome) -> CommandRun {
    let started_at = clock.utc();
    CommandRun {
        command: "cargo test".to_owned(),
        pid: Some(4321),
        exit_code,
        outcome,
        started_at,
        completed_at: started_at + Duration::milliseconds(1500),
        duration_ms: 1500,
        stdout: "test result: ok".to_owned(),
        stderr: String::new(),
    }
}

fn task(clock: &ManualClock) -> Task {
    Task::new(
        TaskDraft {
            workspace: WorkspaceName::new("parser").expect("valid workspace"),
            template: "bugfix".to_owned(),
            description: "Fix parser".to_owned(),
            steps: vec![StepDefinition::new("check", StepType::Validation).expect("valid step")],
            config: TaskConfig::default(),
        },
        clock,
    )
    .expect("valid task")
}

#[rstest]
fn issued_receipts_hash_output_and_verify(signer: Arc<HmacReceiptSigner>) {
    let clock = ManualClock::at_epoch();
    let ledger = ReceiptLedger::new(Arc::clone(&signer));
    let command = run(&clock, Some(0), RunOutcome::Exited);

    let receipt = ledger.issue("check", &command).expect("issue");

    assert_eq!(receipt.step_name(), "check");
    assert_eq!(receipt.exit_code(), 0);
    assert_eq!(receipt.key_id(), "local");
    assert_eq!(receipt.stdout_hash(), sha256_hex(b"test result: ok"));
    assert_eq!(receipt.stdout_hash().len(), 64);
    let check = verify_receipt(&receipt, b"test result: ok", b"", &*signer).expect("verify");
    assert!(check.is_valid());
}

#[rstest]
fn killed_commands_are_receipted_with_minus_one(signer: Arc<HmacReceiptSigner>) {
    let clock = ManualClock::at_epoch();
    let ledger = ReceiptLedger::new(signer);

    let receipt = ledger
        .issue("check", &run(&clock, None, RunOutcome::TimedOut))
        .expect("issue");

    assert_eq!(receipt.exit_code(), -1);
}

#[rstest]
fn tampered_output_or_payload_fails_verification(signer: Arc<HmacReceiptSigner>) {
    let clock = ManualClock::at_epoch();
    let receipt = ReceiptLedger::new(Arc::clone(&signer))
        .issue("check", &run(&clock, Some(0), RunOutcome::Exited))
        .expect("issue");

    let altered_output =
        verify_receipt(&receipt, b"test result: FAILED", b"", &*signer).expect("verify");
    assert!(!altered_output.hashes_match);
    assert!(altered_output.signature_valid);

    let mut encoded = serde_json::to_value(&receipt).expect("encode");
    encoded["exit_code"] = serde_json::json!(1);
    let forged = serde_json::from_value(encoded).expect("decode");
    let altered_payload =
        verify_receipt(&forged, b"test result: ok", b"", &*signer).expect("verify");
    assert!(altered_payload.hashes_match);
    assert!(!altered_payload.signature_valid);
}

#[rstest]
fn signing_failures_surface_as_ledger_errors() {
    let clock = ManualClock::at_epoch();
    let mut signer = MockReceiptSigner::new();
    signer.expect_key_id().return_const("hsm".to_owned());
    signer
        .expect_sign()
        .times(1)
        .returning(|_| Err(SigningError::InvalidKey("hsm offline".to_owned())));
    let ledger = ReceiptLedger::new(Arc::new(signer));

    let result = ledger.issue("check", &run(&clock, Some(0), RunOutcome::Exited));

    assert!(matches!(result, Err(LedgerError::Signing(SigningError::InvalidKey(_)))));
}

#[rstest]
fn payload_key_comes_from_the_signer() {
    let clock = ManualClock::at_epoch();
    let mut signer = MockReceiptSigner::new();
    signer.expect_key_id().return_const("rotated".to_owned());
    signer.expect_sign().returning(|_| {
        Ok(Signature {
            signature: "c2ln".to_owned(),
            key_id: "rotated".to_owned(),
        })
    });

    let receipt = ReceiptLedger::new(Arc::new(signer))
        .issue("check", &run(&clock, Some(0), RunOutcome::Exited))
        .expect("issue");

    assert_eq!(receipt.key_id(), "rotated");
    assert_eq!(receipt.signature(), "c2ln");
}

#[rstest]
fn a_signature_under_another_key_is_refused() {
    let clock = ManualClock::at_epoch();
    let mut signer = MockReceiptSigner::new();
    signer.expect_key_id().return_const("2026-q3".to_owned());
    signer.expect_sign().returning(|_| {
        Ok(Signature {
            signature: "c2ln".to_owned(),
            key_id: "2026-q4".to_owned(),
        })
    });

    let result = ReceiptLedger::new(Arc::new(signer))
        .issue("check", &run(&clock, Some(0), RunOutcome::Exited));

    assert!(matches!(
        result,
        Err(LedgerError::KeyMismatch { ref expected, ref actual })
            if expected == "2026-q3" && actual == "2026-q4"
    ));
}

#[rstest]
#[tokio::test]
async fn hook_service_persists_receipts_and_transitions(signer: Arc<HmacReceiptSigner>) {
    let clock = Arc::new(ManualClock::at_epoch());
    let repository = Arc::new(InMemoryHookRepository::new());
    let service = HookService::new(Arc::clone(&repository), Arc::clone(&clock));
    let task = task(&clock);
    let mut hook: Hook = service.create_for(&task).await.expect("create");

    let receipt = ReceiptLedger::new(signer)
        .issue("check", &run(&clock, Some(0), RunOutcome::Exited))
        .expect("issue");
    service
        .append_receipt(&mut hook, receipt.clone())
        .await
        .expect("append");
    service
        .transition(&mut hook, HookState::StepPending, "ready")
        .await
        .expect("transition");

    let stored = repository.load(task.id()).await.expect("stored");
    assert_eq!(stored.receipts(), &[receipt]);
    assert_eq!(stored.state(), HookState::StepPending);

    let rejected = service
        .transition(&mut hook, HookState::StepValidating, "skip")
        .await;
    assert!(matches!(
        rejected,
        Err(HookServiceError::Domain(HookDomainError::InvalidTransition { .. }))
    ));
}
