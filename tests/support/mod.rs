//! Collaborators shared by the integration suites.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use mockable::Clock;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use waymark::engine::ports::{
    AgentError, AgentRunner, AiRequest, AiResult, ArtifactStore, ExternalStepError,
    ExternalStepRunner, StaticCiFailureHandling, StepOutcome, StepRequest,
};
use waymark::engine::services::EngineCollaborators;
use waymark::hook::adapters::signer::HmacReceiptSigner;
use waymark::hook::domain::GitSnapshot;
use waymark::hook::ports::{VcsError, VcsInspector};
use waymark::looping::domain::{IterationResult, LoopConfig, LoopState};
use waymark::looping::ports::IterationRunner;
use waymark::storage::TaskLockProvider;
use waymark::validation::{ProcessSignaller, SignalError};

pub const SIGNING_KEY_ID: &str = "local";
pub const SIGNING_SECRET: &[u8] = b"integration-secret";

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn at_epoch() -> Self {
        let now = Utc
            .with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
            .single()
            .expect("valid instant");
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().expect("clock lock") += by;
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Agent that replays queued replies and records every request.
#[derive(Default)]
pub struct ScriptedAgent {
    replies: Mutex<VecDeque<Result<AiResult, AgentError>>>,
    requests: Mutex<Vec<AiRequest>>,
}

impl ScriptedAgent {
    pub fn replying(replies: impl IntoIterator<Item = Result<AiResult, AgentError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .map(|request| request.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn run(
        &self,
        request: AiRequest,
        _cancel: &CancellationToken,
    ) -> Result<AiResult, AgentError> {
        self.requests.lock().expect("requests lock").push(request);
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| Err(AgentError::Failed("no scripted reply left".to_owned())))
    }
}

pub fn agent_reply(output: &str, files: &[&str]) -> AiResult {
    AiResult {
        success: true,
        output: output.to_owned(),
        session_id: Some("session-7".to_owned()),
        duration_ms: 900,
        num_turns: 3,
        total_cost_usd: 0.05,
        files_changed: files.iter().map(|file| (*file).to_owned()).collect(),
    }
}

/// Agent that never answers, standing in for a process killed mid-step.
pub struct HangingAgent;

#[async_trait]
impl AgentRunner for HangingAgent {
    async fn run(
        &self,
        _request: AiRequest,
        _cancel: &CancellationToken,
    ) -> Result<AiResult, AgentError> {
        std::future::pending().await
    }
}

/// Refuses every external step.
pub struct NoExternalSteps;

#[async_trait]
impl ExternalStepRunner for NoExternalSteps {
    async fn run(
        &self,
        request: StepRequest,
        _cancel: &CancellationToken,
    ) -> Result<StepOutcome, ExternalStepError> {
        Err(ExternalStepError::Unsupported(request.step_type))
    }
}

/// Ends every loop on its first iteration.
pub struct SingleIteration;

#[async_trait]
impl IterationRunner for SingleIteration {
    async fn run_iteration(
        &self,
        state: &LoopState,
        _config: &LoopConfig,
        _cancel: &CancellationToken,
    ) -> IterationResult {
        let now = Utc::now();
        IterationResult {
            iteration: state.current_iteration,
            step_results: Vec::new(),
            files_changed: vec!["src/lib.rs".to_owned()],
            exit_signal: true,
            error: None,
            started_at: now,
            completed_at: now,
        }
    }
}

pub struct FixedVcs;

#[async_trait]
impl VcsInspector for FixedVcs {
    async fn snapshot(&self, _workdir: &Path) -> Result<GitSnapshot, VcsError> {
        Ok(GitSnapshot {
            branch: "waymark/parser".to_owned(),
            commit: "9fceb02".to_owned(),
            dirty: false,
        })
    }
}

/// Signaller that sees a fixed set of live pids and records kills.
#[derive(Default)]
pub struct RecordingSignaller {
    alive: Mutex<Vec<u32>>,
    killed: Mutex<Vec<u32>>,
}

impl RecordingSignaller {
    pub fn with_alive(pids: &[u32]) -> Self {
        Self {
            alive: Mutex::new(pids.to_vec()),
            killed: Mutex::default(),
        }
    }

    pub fn killed(&self) -> Vec<u32> {
        self.killed.lock().expect("killed lock").clone()
    }
}

impl ProcessSignaller for RecordingSignaller {
    fn is_alive(&self, pid: u32) -> bool {
        self.alive.lock().expect("alive lock").contains(&pid)
    }

    fn kill(&self, pid: u32) -> Result<(), SignalError> {
        self.alive.lock().expect("alive lock").retain(|live| *live != pid);
        self.killed.lock().expect("killed lock").push(pid);
        Ok(())
    }
}

pub fn signer() -> HmacReceiptSigner {
    HmacReceiptSigner::new(SIGNING_KEY_ID, SIGNING_SECRET.to_vec()).expect("valid key")
}

/// Wires collaborators around the given agent, store, signaller and locks.
pub fn collaborators(
    agent: Arc<dyn AgentRunner>,
    artifacts: Arc<dyn ArtifactStore>,
    signaller: Arc<dyn ProcessSignaller>,
    locks: Arc<dyn TaskLockProvider>,
) -> EngineCollaborators {
    EngineCollaborators {
        agent,
        external: Arc::new(NoExternalSteps),
        iterations: Arc::new(SingleIteration),
        artifacts,
        ci: Arc::new(StaticCiFailureHandling(false)),
        vcs: Arc::new(FixedVcs),
        signer: Arc::new(signer()),
        signaller,
        locks,
    }
}
