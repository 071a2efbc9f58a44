//! Shared world state for task execution BDD scenarios.

use std::sync::Arc;

use crate::support::{
    ManualClock, RecordingSignaller, ScriptedAgent, agent_reply, collaborators,
};
use rstest::fixture;
use waymark::engine::adapters::InMemoryArtifactStore;
use waymark::engine::services::{EngineSettings, StepReport, TaskEngine};
use waymark::hook::adapters::memory::InMemoryHookRepository;
use waymark::looping::adapters::memory::InMemoryLoopStateStore;
use waymark::storage::InMemoryLockProvider;
use waymark::task::adapters::memory::InMemoryTaskRepository;
use waymark::task::domain::TaskId;
use waymark::validation::ProcessRegistry;

/// Engine type used by the BDD world.
pub type ExecutionEngine = TaskEngine<
    InMemoryTaskRepository,
    InMemoryHookRepository,
    InMemoryLoopStateStore,
    ManualClock,
>;

/// Scenario world for task execution behaviour tests.
pub struct ExecutionWorld {
    pub engine: ExecutionEngine,
    pub tasks: Arc<InMemoryTaskRepository>,
    pub hooks: Arc<InMemoryHookRepository>,
    pub task_id: Option<TaskId>,
    pub last_report: Option<StepReport>,
    _workdir: tempfile::TempDir,
}

impl ExecutionWorld {
    /// Creates a world whose agent answers every prompt once.
    #[must_use]
    pub fn new() -> Self {
        let workdir = tempfile::tempdir().expect("tempdir");
        let clock = Arc::new(ManualClock::at_epoch());
        let tasks = Arc::new(InMemoryTaskRepository::new());
        let hooks = Arc::new(InMemoryHookRepository::new());
        let agent = Arc::new(ScriptedAgent::replying([Ok(agent_reply(
            "implemented the change",
            &["src/lib.rs"],
        ))]));
        let engine = TaskEngine::new(
            Arc::clone(&tasks),
            Arc::clone(&hooks),
            Arc::new(InMemoryLoopStateStore::new()),
            ProcessRegistry::new(),
            collaborators(
                agent,
                Arc::new(InMemoryArtifactStore::new()),
                Arc::new(RecordingSignaller::default()),
                Arc::new(InMemoryLockProvider::new()),
            ),
            EngineSettings::new(workdir.path()),
            clock,
        );

        Self {
            engine,
            tasks,
            hooks,
            task_id: None,
            last_report: None,
            _workdir: workdir,
        }
    }

    /// Returns the task the scenario created.
    pub fn task_id(&self) -> Result<TaskId, eyre::Report> {
        self.task_id
            .ok_or_else(|| eyre::eyre!("missing created task in scenario world"))
    }
}

impl Default for ExecutionWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> ExecutionWorld {
    ExecutionWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
