//! Shared world state for crash recovery BDD scenarios.

use std::sync::Arc;

use crate::support::{ManualClock, RecordingSignaller};
use rstest::fixture;
use waymark::engine::services::RecoveryService;
use waymark::hook::adapters::memory::InMemoryHookRepository;
use waymark::hook::domain::RecoveryContext;
use waymark::hook::services::RecoveryDiagnoser;
use waymark::storage::InMemoryLockProvider;
use waymark::task::adapters::memory::InMemoryTaskRepository;
use waymark::task::domain::TaskId;
use waymark::validation::ProcessSignaller;

/// Recovery service type used by the BDD world.
pub type TestRecovery =
    RecoveryService<InMemoryTaskRepository, InMemoryHookRepository, ManualClock>;

/// Scenario world for crash recovery behaviour tests.
///
/// Given steps write the records a dead process would have left; the
/// recovery service is only built once the orchestrator "restarts".
pub struct RecoveryWorld {
    pub clock: Arc<ManualClock>,
    pub tasks: Arc<InMemoryTaskRepository>,
    pub hooks: Arc<InMemoryHookRepository>,
    pub alive_pids: Vec<u32>,
    pub signaller: Option<Arc<RecordingSignaller>>,
    pub recovery: Option<TestRecovery>,
    pub task_id: Option<TaskId>,
    pub diagnosis: Option<RecoveryContext>,
}

impl RecoveryWorld {
    /// Creates a world with empty stores.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: Arc::new(ManualClock::at_epoch()),
            tasks: Arc::new(InMemoryTaskRepository::new()),
            hooks: Arc::new(InMemoryHookRepository::new()),
            alive_pids: Vec::new(),
            signaller: None,
            recovery: None,
            task_id: None,
            diagnosis: None,
        }
    }

    /// Builds the recovery service a restarted orchestrator would use.
    pub fn restart(&mut self) {
        let signaller = Arc::new(RecordingSignaller::with_alive(&self.alive_pids));
        self.recovery = Some(RecoveryService::new(
            Arc::clone(&self.tasks),
            Arc::clone(&self.hooks),
            Arc::new(InMemoryLockProvider::new()),
            Arc::clone(&signaller) as Arc<dyn ProcessSignaller>,
            RecoveryDiagnoser::default(),
            Arc::clone(&self.clock),
        ));
        self.signaller = Some(signaller);
    }

    /// Returns the task the scenario crashed.
    pub fn task_id(&self) -> Result<TaskId, eyre::Report> {
        self.task_id
            .ok_or_else(|| eyre::eyre!("missing crashed task in scenario world"))
    }
}

impl Default for RecoveryWorld {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture that creates a new scenario world.
#[fixture]
pub fn world() -> RecoveryWorld {
    RecoveryWorld::default()
}

/// Runs an async operation within sync step definitions.
pub fn run_async<T>(future: impl std::future::Future<Output = T>) -> T {
    tokio::task::block_in_place(|| tokio::runtime::Handle::current().block_on(future))
}
