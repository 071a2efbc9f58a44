//! CI failure routing capability.

/// Tells the engine whether CI results get their own failure statuses.
///
/// When configured, a failed or timed-out CI step moves the task to
/// `ci_failed` or `ci_timeout` and waits for a human. Otherwise CI steps
/// fail like any other step.
pub trait CiFailureHandling: Send + Sync {
    /// Returns whether CI failure handling is configured.
    fn is_configured(&self) -> bool;
}

/// Fixed answer for [`CiFailureHandling`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StaticCiFailureHandling(pub bool);

impl CiFailureHandling for StaticCiFailureHandling {
    fn is_configured(&self) -> bool {
        self.0
    }
}
