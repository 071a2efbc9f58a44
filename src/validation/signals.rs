//! Process liveness checks and forced termination.

use thiserror::Error;

/// Errors raised while signalling a process.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignalError {
    /// The PID cannot be represented on this platform.
    #[error("invalid pid {0}")]
    InvalidPid(u32),

    /// The operating system refused the signal.
    #[error("failed to signal pid {pid}: {message}")]
    Refused {
        /// Target process.
        pid: u32,
        /// Error text.
        message: String,
    },

    /// Signalling is not available on this platform.
    #[error("process signalling is not supported on this platform")]
    Unsupported,
}

/// Checks and kills processes by PID.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessSignaller: Send + Sync {
    /// Returns whether a process with `pid` exists.
    fn is_alive(&self, pid: u32) -> bool;

    /// Forcibly terminates `pid`. Already-exited processes are not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError`] when the signal cannot be delivered.
    fn kill(&self, pid: u32) -> Result<(), SignalError>;
}

/// Signaller backed by POSIX signals.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessSignaller;

#[cfg(unix)]
impl ProcessSignaller for OsProcessSignaller {
    fn is_alive(&self, pid: u32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Some(raw) = positive_pid(pid) else {
            return false;
        };
        // Signal 0 performs the permission and existence checks only.
        matches!(kill(Pid::from_raw(raw), None), Ok(()) | Err(nix::errno::Errno::EPERM))
    }

    fn kill(&self, pid: u32) -> Result<(), SignalError> {
        use nix::errno::Errno;
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let raw = positive_pid(pid).ok_or(SignalError::InvalidPid(pid))?;
        match kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(errno) => Err(SignalError::Refused {
                pid,
                message: errno.desc().to_owned(),
            }),
        }
    }
}

/// PID 0 and negative values address process groups, never a single
/// process.
#[cfg(unix)]
fn positive_pid(pid: u32) -> Option<i32> {
    i32::try_from(pid).ok().filter(|raw| *raw > 0)
}

#[cfg(not(unix))]
impl ProcessSignaller for OsProcessSignaller {
    fn is_alive(&self, _pid: u32) -> bool {
        false
    }

    fn kill(&self, _pid: u32) -> Result<(), SignalError> {
        Err(SignalError::Unsupported)
    }
}
