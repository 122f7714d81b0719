//! Termination analysis for worker processes.
//!
//! Maps a `WaitStatus` onto the ways a worker can end: a clean exit after a
//! stop command, a failed computation, a panic, or a signal.

use super::spawn::{EXIT_FAILED, EXIT_OK, EXIT_PANICKED};
use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;

/// Reason why a worker process terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminationReason {
    /// Loop observed a stop command and exited normally.
    Stopped,
    /// The computation unit returned an error (or produced a result with the
    /// wrong layout).
    ComputationFailed,
    /// The computation unit panicked.
    Panicked,
    /// Exit with some other status code.
    Exited(i32),
    /// Killed by SIGKILL (forced shutdown or the OOM killer).
    Killed,
    /// Killed by another signal.
    Signaled(Signal),
    /// Process is still running.
    StillAlive,
    /// Unknown termination reason.
    Unknown,
}

impl TerminationReason {
    /// Check if this is a clean shutdown.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Stopped)
    }

    /// Check if the worker ended on its own because something went wrong.
    pub fn is_crash(&self) -> bool {
        matches!(
            self,
            Self::ComputationFailed | Self::Panicked | Self::Exited(_) | Self::Signaled(_)
        )
    }

    /// Get a human-readable description.
    pub fn description(&self) -> String {
        match self {
            Self::Stopped => "stopped cleanly".to_string(),
            Self::ComputationFailed => "computation failed".to_string(),
            Self::Panicked => "computation panicked".to_string(),
            Self::Exited(code) => format!("exited with code {}", code),
            Self::Killed => "killed (SIGKILL)".to_string(),
            Self::Signaled(sig) => format!("killed by signal {:?}", sig),
            Self::StillAlive => "still running".to_string(),
            Self::Unknown => "unknown reason".to_string(),
        }
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Analyze a `WaitStatus` to determine the termination reason.
pub fn analyze_wait_status(status: WaitStatus) -> TerminationReason {
    match status {
        WaitStatus::Exited(_, EXIT_OK) => TerminationReason::Stopped,
        WaitStatus::Exited(_, EXIT_FAILED) => TerminationReason::ComputationFailed,
        WaitStatus::Exited(_, EXIT_PANICKED) => TerminationReason::Panicked,
        WaitStatus::Exited(_, code) => TerminationReason::Exited(code),

        WaitStatus::Signaled(_, Signal::SIGKILL, _) => TerminationReason::Killed,
        WaitStatus::Signaled(_, signal, _) => TerminationReason::Signaled(signal),

        WaitStatus::StillAlive => TerminationReason::StillAlive,

        _ => TerminationReason::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Pid;

    #[test]
    fn test_exit_codes() {
        let pid = Pid::from_raw(1);
        assert_eq!(
            analyze_wait_status(WaitStatus::Exited(pid, 0)),
            TerminationReason::Stopped
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Exited(pid, 1)),
            TerminationReason::ComputationFailed
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Exited(pid, 101)),
            TerminationReason::Panicked
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Exited(pid, 3)),
            TerminationReason::Exited(3)
        );
    }

    #[test]
    fn test_signals() {
        let pid = Pid::from_raw(1);
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGKILL, false)),
            TerminationReason::Killed
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::Signaled(pid, Signal::SIGSEGV, true)),
            TerminationReason::Signaled(Signal::SIGSEGV)
        );
        assert_eq!(
            analyze_wait_status(WaitStatus::StillAlive),
            TerminationReason::StillAlive
        );
    }

    #[test]
    fn test_success_and_crash() {
        assert!(TerminationReason::Stopped.is_success());
        assert!(!TerminationReason::Stopped.is_crash());
        assert!(TerminationReason::Panicked.is_crash());
        assert!(TerminationReason::ComputationFailed.is_crash());
        assert!(!TerminationReason::Killed.is_crash());
        assert!(!TerminationReason::StillAlive.is_crash());
    }

    #[test]
    fn test_display() {
        assert_eq!(TerminationReason::Stopped.to_string(), "stopped cleanly");
        assert!(
            TerminationReason::Signaled(Signal::SIGTERM)
                .to_string()
                .contains("SIGTERM")
        );
    }
}
