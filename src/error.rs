//! Error types for shm-worker.

use crate::payload::Layout;
use crate::worker::TerminationReason;
use std::time::Duration;
use thiserror::Error;

/// Main error type for worker lifecycle and shared-memory operations.
///
/// Per-item conditions (a full or empty channel) are not represented here:
/// they are absorbed where they happen and never reach the caller.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Shared memory error: {0}")]
    Shm(#[from] nix::Error),

    #[error("Shared memory manager has been stopped")]
    ManagerStopped,

    #[error("Worker already started")]
    AlreadyStarted,

    #[error("Worker did not become ready within {timeout:?}")]
    LaunchTimeout { timeout: Duration },

    #[error("Worker exited before becoming ready: {0}")]
    LaunchFailed(TerminationReason),

    #[error("Failed to spawn worker: {0}")]
    Spawn(String),

    #[error("Worker process error: {0}")]
    Process(String),

    #[error("Layout mismatch: expected {expected}, got {actual}")]
    LayoutMismatch { expected: Layout, actual: Layout },

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for shm-worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::DType;

    #[test]
    fn test_launch_timeout_message() {
        let err = WorkerError::LaunchTimeout {
            timeout: Duration::from_secs(5),
        };
        let msg = err.to_string();
        assert!(msg.contains("ready"));
        assert!(msg.contains("5s"));
    }

    #[test]
    fn test_launch_failed_message() {
        let err = WorkerError::LaunchFailed(TerminationReason::Panicked);
        assert!(err.to_string().contains("panicked"));
    }

    #[test]
    fn test_layout_mismatch_message() {
        let err = WorkerError::LayoutMismatch {
            expected: Layout::new(vec![1, 3], DType::I32),
            actual: Layout::new(vec![3], DType::I32),
        };
        let msg = err.to_string();
        assert!(msg.contains("[1, 3]"));
        assert!(msg.contains("[3]"));
        assert!(msg.contains("i32"));
    }

    #[test]
    fn test_nix_error_conversion() {
        let err: WorkerError = nix::Error::ENOMEM.into();
        assert!(err.to_string().contains("Shared memory"));
    }

    #[test]
    fn test_manager_stopped_message() {
        assert_eq!(
            WorkerError::ManagerStopped.to_string(),
            "Shared memory manager has been stopped"
        );
    }
}
