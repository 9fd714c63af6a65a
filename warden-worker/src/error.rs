//! Worker error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use warden_resilience::Retryable;

/// Errors raised while detecting or processing backup targets
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkerError {
    #[error("Target detection failed: {0}")]
    Detection(String),

    #[error("Failed to back up {}: {reason}", path.display())]
    Processing { path: PathBuf, reason: String },

    #[error("{operation} timed out after {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    #[error("Automation call failed: {0}")]
    Automation(String),

    #[error("Automation thread is gone")]
    AutomationUnavailable,

    #[error("Scheduler is not running")]
    SchedulerStopped,

    #[error("IO error: {0}")]
    Io(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl WorkerError {
    pub fn processing(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        WorkerError::Processing {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::Io(err.to_string())
    }
}

impl Retryable for WorkerError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkerError::Detection(_)
                | WorkerError::Timeout { .. }
                | WorkerError::Automation(_)
                | WorkerError::Io(_)
        )
    }

    fn is_cancellation(&self) -> bool {
        matches!(self, WorkerError::Cancelled)
    }
}
