//! Background worker for Warden
//!
//! This crate provides the periodic backup scheduler with its heartbeat, the
//! collaborators it drives (process-scan detection on a dedicated automation
//! thread, a versioned file backup store), and the handlers that answer
//! control requests over the IPC channel.

pub mod automation;
pub mod backup;
pub mod detector;
pub mod error;
pub mod handlers;
pub mod heartbeat;
pub mod recent;
pub mod scheduler;
#[cfg(unix)]
pub mod service;
pub mod target;

// Re-export commonly used types
pub use automation::{AutomationBackend, AutomationWorker};
pub use backup::FileBackupStore;
pub use detector::{ProcessScanDetector, ProcessTable};
pub use error::WorkerError;
pub use handlers::{service_router, ServiceContext};
pub use heartbeat::HeartbeatTracker;
pub use recent::RecentErrors;
pub use scheduler::{run_cycle, CycleReport, CycleTimeouts, Scheduler, SchedulerHandle, SchedulerState, TargetFailure};
#[cfg(unix)]
pub use service::{ServiceError, WardenService};
pub use target::{BackupCatalog, Target, TargetDetector, TargetProcessor};
