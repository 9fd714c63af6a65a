//! Collaborator seams around the backup cycle

use async_trait::async_trait;
use std::path::PathBuf;
use warden_ipc::{BackupRecord, DocumentKind};

use crate::error::WorkerError;

/// An open document discovered by a detector
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub path: PathBuf,
    pub application: String,
    pub kind: DocumentKind,
}

impl Target {
    /// Target whose kind is derived from the file extension
    pub fn new(path: impl Into<PathBuf>, application: impl Into<String>) -> Self {
        let path = path.into();
        let kind = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(DocumentKind::from_extension)
            .unwrap_or_default();

        Self {
            path,
            application: application.into(),
            kind,
        }
    }
}

/// Finds the targets to process in a cycle
#[async_trait]
pub trait TargetDetector: Send + Sync {
    async fn detect_targets(&self) -> Result<Vec<Target>, WorkerError>;
}

/// Processes one target, producing a backup record
#[async_trait]
pub trait TargetProcessor: Send + Sync {
    async fn process_target(&self, target: &Target) -> Result<BackupRecord, WorkerError>;
}

/// Read side of the backup store
#[async_trait]
pub trait BackupCatalog: Send + Sync {
    /// Completed backups, most recent first
    async fn history(&self) -> Vec<BackupRecord>;

    /// Backups made since the service started
    fn total_backups(&self) -> u64;
}
