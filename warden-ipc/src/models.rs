//! Payload types carried inside envelopes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Kind of document a backup target holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DocumentKind {
    Word,
    Pdf,
    #[default]
    Unknown,
}

impl DocumentKind {
    /// Guess the kind from a file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "doc" | "docx" | "docm" | "odt" | "rtf" => DocumentKind::Word,
            "pdf" => DocumentKind::Pdf,
            _ => DocumentKind::Unknown,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Word => write!(f, "Word"),
            DocumentKind::Pdf => write!(f, "Pdf"),
            DocumentKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Service status reported in `StatusResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub is_running: bool,
    pub is_healthy: bool,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub active_documents: usize,
    pub total_backups: u64,
    pub service_start_time: DateTime<Utc>,
    pub version: String,
    #[serde(default)]
    pub recent_errors: Vec<String>,
    pub scheduler_state: String,
    pub circuit_state: String,
}

/// Liveness snapshot reported in `HeartbeatResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatInfo {
    pub last_success: Option<DateTime<Utc>>,
    pub is_healthy: bool,
    pub checked_at: DateTime<Utc>,
}

/// One completed backup, listed in `BackupListResponse`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub source_path: PathBuf,
    pub backup_path: PathBuf,
    pub application: String,
    pub kind: DocumentKind,
    pub backed_up_at: DateTime<Utc>,
    pub size_bytes: u64,
}

/// Partial settings pushed with `UpdateConfiguration`; absent fields keep their value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SettingsUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_interval_minutes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_folder: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_versions: Option<usize>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.backup_interval_minutes.is_none()
            && self.backup_folder.is_none()
            && self.max_versions.is_none()
    }
}

/// Longest interval an update may request: one day
pub const MAX_BACKUP_INTERVAL_MINUTES: u64 = 24 * 60;

/// Settings that can change while the worker runs, echoed in `ConfigurationUpdated`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeSettings {
    pub backup_interval_seconds: u64,
    pub backup_folder: PathBuf,
    pub max_versions: usize,
}

impl RuntimeSettings {
    /// Apply an update, returning the resulting settings or a reason it was refused
    pub fn apply(&self, update: &SettingsUpdate) -> Result<RuntimeSettings, String> {
        let mut next = self.clone();

        if let Some(minutes) = update.backup_interval_minutes {
            if minutes == 0 {
                return Err("backup_interval_minutes must be greater than 0".to_string());
            }
            if minutes > MAX_BACKUP_INTERVAL_MINUTES {
                return Err(format!(
                    "backup_interval_minutes must be at most {}",
                    MAX_BACKUP_INTERVAL_MINUTES
                ));
            }
            next.backup_interval_seconds = minutes * 60;
        }

        if let Some(folder) = &update.backup_folder {
            if folder.as_os_str().is_empty() {
                return Err("backup_folder cannot be empty".to_string());
            }
            next.backup_folder = folder.clone();
        }

        if let Some(versions) = update.max_versions {
            if versions == 0 {
                return Err("max_versions must be greater than 0".to_string());
            }
            next.max_versions = versions;
        }

        Ok(next)
    }
}

/// Payload of an `Error` envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RuntimeSettings {
        RuntimeSettings {
            backup_interval_seconds: 120,
            backup_folder: PathBuf::from("/var/backups/warden"),
            max_versions: 10,
        }
    }

    #[test]
    fn test_apply_partial_update() {
        let update = SettingsUpdate {
            backup_interval_minutes: Some(5),
            ..Default::default()
        };

        let next = settings().apply(&update).unwrap();
        assert_eq!(next.backup_interval_seconds, 300);
        assert_eq!(next.max_versions, 10);
        assert_eq!(next.backup_folder, PathBuf::from("/var/backups/warden"));
    }

    #[test]
    fn test_apply_rejects_zero_values() {
        let zero_interval = SettingsUpdate {
            backup_interval_minutes: Some(0),
            ..Default::default()
        };
        assert!(settings().apply(&zero_interval).is_err());

        let zero_versions = SettingsUpdate {
            max_versions: Some(0),
            ..Default::default()
        };
        assert!(settings().apply(&zero_versions).is_err());
    }

    #[test]
    fn test_apply_rejects_oversized_interval() {
        let day = SettingsUpdate {
            backup_interval_minutes: Some(MAX_BACKUP_INTERVAL_MINUTES),
            ..Default::default()
        };
        assert_eq!(settings().apply(&day).unwrap().backup_interval_seconds, 86_400);

        let huge = SettingsUpdate {
            backup_interval_minutes: Some(u64::MAX),
            ..Default::default()
        };
        let err = settings().apply(&huge).unwrap_err();
        assert!(err.contains("at most"));
    }

    #[test]
    fn test_document_kind_from_extension() {
        assert_eq!(DocumentKind::from_extension("DOCX"), DocumentKind::Word);
        assert_eq!(DocumentKind::from_extension("pdf"), DocumentKind::Pdf);
        assert_eq!(DocumentKind::from_extension("txt"), DocumentKind::Unknown);
    }

    #[test]
    fn test_empty_update_serializes_to_empty_object() {
        let update = SettingsUpdate::default();
        assert!(update.is_empty());
        assert_eq!(serde_json::to_string(&update).unwrap(), "{}");
    }
}
