//! Backup store and detection configuration

use crate::error::ConfigResult;
use crate::validation::{validate_path, validate_positive, validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Root folder for backup copies
    pub folder: PathBuf,

    /// Versions kept per document before the oldest are pruned
    pub max_versions: usize,

    /// Applications whose open documents are backed up
    pub watched_applications: Vec<WatchedApplication>,

    /// Backup records kept in memory for listing
    pub history_limit: usize,
}

/// One application to look for in the process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedApplication {
    /// Process name as reported by the OS
    pub process: String,

    /// Display name recorded with each backup
    pub application: String,

    /// File extensions (without dot) worth backing up
    pub extensions: Vec<String>,
}

impl WatchedApplication {
    fn new(process: &str, application: &str, extensions: &[&str]) -> Self {
        Self {
            process: process.to_string(),
            application: application.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            folder: default_backup_folder(),
            max_versions: 10,
            watched_applications: vec![
                WatchedApplication::new("soffice.bin", "LibreOffice", &["doc", "docx", "odt", "rtf"]),
                WatchedApplication::new("evince", "Evince", &["pdf"]),
                WatchedApplication::new("okular", "Okular", &["pdf"]),
            ],
            history_limit: 500,
        }
    }
}

/// `<home>/WardenBackups`, or under the temp dir when there is no home
pub fn default_backup_folder() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("WardenBackups")
}

impl Validatable for BackupConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_path(&self.folder, "folder", self.domain_name())?;
        validate_positive(self.max_versions, "max_versions", self.domain_name())?;
        validate_positive(self.history_limit, "history_limit", self.domain_name())?;

        for app in &self.watched_applications {
            app.validate()?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "backup"
    }
}

impl Validatable for WatchedApplication {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.process, "process", self.domain_name())?;
        validate_required_string(&self.application, "application", self.domain_name())?;

        if self.extensions.is_empty() {
            return Err(self.validation_error(format!(
                "{} must list at least one extension",
                self.process
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "backup.watched_applications"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = BackupConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.folder.ends_with("WardenBackups"));
        assert_eq!(config.max_versions, 10);
    }

    #[test]
    fn test_application_without_extensions_rejected() {
        let config = BackupConfig {
            watched_applications: vec![WatchedApplication::new("evince", "Evince", &[])],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("evince"));
    }

    #[test]
    fn test_zero_versions_rejected() {
        let config = BackupConfig {
            max_versions: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
