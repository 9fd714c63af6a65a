//! Process-table target detection
//!
//! Looks for watched applications in the process table and treats document
//! paths on their command lines as open documents. Scans run on the
//! automation thread under its call timeout.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;
use warden_config::WatchedApplication;

use crate::automation::{AutomationBackend, AutomationWorker};
use crate::error::WorkerError;
use crate::target::{Target, TargetDetector};

/// Request understood by [`ProcessTable`]
#[derive(Debug)]
pub struct ScanRequest;

/// Automation backend owning the `sysinfo` process table
pub struct ProcessTable {
    system: System,
    watched: Vec<WatchedApplication>,
}

impl ProcessTable {
    pub fn new(watched: Vec<WatchedApplication>) -> Self {
        Self {
            system: System::new(),
            watched,
        }
    }
}

impl AutomationBackend for ProcessTable {
    type Request = ScanRequest;
    type Response = Vec<Target>;

    fn handle(&mut self, _request: ScanRequest) -> Result<Vec<Target>, String> {
        self.system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::nothing().with_cmd(sysinfo::UpdateKind::OnlyIfNotSet),
        );

        let mut found = BTreeMap::new();
        for process in self.system.processes().values() {
            let name = process.name().to_string_lossy();
            let Some(app) = self.watched.iter().find(|app| app.process == name) else {
                continue;
            };

            for target in targets_from_command_line(app, process.cmd()) {
                found.entry(target.path.clone()).or_insert(target);
            }
        }

        Ok(found.into_values().collect())
    }
}

/// Existing files with a watched extension among a process's arguments
pub fn targets_from_command_line(app: &WatchedApplication, cmd: &[OsString]) -> Vec<Target> {
    cmd.iter()
        .skip(1)
        .map(PathBuf::from)
        .filter(|path| has_watched_extension(app, path) && path.is_file())
        .map(|path| Target::new(path, app.application.clone()))
        .collect()
}

fn has_watched_extension(app: &WatchedApplication, path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            app.extensions
                .iter()
                .any(|watched| watched.eq_ignore_ascii_case(ext))
        })
}

/// Detector that scans the process table on the automation thread
#[derive(Clone)]
pub struct ProcessScanDetector {
    automation: AutomationWorker<ScanRequest, Vec<Target>>,
}

impl ProcessScanDetector {
    /// Start the automation thread for `watched` applications
    pub fn spawn(watched: Vec<WatchedApplication>, call_timeout: Duration) -> Result<Self, WorkerError> {
        let automation =
            AutomationWorker::spawn("warden-automation", call_timeout, move || ProcessTable::new(watched))?;
        Ok(Self { automation })
    }
}

#[async_trait]
impl TargetDetector for ProcessScanDetector {
    async fn detect_targets(&self) -> Result<Vec<Target>, WorkerError> {
        let targets = self.automation.call(ScanRequest).await.map_err(|e| match e {
            WorkerError::Automation(message) => WorkerError::Detection(message),
            other => other,
        })?;

        debug!(count = targets.len(), "Process scan finished");
        Ok(targets)
    }
}
