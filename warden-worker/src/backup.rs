//! Versioned file copies of backup targets
//!
//! Layout: `<folder>/<Kind>/<stem>_<YYYYMMDD_HHMMSS><ext>`. Each document keeps
//! at most `max_versions` copies; older ones are pruned after every write.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use warden_ipc::{BackupRecord, RuntimeSettings};

use crate::error::WorkerError;
use crate::target::{BackupCatalog, Target, TargetProcessor};

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// File-copy backup store. Writes are serialized; history is bounded.
pub struct FileBackupStore {
    settings: watch::Receiver<RuntimeSettings>,
    history_limit: usize,
    history: Mutex<VecDeque<BackupRecord>>,
    total: AtomicU64,
}

impl FileBackupStore {
    pub fn new(settings: watch::Receiver<RuntimeSettings>, history_limit: usize) -> Self {
        Self {
            settings,
            history_limit: history_limit.max(1),
            history: Mutex::new(VecDeque::new()),
            total: AtomicU64::new(0),
        }
    }

    async fn write_backup(
        &self,
        target: &Target,
        settings: &RuntimeSettings,
    ) -> Result<BackupRecord, WorkerError> {
        let metadata = tokio::fs::metadata(&target.path)
            .await
            .map_err(|e| WorkerError::processing(&target.path, format!("source unavailable: {}", e)))?;
        if !metadata.is_file() {
            return Err(WorkerError::processing(&target.path, "source is not a regular file"));
        }

        let kind_folder = settings.backup_folder.join(target.kind.to_string());
        tokio::fs::create_dir_all(&kind_folder).await.map_err(|e| {
            WorkerError::processing(
                &target.path,
                format!("cannot create {}: {}", kind_folder.display(), e),
            )
        })?;

        let (stem, ext) = name_parts(target);
        let backup_path = next_free_path(&kind_folder, &stem, &ext).await.map_err(|e| {
            WorkerError::processing(
                &target.path,
                format!("cannot list {}: {}", kind_folder.display(), e),
            )
        })?;

        let size_bytes = tokio::fs::copy(&target.path, &backup_path)
            .await
            .map_err(|e| WorkerError::processing(&target.path, format!("copy failed: {}", e)))?;

        debug!(
            source = %target.path.display(),
            backup = %backup_path.display(),
            size_bytes,
            "Backup written"
        );

        if let Err(e) = prune_versions(&kind_folder, &stem, &ext, settings.max_versions, &backup_path).await {
            warn!("Failed to prune old versions of {}: {}", stem, e);
        }

        Ok(BackupRecord {
            source_path: target.path.clone(),
            backup_path,
            application: target.application.clone(),
            kind: target.kind,
            backed_up_at: Utc::now(),
            size_bytes,
        })
    }
}

#[async_trait]
impl TargetProcessor for FileBackupStore {
    async fn process_target(&self, target: &Target) -> Result<BackupRecord, WorkerError> {
        let settings = self.settings.borrow().clone();

        // The history lock doubles as the write lock
        let mut history = self.history.lock().await;
        let record = self.write_backup(target, &settings).await?;

        if history.len() == self.history_limit {
            history.pop_back();
        }
        history.push_front(record.clone());
        self.total.fetch_add(1, Ordering::Relaxed);

        info!(
            source = %record.source_path.display(),
            application = %record.application,
            "Backed up document"
        );
        Ok(record)
    }
}

#[async_trait]
impl BackupCatalog for FileBackupStore {
    async fn history(&self) -> Vec<BackupRecord> {
        self.history.lock().await.iter().cloned().collect()
    }

    fn total_backups(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

/// File stem and dotted extension for the copy name
fn name_parts(target: &Target) -> (String, String) {
    let stem = target
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| format!("{}_{}", target.application, target.kind));
    let ext = target
        .path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    (stem, ext)
}

/// One existing copy of a document, ordered oldest first
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Version {
    timestamp: String,
    /// 0 for the first copy within a second, then 1, 2, ...
    counter: u32,
    name: String,
}

fn version_name(stem: &str, timestamp: &str, counter: u32, ext: &str) -> String {
    if counter == 0 {
        format!("{}_{}{}", stem, timestamp, ext)
    } else {
        format!("{}_{}_{:02}{}", stem, timestamp, counter, ext)
    }
}

/// Parse `file_name` as a copy of `<stem><ext>` made by this store
fn parse_version(file_name: &str, stem: &str, ext: &str) -> Option<Version> {
    let rest = file_name
        .strip_prefix(stem)?
        .strip_prefix('_')?
        .strip_suffix(ext)?;
    if !rest.is_ascii() {
        return None;
    }

    let (timestamp, counter) = match rest.len() {
        15 => (rest, 0),
        n if n > 16 && rest.as_bytes()[15] == b'_' => {
            let counter = &rest[16..];
            if !counter.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (&rest[..15], counter.parse().ok()?)
        }
        _ => return None,
    };

    let digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if timestamp.as_bytes()[8] != b'_' || !digits(&timestamp[..8]) || !digits(&timestamp[9..]) {
        return None;
    }

    Some(Version {
        timestamp: timestamp.to_string(),
        counter,
        name: file_name.to_string(),
    })
}

async fn list_versions(folder: &Path, stem: &str, ext: &str) -> std::io::Result<Vec<Version>> {
    let mut versions = Vec::new();
    let mut entries = tokio::fs::read_dir(folder).await?;
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(version) = parse_version(&name, stem, ext) {
            versions.push(version);
        }
    }
    Ok(versions)
}

/// Counter for a new copy at `timestamp`: one past the highest in use, so a
/// pruned name is never handed out again within the same second
fn next_counter(versions: &[Version], timestamp: &str) -> u32 {
    versions
        .iter()
        .filter(|v| v.timestamp == timestamp)
        .map(|v| v.counter + 1)
        .max()
        .unwrap_or(0)
}

/// `<stem>_<timestamp><ext>`, or with a `_NN` counter when that second is taken
async fn next_free_path(folder: &Path, stem: &str, ext: &str) -> std::io::Result<PathBuf> {
    let timestamp = Utc::now().format(TIMESTAMP_FORMAT).to_string();
    let versions = list_versions(folder, stem, ext).await?;
    let counter = next_counter(&versions, &timestamp);
    Ok(folder.join(version_name(stem, &timestamp, counter, ext)))
}

/// Delete the oldest copies of a document beyond `keep`, never `written`
async fn prune_versions(
    folder: &Path,
    stem: &str,
    ext: &str,
    keep: usize,
    written: &Path,
) -> std::io::Result<usize> {
    let mut versions = list_versions(folder, stem, ext).await?;
    if versions.len() <= keep {
        return Ok(0);
    }

    versions.sort();
    let excess = versions.len() - keep;
    let mut removed = 0;
    for version in versions
        .iter()
        .filter(|v| written.file_name() != Some(OsStr::new(&v.name)))
        .take(excess)
    {
        match tokio::fs::remove_file(folder.join(&version.name)).await {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to delete old backup {}: {}", version.name, e),
        }
    }

    debug!(stem, removed, "Pruned old backups");
    Ok(removed)
}
