//! Key-backup export surface.
//!
//! An export is a background job that snapshots every key-record event ever
//! appended into one ZIP archive holding a single JSON array. Callers poll
//! the operation id for status and fetch the file path on completion.
//! Finished exports and their archives are swept after the retention window.

use crate::error::{DeliveryError, DeliveryResult};
use archivault_keystore::KeyRecordStore;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Identifier of one export operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExportId(uuid::Uuid);

impl ExportId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ExportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of an export operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Pending,
    Running,
    Completed { path: PathBuf },
    Failed { message: String },
}

struct ExportEntry {
    status: ExportStatus,
    started_at: DateTime<Utc>,
}

/// Runs and tracks key-backup exports.
#[derive(Clone)]
pub struct ExportManager {
    keys: KeyRecordStore,
    dir: PathBuf,
    ops: Arc<RwLock<HashMap<ExportId, ExportEntry>>>,
    sweep_lock: Arc<tokio::sync::Mutex<()>>,
    retention: Duration,
}

impl ExportManager {
    /// Manager writing archives into `dir`, swept after 24 hours.
    pub fn new(keys: KeyRecordStore, dir: PathBuf) -> Self {
        Self::with_retention(keys, dir, Duration::hours(24))
    }

    pub fn with_retention(keys: KeyRecordStore, dir: PathBuf, retention: Duration) -> Self {
        Self {
            keys,
            dir,
            ops: Arc::new(RwLock::new(HashMap::new())),
            sweep_lock: Arc::new(tokio::sync::Mutex::new(())),
            retention,
        }
    }

    /// Starts an export in the background and returns its operation id.
    pub async fn start_export(&self) -> ExportId {
        let id = ExportId::new();
        self.ops.write().await.insert(
            id,
            ExportEntry {
                status: ExportStatus::Pending,
                started_at: Utc::now(),
            },
        );

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_export(id).await;
        });
        id
    }

    pub async fn status(&self, id: ExportId) -> Option<ExportStatus> {
        self.ops.read().await.get(&id).map(|e| e.status.clone())
    }

    /// Deletes exports older than the retention window, archives included.
    /// Returns how many were removed; skips if a sweep is already running.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let Ok(_guard) = self.sweep_lock.try_lock() else {
            return 0;
        };

        let mut ops = self.ops.write().await;
        let expired: Vec<ExportId> = ops
            .iter()
            .filter(|(_, entry)| now - entry.started_at > self.retention)
            .map(|(id, _)| *id)
            .collect();

        for id in &expired {
            if let Some(entry) = ops.remove(id) {
                if let ExportStatus::Completed { path } = entry.status {
                    if let Err(e) = std::fs::remove_file(&path) {
                        warn!(export_id = %id, error = %e, "failed to delete export archive");
                    }
                }
            }
        }
        if !expired.is_empty() {
            info!(removed = expired.len(), "expired exports swept");
        }
        expired.len()
    }

    async fn run_export(&self, id: ExportId) {
        self.set_status(id, ExportStatus::Running).await;

        let keys = self.keys.clone();
        let path = self.dir.join(format!("key-backup-{id}.zip"));
        let write_path = path.clone();
        let result =
            tokio::task::spawn_blocking(move || write_archive(&keys, &write_path)).await;

        let status = match result {
            Ok(Ok(())) => {
                info!(export_id = %id, path = %path.display(), "key backup export completed");
                ExportStatus::Completed { path }
            }
            Ok(Err(e)) => {
                warn!(export_id = %id, error = %e, "key backup export failed");
                ExportStatus::Failed {
                    message: e.to_string(),
                }
            }
            Err(e) => {
                warn!(export_id = %id, error = %e, "key backup export task panicked");
                ExportStatus::Failed {
                    message: "export task aborted".to_string(),
                }
            }
        };
        self.set_status(id, status).await;
    }

    async fn set_status(&self, id: ExportId, status: ExportStatus) {
        if let Some(entry) = self.ops.write().await.get_mut(&id) {
            entry.status = status;
        }
    }
}

/// One JSON array of every key-record event, zipped under a fixed name.
fn write_archive(keys: &KeyRecordStore, path: &Path) -> DeliveryResult<()> {
    let events = keys.all_events()?;
    let json = serde_json::to_vec_pretty(&events).map_err(DeliveryError::Serialization)?;

    let file = File::create(path)?;
    let mut writer = ZipWriter::new(file);
    writer.start_file("key-records.json", SimpleFileOptions::default())?;
    writer.write_all(&json)?;
    writer.finish()?;
    Ok(())
}
