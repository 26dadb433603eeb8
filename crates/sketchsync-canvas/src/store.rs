//! Durable snapshot persistence.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::Result;

/// Metadata for one persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotInfo {
    pub name: String,
    pub bytes: u64,
}

/// Where canvas snapshots are kept.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store `bytes` under `name`. Fire-and-forget: failures are logged and
    /// never reported back to the caller.
    fn persist(&self, bytes: Vec<u8>, name: String);

    /// Persisted snapshots, oldest first.
    async fn list(&self) -> Result<Vec<SnapshotInfo>>;
}

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_seq() -> u64 {
    NEXT_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// File name for a snapshot taken at `at`, e.g.
/// `canvas-20261019T101112.123Z-000004.png`. `seq` tells apart snapshots
/// taken within the same millisecond. Names sort chronologically.
pub fn snapshot_name(at: DateTime<Utc>, seq: u64) -> String {
    format!("canvas-{}-{seq:06}.png", at.format("%Y%m%dT%H%M%S%.3fZ"))
}

/// Name for a snapshot taken now, unique within this process.
pub fn next_snapshot_name() -> String {
    snapshot_name(Utc::now(), next_seq())
}

/// Writes each snapshot as a PNG file inside one directory.
pub struct FsSnapshotStore {
    dir: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // Write to a temp file then rename, so readers never see a partial PNG.
    // Each write gets its own temp file even when names repeat.
    async fn write(dir: PathBuf, name: String, bytes: Vec<u8>) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(&name);
        let tmp = dir.join(format!(".{name}.{}.tmp", next_seq()));
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(path)
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    fn persist(&self, bytes: Vec<u8>, name: String) {
        let dir = self.dir.clone();
        let len = bytes.len();
        let task = async move {
            match Self::write(dir, name.clone(), bytes).await {
                Ok(path) => debug!(path = %path.display(), bytes = len, "Persisted snapshot"),
                Err(e) => warn!(name = %name, error = %e, "Failed to persist snapshot"),
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(task);
            }
            Err(_) => warn!("No async runtime available; snapshot dropped"),
        }
    }

    async fn list(&self) -> Result<Vec<SnapshotInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut snapshots = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !name.ends_with(".png") {
                continue;
            }
            let bytes = entry.metadata().await?.len();
            snapshots.push(SnapshotInfo { name, bytes });
        }
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(snapshots)
    }
}

/// Discards everything. Used when snapshot persistence is disabled.
#[derive(Debug, Default)]
pub struct NullSnapshotStore;

#[async_trait]
impl SnapshotStore for NullSnapshotStore {
    fn persist(&self, bytes: Vec<u8>, name: String) {
        debug!(name = %name, bytes = bytes.len(), "Snapshot persistence disabled; dropping");
    }

    async fn list(&self) -> Result<Vec<SnapshotInfo>> {
        Ok(Vec::new())
    }
}
