use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{SnapshotRecord, SnapshotStore, StorageResult};

/// Filesystem-backed snapshot store.
///
/// Layout: `<root>/snapshots/<hex(candidate_id)>.json`. Candidate ids are
/// opaque strings, so file names are hex-encoded to stay path-safe.
#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    snapshots_dir: PathBuf,
}

impl FsSnapshotStore {
    /// Create a new `FsSnapshotStore` rooted at `root`. Creates `root/snapshots/` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let snapshots_dir = root.as_ref().join("snapshots");
        fs::create_dir_all(&snapshots_dir)?;
        Ok(Self { snapshots_dir })
    }

    fn record_path(&self, candidate_id: &str) -> PathBuf {
        self.snapshots_dir
            .join(format!("{}.json", hex::encode(candidate_id.as_bytes())))
    }

    fn write_record(dir: &Path, path: &Path, record: &SnapshotRecord) -> StorageResult<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        // Atomic write: temp file in the same directory, then rename.
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn read_record(path: &Path) -> StorageResult<SnapshotRecord> {
        let bytes = fs::read(path)?;
        let record: SnapshotRecord = serde_json::from_slice(&bytes)?;
        record.verify()?;
        Ok(record)
    }
}

#[async_trait]
impl SnapshotStore for FsSnapshotStore {
    async fn save(&self, record: &SnapshotRecord) -> StorageResult<()> {
        let dir = self.snapshots_dir.clone();
        let path = self.record_path(&record.candidate_id);
        let record = record.clone();
        tokio::task::spawn_blocking(move || Self::write_record(&dir, &path, &record))
            .await
            .map_err(|e| StorageError::Unavailable(format!("snapshot writer failed: {e}")))??;
        debug!(snapshots_dir = %self.snapshots_dir.display(), "snapshot saved");
        Ok(())
    }

    async fn load(&self, candidate_id: &str) -> StorageResult<Option<SnapshotRecord>> {
        let path = self.record_path(candidate_id);
        tokio::task::spawn_blocking(move || {
            if !path.exists() {
                return Ok(None);
            }
            Self::read_record(&path).map(Some)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("snapshot reader failed: {e}")))?
    }

    async fn list(&self) -> StorageResult<Vec<SnapshotRecord>> {
        let dir = self.snapshots_dir.clone();
        tokio::task::spawn_blocking(move || {
            let mut records = Vec::new();
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                records.push(Self::read_record(&path)?);
            }
            records.sort_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
            Ok(records)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("snapshot reader failed: {e}")))?
    }
}
