//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemorySnapshotStore`, which satisfies the `SnapshotStore`
//! contract without any external dependencies and can be switched into an
//! "unavailable" mode to exercise collaborator-failure paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemorySnapshotStore
// ---------------------------------------------------------------------------

/// In-memory snapshot store backed by a `BTreeMap<candidate_id, record>`.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    records: Mutex<BTreeMap<String, SnapshotRecord>>,
    unavailable: AtomicBool,
    saves: AtomicU64,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with `StorageError::Unavailable`
    /// (or succeed again when `false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of successful `save` calls so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> StorageResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory snapshot store switched off".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, record: &SnapshotRecord) -> StorageResult<()> {
        self.check_available()?;
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.insert(record.candidate_id.clone(), record.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load(&self, candidate_id: &str) -> StorageResult<Option<SnapshotRecord>> {
        self.check_available()?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.get(candidate_id).cloned())
    }

    async fn list(&self) -> StorageResult<Vec<SnapshotRecord>> {
        self.check_available()?;
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.values().cloned().collect())
    }
}
