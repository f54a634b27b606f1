//! Trait contract tests for SnapshotStore.
//!
//! Every backend runs the same checks: the in-memory fake and the filesystem
//! store must behave identically for save, load and list.

use govguard_state::fakes::MemorySnapshotStore;
use govguard_state::storage_traits::*;
use govguard_state::{FsSnapshotStore, StorageError};
use serde_json::json;

fn record(id: &str, state: &str, sequence: u64) -> SnapshotRecord {
    SnapshotRecord::new(
        id,
        state,
        None,
        sequence,
        json!({ "candidate_id": id, "state": state }),
    )
    .unwrap()
}

async fn save_then_load_returns_latest(store: &dyn SnapshotStore) {
    store.save(&record("rc-1", "EVALUATING", 1)).await.unwrap();
    store.save(&record("rc-1", "GATING", 2)).await.unwrap();

    let loaded = store.load("rc-1").await.unwrap().unwrap();
    assert_eq!(loaded.state, "GATING");
    assert_eq!(loaded.sequence, 2);
    loaded.verify().unwrap();
}

async fn load_missing_is_none(store: &dyn SnapshotStore) {
    assert!(store.load("never-saved").await.unwrap().is_none());
}

async fn list_is_one_per_candidate_sorted(store: &dyn SnapshotStore) {
    store.save(&record("rc-b", "EVALUATING", 1)).await.unwrap();
    store.save(&record("rc-a", "EVALUATING", 1)).await.unwrap();
    store.save(&record("rc-a", "GATING", 2)).await.unwrap();

    let ids: Vec<_> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|r| (r.candidate_id, r.state))
        .collect();
    assert_eq!(
        ids,
        vec![
            ("rc-a".to_string(), "GATING".to_string()),
            ("rc-b".to_string(), "EVALUATING".to_string()),
        ]
    );
}

// ===========================================================================
// MemorySnapshotStore
// ===========================================================================

#[tokio::test]
async fn memory_save_then_load_returns_latest() {
    save_then_load_returns_latest(&MemorySnapshotStore::new()).await;
}

#[tokio::test]
async fn memory_load_missing_is_none() {
    load_missing_is_none(&MemorySnapshotStore::new()).await;
}

#[tokio::test]
async fn memory_list_is_one_per_candidate_sorted() {
    list_is_one_per_candidate_sorted(&MemorySnapshotStore::new()).await;
}

#[tokio::test]
async fn memory_unavailable_fails_every_call() {
    let store = MemorySnapshotStore::new();
    store.set_unavailable(true);

    let err = store.save(&record("rc-1", "EVALUATING", 1)).await.unwrap_err();
    assert!(matches!(err, StorageError::Unavailable(_)));
    assert!(store.load("rc-1").await.is_err());
    assert!(store.list().await.is_err());
    assert_eq!(store.save_count(), 0);

    store.set_unavailable(false);
    store.save(&record("rc-1", "EVALUATING", 1)).await.unwrap();
    assert_eq!(store.save_count(), 1);
}

// ===========================================================================
// FsSnapshotStore
// ===========================================================================

#[tokio::test]
async fn fs_save_then_load_returns_latest() {
    let dir = tempfile::tempdir().unwrap();
    save_then_load_returns_latest(&FsSnapshotStore::new(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn fs_load_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    load_missing_is_none(&FsSnapshotStore::new(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn fs_list_is_one_per_candidate_sorted() {
    let dir = tempfile::tempdir().unwrap();
    list_is_one_per_candidate_sorted(&FsSnapshotStore::new(dir.path()).unwrap()).await;
}

#[tokio::test]
async fn fs_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = FsSnapshotStore::new(dir.path()).unwrap();
        store.save(&record("rc-1", "APPROVED", 3)).await.unwrap();
    }
    let reopened = FsSnapshotStore::new(dir.path()).unwrap();
    let loaded = reopened.load("rc-1").await.unwrap().unwrap();
    assert_eq!(loaded.state, "APPROVED");
}
