//! Storage trait definitions for GovGuard
//!
//! `SnapshotStore` is the only persistence abstraction the coordination engine
//! depends on. It stores the latest snapshot per candidate; history is the
//! event stream's concern, not the store's.
//!
//! All implementations are async and backend-agnostic. An in-memory fake is
//! provided for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// ContentDigest
// ---------------------------------------------------------------------------

/// Content digest (SHA-256 hex string).
///
/// The inner field is private to guarantee the string is always valid
/// lowercase hex produced by `from_bytes` or validated via `TryFrom<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Compute the SHA-256 digest of the given bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        use sha2::Digest;
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentDigest(hex::encode(hasher.finalize()))
    }

    /// Return the full hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentDigest {
    type Error = StorageError;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::InvalidDigest { digest: s });
        }
        Ok(ContentDigest(s.to_ascii_lowercase()))
    }
}

impl From<ContentDigest> for String {
    fn from(digest: ContentDigest) -> Self {
        digest.0
    }
}

impl std::fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SnapshotRecord
// ---------------------------------------------------------------------------

/// The persisted view of one candidate at a transition boundary.
///
/// `state` and `decision` are kept as plain strings so that this crate does
/// not depend on the engine's domain types; `payload` carries the full
/// serialized candidate entry the engine needs to restore itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Candidate this snapshot belongs to.
    pub candidate_id: String,
    /// Lifecycle state name at the time of the snapshot (e.g. "GATING").
    pub state: String,
    /// Gate decision value, once one has been made.
    pub decision: Option<String>,
    /// Number of transitions the candidate had gone through.
    pub sequence: u64,
    /// Full engine-side snapshot.
    pub payload: serde_json::Value,
    /// SHA-256 over the canonical JSON encoding of `payload`.
    pub payload_digest: ContentDigest,
    /// When the snapshot was taken.
    pub recorded_at: DateTime<Utc>,
}

impl SnapshotRecord {
    /// Build a record, computing the payload digest.
    pub fn new(
        candidate_id: impl Into<String>,
        state: impl Into<String>,
        decision: Option<String>,
        sequence: u64,
        payload: serde_json::Value,
    ) -> StorageResult<Self> {
        let payload_digest = ContentDigest::from_bytes(&serde_json::to_vec(&payload)?);
        Ok(Self {
            candidate_id: candidate_id.into(),
            state: state.into(),
            decision,
            sequence,
            payload,
            payload_digest,
            recorded_at: Utc::now(),
        })
    }

    /// Recompute the payload digest and compare it with the stored one.
    pub fn verify(&self) -> StorageResult<()> {
        let actual = ContentDigest::from_bytes(&serde_json::to_vec(&self.payload)?);
        if actual != self.payload_digest {
            return Err(StorageError::DigestMismatch {
                candidate_id: self.candidate_id.clone(),
                expected: self.payload_digest.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SnapshotStore
// ---------------------------------------------------------------------------

/// Candidate snapshot store.
///
/// Guarantees:
/// - `save` replaces any earlier snapshot for the same candidate id.
/// - `load` returns the most recently saved snapshot, or `None`.
/// - `list` returns one snapshot per candidate, ordered by candidate id.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist the latest snapshot for a candidate.
    async fn save(&self, record: &SnapshotRecord) -> StorageResult<()>;

    /// Load the latest snapshot for a candidate.
    async fn load(&self, candidate_id: &str) -> StorageResult<Option<SnapshotRecord>>;

    /// List the latest snapshot of every known candidate.
    async fn list(&self) -> StorageResult<Vec<SnapshotRecord>>;
}
