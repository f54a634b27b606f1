//! Error types for govguard-state

use thiserror::Error;

/// Errors raised by snapshot store backends.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The backend cannot be reached right now; callers may retry later.
    #[error("snapshot store unavailable: {0}")]
    Unavailable(String),

    /// Stored bytes do not hash to the digest recorded alongside them.
    #[error("snapshot digest mismatch for {candidate_id}: expected {expected}, got {actual}")]
    DigestMismatch {
        candidate_id: String,
        expected: String,
        actual: String,
    },

    #[error("invalid content digest: {digest}")]
    InvalidDigest { digest: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
