//! Domain-level error taxonomy for GovGuard.
//!
//! Every rejection path in the engine returns one of these variants instead of
//! aborting the dispatcher. The first five map onto the operator-facing
//! categories: malformed event, unknown candidate, illegal transition, policy
//! configuration error, collaborator failure.

use govguard_state::StorageError;

use super::candidate::CandidateId;
use super::lifecycle::LifecycleState;

/// GovGuard domain errors.
#[derive(Debug, thiserror::Error)]
pub enum GovError {
    #[error("malformed {topic} event: {reason}")]
    MalformedEvent { topic: String, reason: String },

    #[error("unknown event topic: {0}")]
    UnknownTopic(String),

    #[error("unknown candidate: {0}")]
    UnknownCandidate(CandidateId),

    #[error("invalid release candidate: {0}")]
    InvalidCandidate(String),

    #[error("illegal transition for {candidate_id}: {event} is not applicable in state {state}")]
    IllegalTransition {
        candidate_id: CandidateId,
        state: LifecycleState,
        event: String,
    },

    #[error("policy configuration error: {0}")]
    PolicyConfig(String),

    #[error("snapshot store failed for {candidate_id}: {source}")]
    Snapshot {
        candidate_id: CandidateId,
        #[source]
        source: StorageError,
    },

    #[error("snapshot restore failed: {0}")]
    Restore(#[source] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl GovError {
    /// Whether the in-memory state is still authoritative after this error.
    ///
    /// Only collaborator failures qualify: the transition was applied, durability
    /// is what is at risk.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, GovError::Snapshot { .. })
    }
}

/// Result type for GovGuard domain operations.
pub type Result<T> = std::result::Result<T, GovError>;
