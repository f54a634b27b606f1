//! Domain models for GovGuard.
//!
//! Canonical definitions for the core entities:
//! - `ReleaseCandidate`: Immutable bundle of artifacts proposed for release
//! - `EvaluationResult`: One check's reported outcome for a candidate
//! - `GateDecision`: The policy engine's verdict
//! - `LifecycleState`: Where a candidate is in the release state machine
//! - `RegressionReport`: Post-deploy monitoring signal

pub mod candidate;
pub mod decision;
pub mod error;
pub mod evaluation;
pub mod lifecycle;
pub mod regression;

// Re-export main types and errors
pub use candidate::{
    ArtifactRef, ArtifactType, CandidateId, Environment, Lineage, ReleaseCandidate, MAX_RISK_TIER,
};
pub use decision::{GateDecision, GateDecisionKind};
pub use error::{GovError, Result};
pub use evaluation::{CheckStatus, EvaluationResult};
pub use lifecycle::LifecycleState;
pub use regression::RegressionReport;
