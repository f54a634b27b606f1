//! Gate decisions produced by the gatekeeper.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::candidate::CandidateId;

/// The gatekeeper's verdict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecisionKind {
    Approve,
    Block,
    ApproveWithWarnings,
}

impl GateDecisionKind {
    /// Whether the decision lets the candidate proceed to deployment.
    pub fn is_approving(&self) -> bool {
        !matches!(self, GateDecisionKind::Block)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GateDecisionKind::Approve => "APPROVE",
            GateDecisionKind::Block => "BLOCK",
            GateDecisionKind::ApproveWithWarnings => "APPROVE_WITH_WARNINGS",
        }
    }
}

impl fmt::Display for GateDecisionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate decision for a candidate. Immutable once produced.
///
/// Carries no timestamps: identical inputs must serialize to identical bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateDecision {
    pub candidate_id: CandidateId,
    pub decision: GateDecisionKind,
    /// Human-readable reasons, in policy declaration order.
    pub reasons: Vec<String>,
    /// True iff no required check failed or went missing.
    pub required_checks_passed: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}
