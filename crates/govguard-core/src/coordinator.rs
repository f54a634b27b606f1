//! Evaluation coordinator: fan-in of evaluator reports.
//!
//! Evaluation is complete for a candidate once every check required for its
//! (environment, risk tier) has a recorded result, whatever its status. A
//! failing required check does not hold up completion; it is the gatekeeper's
//! job to block on it.

use std::sync::Arc;

use crate::domain::{EvaluationResult, LifecycleState, Result};
use crate::policy::{PolicyProvider, TierPolicy};
use crate::registry::CandidateEntry;

/// What recording a result did to the candidate's evaluation phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Every required check has reported.
    Complete,
    /// Still waiting on these required checks, in declaration order.
    Pending { missing: Vec<String> },
    /// The candidate is past evaluation; the result was stored for the
    /// record but changes nothing.
    Late { state: LifecycleState },
}

/// Required checks that have no recorded result, in declaration order.
pub fn missing_checks(entry: &CandidateEntry, policy: &TierPolicy) -> Vec<String> {
    policy
        .required_names()
        .filter(|name| !entry.results().contains_key(*name))
        .map(str::to_string)
        .collect()
}

pub struct EvaluationCoordinator {
    policy: Arc<dyn PolicyProvider>,
}

impl EvaluationCoordinator {
    pub fn new(policy: Arc<dyn PolicyProvider>) -> Self {
        Self { policy }
    }

    /// Store `result` on the entry and report whether evaluation is complete.
    ///
    /// The caller must hold the entry lock. A missing tier policy is returned
    /// as `PolicyConfig` after the result has been stored.
    pub fn record(&self, entry: &mut CandidateEntry, result: EvaluationResult) -> Result<RecordOutcome> {
        entry.record_result(result);

        let state = entry.state();
        if state != LifecycleState::Evaluating {
            return Ok(RecordOutcome::Late { state });
        }

        let policy = self.tier_policy(entry)?;
        let missing = missing_checks(entry, &policy);
        if missing.is_empty() {
            Ok(RecordOutcome::Complete)
        } else {
            Ok(RecordOutcome::Pending { missing })
        }
    }

    /// Tier policy for the entry's candidate.
    pub fn tier_policy(&self, entry: &CandidateEntry) -> Result<TierPolicy> {
        let candidate = entry.candidate();
        self.policy
            .tier_policy(candidate.environment, candidate.risk_tier)
    }
}
