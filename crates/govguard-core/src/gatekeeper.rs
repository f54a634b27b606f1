//! Gatekeeper policy engine.
//!
//! [`decide`] is a pure function of the candidate, its tier policy and the
//! recorded results: no I/O, no clock, no hidden state. Identical inputs give
//! byte-identical decisions.
//!
//! Ordering of reasons and warnings never depends on evaluator timing:
//! required checks come first in policy declaration order, followed by
//! non-required checks in name order.

use std::collections::BTreeMap;

use serde_json::json;

use crate::domain::{
    CheckStatus, EvaluationResult, GateDecision, GateDecisionKind, GovError, ReleaseCandidate,
    Result,
};
use crate::policy::{Severity, TierPolicy};

/// Reason attached to decisions with nothing blocking and every required check passed.
pub const ALL_REQUIRED_SATISFIED: &str = "All required checks satisfied";

/// Reason attached to approvals where a non-blocking required check failed or is missing.
pub const NO_BLOCKING_FAILURES: &str = "No blocking check failed or is missing";

/// Where a required check stands at gating time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Standing {
    Passed,
    Failed,
    Warning,
    Missing,
}

impl Standing {
    fn of(result: Option<&EvaluationResult>) -> Self {
        match result.map(|r| r.status) {
            Some(CheckStatus::Passed) => Standing::Passed,
            Some(CheckStatus::Failed) => Standing::Failed,
            Some(CheckStatus::Warning) => Standing::Warning,
            None => Standing::Missing,
        }
    }
}

/// `"<check>: <cause>"`, the cause being the first finding or a status description.
fn describe(check: &str, result: Option<&EvaluationResult>, fallback: &str) -> String {
    let cause = result
        .and_then(|r| r.findings.first())
        .map(String::as_str)
        .unwrap_or(fallback);
    format!("{check}: {cause}")
}

/// Compute the gate decision for `candidate`.
///
/// `forced` marks a decision taken after a deadline forced evaluation to
/// complete; it only shows up in metadata.
///
/// Fails with `PolicyConfig` when a required check has no severity; never
/// falls back to approving.
pub fn decide(
    candidate: &ReleaseCandidate,
    policy: &TierPolicy,
    results: &BTreeMap<String, EvaluationResult>,
    forced: bool,
) -> Result<GateDecision> {
    let mut rules = Vec::with_capacity(policy.checks.len());
    for check in &policy.checks {
        let severity = check.severity.ok_or_else(|| {
            GovError::PolicyConfig(format!(
                "check {} for {}/{} has no severity classification",
                check.name, policy.environment, policy.risk_tier
            ))
        })?;
        rules.push((check.name.as_str(), severity));
    }

    let mut blocking = Vec::new();
    let mut warnings = Vec::new();
    let mut required_checks_passed = true;

    for (name, severity) in &rules {
        let result = results.get(*name);
        match (Standing::of(result), severity) {
            (Standing::Passed, _) => {}
            (Standing::Warning, _) => warnings.push(describe(name, result, "reported a warning")),
            (Standing::Failed, Severity::Blocking) => {
                required_checks_passed = false;
                blocking.push(describe(name, result, "check failed"));
            }
            (Standing::Missing, Severity::Blocking) => {
                required_checks_passed = false;
                blocking.push(describe(name, result, "no result reported"));
            }
            (Standing::Failed, Severity::NonBlocking) => {
                required_checks_passed = false;
                warnings.push(describe(name, result, "check failed"));
            }
            (Standing::Missing, Severity::NonBlocking) => {
                required_checks_passed = false;
                warnings.push(describe(name, result, "no result reported"));
            }
        }
    }

    for (name, result) in results {
        if policy.is_required(name) {
            continue;
        }
        match result.status {
            CheckStatus::Passed => {}
            CheckStatus::Warning => warnings.push(describe(name, Some(result), "reported a warning")),
            CheckStatus::Failed => warnings.push(describe(name, Some(result), "check failed")),
        }
    }

    let (decision, reasons) = if !blocking.is_empty() {
        (GateDecisionKind::Block, blocking)
    } else if required_checks_passed {
        let kind = if warnings.is_empty() {
            GateDecisionKind::Approve
        } else {
            GateDecisionKind::ApproveWithWarnings
        };
        (kind, vec![ALL_REQUIRED_SATISFIED.to_string()])
    } else {
        (
            GateDecisionKind::ApproveWithWarnings,
            vec![NO_BLOCKING_FAILURES.to_string()],
        )
    };

    let mut metadata = BTreeMap::new();
    metadata.insert("environment".to_string(), json!(candidate.environment.as_str()));
    metadata.insert("risk_tier".to_string(), json!(candidate.risk_tier));
    metadata.insert("required_checks".to_string(), json!(rules.len()));
    metadata.insert("forced_completion".to_string(), json!(forced));

    Ok(GateDecision {
        candidate_id: candidate.candidate_id.clone(),
        decision,
        reasons,
        required_checks_passed,
        warnings,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactRef, ArtifactType, CandidateId, Environment, Lineage};
    use crate::policy::CheckRule;
    use chrono::{TimeZone, Utc};

    fn candidate() -> ReleaseCandidate {
        ReleaseCandidate::new(
            CandidateId::from("rc-1"),
            Environment::Prod,
            2,
            vec![ArtifactRef::new(ArtifactType::Model, "2.0", "sha256:aa")],
            Lineage {
                source_revision: "abc".to_string(),
                data_snapshot_id: "snap".to_string(),
                schema_version: "1".to_string(),
                build_timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            },
        )
    }

    fn policy() -> TierPolicy {
        TierPolicy::new(
            Environment::Prod,
            2,
            vec![
                CheckRule::blocking("security"),
                CheckRule::non_blocking("drift"),
                CheckRule::blocking("bias"),
            ],
        )
    }

    fn results(items: Vec<EvaluationResult>) -> BTreeMap<String, EvaluationResult> {
        items
            .into_iter()
            .map(|r| (r.check_name.clone(), r))
            .collect()
    }

    #[test]
    fn all_passed_approves() {
        let r = results(vec![
            EvaluationResult::passed("security"),
            EvaluationResult::passed("drift"),
            EvaluationResult::passed("bias"),
        ]);
        let d = decide(&candidate(), &policy(), &r, false).unwrap();
        assert_eq!(d.decision, GateDecisionKind::Approve);
        assert_eq!(d.reasons, vec![ALL_REQUIRED_SATISFIED]);
        assert!(d.required_checks_passed);
        assert!(d.warnings.is_empty());
    }

    #[test]
    fn blocking_reasons_follow_declaration_order() {
        let r = results(vec![
            EvaluationResult::failed("bias", &["slice delta 0.2"]),
            EvaluationResult::failed("security", &["pii_leak"]),
            EvaluationResult::passed("drift"),
        ]);
        let d = decide(&candidate(), &policy(), &r, false).unwrap();
        assert_eq!(d.decision, GateDecisionKind::Block);
        assert_eq!(
            d.reasons,
            vec!["security: pii_leak", "bias: slice delta 0.2"]
        );
        assert!(!d.required_checks_passed);
    }

    #[test]
    fn missing_blocking_check_blocks() {
        let r = results(vec![
            EvaluationResult::passed("security"),
            EvaluationResult::passed("drift"),
        ]);
        let d = decide(&candidate(), &policy(), &r, true).unwrap();
        assert_eq!(d.decision, GateDecisionKind::Block);
        assert_eq!(d.reasons, vec!["bias: no result reported"]);
        assert_eq!(d.metadata["forced_completion"], json!(true));
    }

    #[test]
    fn non_blocking_failure_warns_and_clears_required_flag() {
        let r = results(vec![
            EvaluationResult::passed("security"),
            EvaluationResult::failed("drift", &[]),
            EvaluationResult::passed("bias"),
        ]);
        let d = decide(&candidate(), &policy(), &r, false).unwrap();
        assert_eq!(d.decision, GateDecisionKind::ApproveWithWarnings);
        assert_eq!(d.warnings, vec!["drift: check failed"]);
        assert!(!d.required_checks_passed);
    }

    #[test]
    fn warnings_keep_required_flag_and_list_extras_by_name() {
        let r = results(vec![
            EvaluationResult::warning("zeta", &["slow"]),
            EvaluationResult::passed("security"),
            EvaluationResult::warning("drift", &["psi 0.18"]),
            EvaluationResult::passed("bias"),
            EvaluationResult::failed("alpha", &[]),
        ]);
        let d = decide(&candidate(), &policy(), &r, false).unwrap();
        assert_eq!(d.decision, GateDecisionKind::ApproveWithWarnings);
        assert!(d.required_checks_passed);
        assert_eq!(
            d.warnings,
            vec!["drift: psi 0.18", "alpha: check failed", "zeta: slow"]
        );
    }

    #[test]
    fn unclassified_check_is_policy_error() {
        let mut p = policy();
        p.checks.push(CheckRule::unclassified("cost"));
        let err = decide(&candidate(), &p, &BTreeMap::new(), false).unwrap_err();
        assert!(matches!(err, GovError::PolicyConfig(_)));
    }

    #[test]
    fn identical_inputs_serialize_identically() {
        let r = results(vec![
            EvaluationResult::failed("security", &["pii_leak"]).with_metric("score", 0.2),
            EvaluationResult::warning("drift", &[]),
        ]);
        let a = serde_json::to_vec(&decide(&candidate(), &policy(), &r, false).unwrap()).unwrap();
        let b = serde_json::to_vec(&decide(&candidate(), &policy(), &r, false).unwrap()).unwrap();
        assert_eq!(a, b);
    }
}
