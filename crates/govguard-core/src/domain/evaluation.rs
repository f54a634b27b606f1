//! Evaluation results reported by external evaluators.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Status an evaluator reports for one check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckStatus {
    Passed,
    Failed,
    Warning,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CheckStatus::Passed => "PASSED",
            CheckStatus::Failed => "FAILED",
            CheckStatus::Warning => "WARNING",
        })
    }
}

/// One check's outcome for a candidate.
///
/// Unique per (candidate, check name); a later report for the same pair
/// replaces the earlier one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationResult {
    pub check_name: String,
    pub status: CheckStatus,
    /// Open-ended metrics. Kept sorted so serialization is stable.
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub findings: Vec<String>,
}

impl EvaluationResult {
    pub fn new(check_name: &str, status: CheckStatus) -> Self {
        Self {
            check_name: check_name.to_string(),
            status,
            metrics: BTreeMap::new(),
            findings: Vec::new(),
        }
    }

    pub fn passed(check_name: &str) -> Self {
        Self::new(check_name, CheckStatus::Passed)
    }

    pub fn failed(check_name: &str, findings: &[&str]) -> Self {
        Self::new(check_name, CheckStatus::Failed).with_findings(findings)
    }

    pub fn warning(check_name: &str, findings: &[&str]) -> Self {
        Self::new(check_name, CheckStatus::Warning).with_findings(findings)
    }

    pub fn with_findings(mut self, findings: &[&str]) -> Self {
        self.findings = findings.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_metric(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(name.to_string(), value.into());
        self
    }
}
