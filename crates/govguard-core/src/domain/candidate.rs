//! Release candidates and the artifacts they bundle.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{GovError, Result};

/// Highest risk tier a policy can address.
pub const MAX_RISK_TIER: u8 = 2;

/// Opaque, globally unique candidate identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        CandidateId(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CandidateId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(s: &str) -> Self {
        CandidateId(s.to_string())
    }
}

impl From<String> for CandidateId {
    fn from(s: String) -> Self {
        CandidateId(s)
    }
}

/// Kinds of governed artifacts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactType {
    Model,
    Prompt,
    RetrievalConfig,
    Policy,
}

/// Reference to a governed artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRef {
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    pub version: String,
    /// Content digest of the artifact (opaque to the engine).
    pub digest: String,
}

impl ArtifactRef {
    pub fn new(artifact_type: ArtifactType, version: &str, digest: &str) -> Self {
        Self {
            artifact_type,
            version: version.to_string(),
            digest: digest.to_string(),
        }
    }
}

/// Deployment environment tag.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Stage,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Stage => "stage",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = GovError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "stage" | "staging" => Ok(Environment::Stage),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(GovError::InvalidCandidate(format!(
                "unknown environment: {other}"
            ))),
        }
    }
}

/// Where a candidate came from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lineage {
    /// Source control revision the artifacts were built from.
    pub source_revision: String,
    pub data_snapshot_id: String,
    pub schema_version: String,
    pub build_timestamp: DateTime<Utc>,
}

/// Candidate artifact bundle for evaluation and release gating.
///
/// Immutable once accepted by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReleaseCandidate {
    pub candidate_id: CandidateId,
    pub artifact_refs: Vec<ArtifactRef>,
    #[serde(default)]
    pub baseline_ref: Option<ArtifactRef>,
    #[serde(alias = "env")]
    pub environment: Environment,
    pub risk_tier: u8,
    pub lineage: Lineage,
}

impl ReleaseCandidate {
    pub fn new(
        candidate_id: CandidateId,
        environment: Environment,
        risk_tier: u8,
        artifact_refs: Vec<ArtifactRef>,
        lineage: Lineage,
    ) -> Self {
        Self {
            candidate_id,
            artifact_refs,
            baseline_ref: None,
            environment,
            risk_tier,
            lineage,
        }
    }

    pub fn with_baseline(mut self, baseline: ArtifactRef) -> Self {
        self.baseline_ref = Some(baseline);
        self
    }

    /// Check the structural rules a candidate must satisfy before it is accepted.
    ///
    /// Checks (in order):
    /// 1. `candidate_id` is non-empty.
    /// 2. At least one artifact reference.
    /// 3. Every artifact (and the baseline, if any) has a version and digest.
    /// 4. `risk_tier` is within `0..=MAX_RISK_TIER`.
    pub fn validate(&self) -> Result<()> {
        if self.candidate_id.as_str().trim().is_empty() {
            return Err(GovError::InvalidCandidate(
                "candidate_id is empty".to_string(),
            ));
        }
        if self.artifact_refs.is_empty() {
            return Err(GovError::InvalidCandidate(format!(
                "candidate {} has no artifact refs",
                self.candidate_id
            )));
        }
        for artifact in self.artifact_refs.iter().chain(self.baseline_ref.iter()) {
            if artifact.version.is_empty() || artifact.digest.is_empty() {
                return Err(GovError::InvalidCandidate(format!(
                    "candidate {} has an artifact ref without version or digest",
                    self.candidate_id
                )));
            }
        }
        if self.risk_tier > MAX_RISK_TIER {
            return Err(GovError::InvalidCandidate(format!(
                "risk tier {} exceeds maximum {}",
                self.risk_tier, MAX_RISK_TIER
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lineage() -> Lineage {
        Lineage {
            source_revision: "9f1c2e7".to_string(),
            data_snapshot_id: "snap-2024-05".to_string(),
            schema_version: "v3".to_string(),
            build_timestamp: Utc::now(),
        }
    }

    fn candidate(tier: u8) -> ReleaseCandidate {
        ReleaseCandidate::new(
            CandidateId::from("rc-1"),
            Environment::Prod,
            tier,
            vec![ArtifactRef::new(ArtifactType::Model, "1.4.0", "sha256:aa")],
            lineage(),
        )
    }

    #[test]
    fn valid_candidate_passes() {
        candidate(1).validate().unwrap();
    }

    #[test]
    fn risk_tier_out_of_range_rejected() {
        let err = candidate(3).validate().unwrap_err();
        assert!(matches!(err, GovError::InvalidCandidate(_)));
    }

    #[test]
    fn empty_artifacts_rejected() {
        let mut c = candidate(0);
        c.artifact_refs.clear();
        assert!(c.validate().is_err());
    }

    #[test]
    fn baseline_without_digest_rejected() {
        let c = candidate(0).with_baseline(ArtifactRef::new(ArtifactType::Model, "1.3.0", ""));
        assert!(c.validate().is_err());
    }

    #[test]
    fn env_alias_and_wire_names() {
        let json = serde_json::json!({
            "candidate_id": "rc-9",
            "artifact_refs": [{ "type": "RETRIEVAL_CONFIG", "version": "2", "digest": "d" }],
            "env": "stage",
            "risk_tier": 0,
            "lineage": {
                "source_revision": "abc",
                "data_snapshot_id": "s",
                "schema_version": "1",
                "build_timestamp": "2024-05-01T00:00:00Z"
            }
        });
        let c: ReleaseCandidate = serde_json::from_value(json).unwrap();
        assert_eq!(c.environment, Environment::Stage);
        assert_eq!(c.artifact_refs[0].artifact_type, ArtifactType::RetrievalConfig);
        assert!(c.baseline_ref.is_none());
    }

    #[test]
    fn environment_from_str_accepts_long_names() {
        assert_eq!("production".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("Staging".parse::<Environment>().unwrap(), Environment::Stage);
        assert!("qa".parse::<Environment>().is_err());
    }
}
