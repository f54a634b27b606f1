//! Event contracts for the governance lifecycle.
//!
//! The bus carries [`EventEnvelope`]s with an opaque topic string and a JSON
//! payload. [`GovEvent`] is the closed set of events the engine understands,
//! one variant per topic; decoding an envelope into a `GovEvent` is where
//! malformed payloads are rejected, before any component logic sees them.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::bus::{EventBus, PublishReport};
use crate::domain::{
    CandidateId, CheckStatus, EvaluationResult, GateDecision, GovError, RegressionReport,
    ReleaseCandidate, Result,
};
use crate::obs::emit_event_rejected;

/// Topic names. Stable wire contract.
pub mod topics {
    pub const RELEASE_CANDIDATE_CREATED: &str = "release.candidate.created";
    pub const EVAL_STARTED: &str = "eval.started";
    pub const EVAL_COMPLETED: &str = "eval.completed";
    pub const EVAL_FAILED: &str = "eval.failed";
    pub const EVAL_WARNING: &str = "eval.warning";
    pub const EVAL_DEADLINE_EXPIRED: &str = "eval.deadline.expired";
    pub const GATE_DECISION_MADE: &str = "gate.decision.made";
    pub const DEPLOY_APPROVED: &str = "deploy.approved";
    pub const DEPLOY_BLOCKED: &str = "deploy.blocked";
    pub const DEPLOY_STARTED: &str = "deploy.started";
    pub const DEPLOY_COMPLETED: &str = "deploy.completed";
    pub const MONITORING_REGRESSION_DETECTED: &str = "monitoring.regression.detected";
    pub const DEPLOY_ROLLED_BACK: &str = "deploy.rolled_back";

    /// Every topic the engine knows how to decode.
    pub const ALL: [&str; 13] = [
        RELEASE_CANDIDATE_CREATED,
        EVAL_STARTED,
        EVAL_COMPLETED,
        EVAL_FAILED,
        EVAL_WARNING,
        EVAL_DEADLINE_EXPIRED,
        GATE_DECISION_MADE,
        DEPLOY_APPROVED,
        DEPLOY_BLOCKED,
        DEPLOY_STARTED,
        DEPLOY_COMPLETED,
        MONITORING_REGRESSION_DETECTED,
        DEPLOY_ROLLED_BACK,
    ];
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// A unique event ID (UUID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        EventId(Uuid::new_v4())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard envelope for everything that travels on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub topic: String,
    pub candidate_id: CandidateId,
    /// The event that caused this one, when there is one.
    #[serde(default)]
    pub correlation_id: Option<EventId>,
    pub created_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn new(topic: &str, candidate_id: CandidateId, payload: serde_json::Value) -> Self {
        Self {
            event_id: EventId::new(),
            topic: topic.to_string(),
            candidate_id,
            correlation_id: None,
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<EventId>) -> Self {
        self.correlation_id = correlation_id;
        self
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateCreated {
    pub candidate: ReleaseCandidate,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalStarted {
    pub candidate_id: CandidateId,
}

/// Payload shared by `eval.completed`, `eval.failed` and `eval.warning`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvalReport {
    pub candidate_id: CandidateId,
    pub check_name: String,
    /// Only meaningful on `eval.completed`; the other two topics imply it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckStatus>,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub findings: Vec<String>,
    /// Free-text cause (`eval.failed`) or warning (`eval.warning`).
    #[serde(default, alias = "warning", skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl EvalReport {
    pub fn from_result(candidate_id: CandidateId, result: &EvaluationResult) -> Self {
        Self {
            candidate_id,
            check_name: result.check_name.clone(),
            status: Some(result.status),
            metrics: result.metrics.clone(),
            findings: result.findings.clone(),
            reason: None,
        }
    }

    fn into_result(self, status: CheckStatus) -> EvaluationResult {
        let mut findings = self.findings;
        if let Some(reason) = self.reason {
            if !findings.contains(&reason) {
                findings.push(reason);
            }
        }
        EvaluationResult {
            check_name: self.check_name,
            status,
            metrics: self.metrics,
            findings,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeadlineExpired {
    pub candidate_id: CandidateId,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GateDecisionMade {
    pub decision: GateDecision,
}

/// Payload for `deploy.approved`, `deploy.started` and `deploy.completed`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployNotice {
    pub candidate_id: CandidateId,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl DeployNotice {
    pub fn now(candidate_id: CandidateId) -> Self {
        Self {
            candidate_id,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeployBlocked {
    pub candidate_id: CandidateId,
    pub reasons: Vec<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionDetected {
    pub candidate_id: CandidateId,
    pub report: RegressionReport,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RolledBack {
    pub candidate_id: CandidateId,
    /// The regression report that caused the rollback.
    pub cause: RegressionReport,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// CLOSED EVENT TYPE
// ============================================================================

/// Every event the governance engine produces or consumes, one variant per topic.
#[derive(Debug, Clone, PartialEq)]
pub enum GovEvent {
    CandidateCreated(CandidateCreated),
    EvalStarted(EvalStarted),
    EvalCompleted(EvalReport),
    EvalFailed(EvalReport),
    EvalWarning(EvalReport),
    DeadlineExpired(DeadlineExpired),
    GateDecisionMade(GateDecisionMade),
    DeployApproved(DeployNotice),
    DeployBlocked(DeployBlocked),
    DeployStarted(DeployNotice),
    DeployCompleted(DeployNotice),
    RegressionDetected(RegressionDetected),
    RolledBack(RolledBack),
}

impl GovEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            GovEvent::CandidateCreated(_) => topics::RELEASE_CANDIDATE_CREATED,
            GovEvent::EvalStarted(_) => topics::EVAL_STARTED,
            GovEvent::EvalCompleted(_) => topics::EVAL_COMPLETED,
            GovEvent::EvalFailed(_) => topics::EVAL_FAILED,
            GovEvent::EvalWarning(_) => topics::EVAL_WARNING,
            GovEvent::DeadlineExpired(_) => topics::EVAL_DEADLINE_EXPIRED,
            GovEvent::GateDecisionMade(_) => topics::GATE_DECISION_MADE,
            GovEvent::DeployApproved(_) => topics::DEPLOY_APPROVED,
            GovEvent::DeployBlocked(_) => topics::DEPLOY_BLOCKED,
            GovEvent::DeployStarted(_) => topics::DEPLOY_STARTED,
            GovEvent::DeployCompleted(_) => topics::DEPLOY_COMPLETED,
            GovEvent::RegressionDetected(_) => topics::MONITORING_REGRESSION_DETECTED,
            GovEvent::RolledBack(_) => topics::DEPLOY_ROLLED_BACK,
        }
    }

    pub fn candidate_id(&self) -> &CandidateId {
        match self {
            GovEvent::CandidateCreated(p) => &p.candidate.candidate_id,
            GovEvent::EvalStarted(p) => &p.candidate_id,
            GovEvent::EvalCompleted(p) | GovEvent::EvalFailed(p) | GovEvent::EvalWarning(p) => {
                &p.candidate_id
            }
            GovEvent::DeadlineExpired(p) => &p.candidate_id,
            GovEvent::GateDecisionMade(p) => &p.decision.candidate_id,
            GovEvent::DeployApproved(p)
            | GovEvent::DeployStarted(p)
            | GovEvent::DeployCompleted(p) => &p.candidate_id,
            GovEvent::DeployBlocked(p) => &p.candidate_id,
            GovEvent::RegressionDetected(p) => &p.candidate_id,
            GovEvent::RolledBack(p) => &p.candidate_id,
        }
    }

    /// The evaluation result carried by an `eval.*` event, with the status the
    /// topic implies.
    pub fn evaluation_result(&self) -> Option<EvaluationResult> {
        match self {
            GovEvent::EvalCompleted(p) => {
                let status = p.status.unwrap_or(CheckStatus::Passed);
                Some(p.clone().into_result(status))
            }
            GovEvent::EvalFailed(p) => Some(p.clone().into_result(CheckStatus::Failed)),
            GovEvent::EvalWarning(p) => Some(p.clone().into_result(CheckStatus::Warning)),
            _ => None,
        }
    }

    /// Serialize the variant's payload (the topic carries the discriminant).
    pub fn payload(&self) -> Result<serde_json::Value> {
        let value = match self {
            GovEvent::CandidateCreated(p) => serde_json::to_value(p)?,
            GovEvent::EvalStarted(p) => serde_json::to_value(p)?,
            GovEvent::EvalCompleted(p) | GovEvent::EvalFailed(p) | GovEvent::EvalWarning(p) => {
                serde_json::to_value(p)?
            }
            GovEvent::DeadlineExpired(p) => serde_json::to_value(p)?,
            GovEvent::GateDecisionMade(p) => serde_json::to_value(p)?,
            GovEvent::DeployApproved(p)
            | GovEvent::DeployStarted(p)
            | GovEvent::DeployCompleted(p) => serde_json::to_value(p)?,
            GovEvent::DeployBlocked(p) => serde_json::to_value(p)?,
            GovEvent::RegressionDetected(p) => serde_json::to_value(p)?,
            GovEvent::RolledBack(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    pub fn into_envelope(&self) -> Result<EventEnvelope> {
        Ok(EventEnvelope::new(
            self.topic(),
            self.candidate_id().clone(),
            self.payload()?,
        ))
    }

    /// Decode a raw topic + payload pair, rejecting unknown topics and
    /// payloads that miss or mistype required fields.
    pub fn from_parts(topic: &str, payload: &serde_json::Value) -> Result<Self> {
        let event = match topic {
            topics::RELEASE_CANDIDATE_CREATED => GovEvent::CandidateCreated(decode(topic, payload)?),
            topics::EVAL_STARTED => GovEvent::EvalStarted(decode(topic, payload)?),
            topics::EVAL_COMPLETED => GovEvent::EvalCompleted(decode(topic, payload)?),
            topics::EVAL_FAILED => GovEvent::EvalFailed(decode(topic, payload)?),
            topics::EVAL_WARNING => GovEvent::EvalWarning(decode(topic, payload)?),
            topics::EVAL_DEADLINE_EXPIRED => GovEvent::DeadlineExpired(decode(topic, payload)?),
            topics::GATE_DECISION_MADE => GovEvent::GateDecisionMade(decode(topic, payload)?),
            topics::DEPLOY_APPROVED => GovEvent::DeployApproved(decode(topic, payload)?),
            topics::DEPLOY_BLOCKED => GovEvent::DeployBlocked(decode(topic, payload)?),
            topics::DEPLOY_STARTED => GovEvent::DeployStarted(decode(topic, payload)?),
            topics::DEPLOY_COMPLETED => GovEvent::DeployCompleted(decode(topic, payload)?),
            topics::MONITORING_REGRESSION_DETECTED => {
                GovEvent::RegressionDetected(decode(topic, payload)?)
            }
            topics::DEPLOY_ROLLED_BACK => GovEvent::RolledBack(decode(topic, payload)?),
            other => return Err(GovError::UnknownTopic(other.to_string())),
        };

        if let GovEvent::EvalCompleted(p) | GovEvent::EvalFailed(p) | GovEvent::EvalWarning(p) =
            &event
        {
            if p.check_name.trim().is_empty() {
                return Err(malformed(topic, "check_name is empty"));
            }
        }
        if event.candidate_id().as_str().is_empty() {
            return Err(malformed(topic, "candidate_id is empty"));
        }
        Ok(event)
    }
}

impl TryFrom<&EventEnvelope> for GovEvent {
    type Error = GovError;

    fn try_from(envelope: &EventEnvelope) -> Result<Self> {
        let event = GovEvent::from_parts(&envelope.topic, &envelope.payload)?;
        if event.candidate_id() != &envelope.candidate_id {
            return Err(malformed(
                &envelope.topic,
                &format!(
                    "envelope candidate {} does not match payload candidate {}",
                    envelope.candidate_id,
                    event.candidate_id()
                ),
            ));
        }
        Ok(event)
    }
}

fn decode<T: DeserializeOwned>(topic: &str, payload: &serde_json::Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| malformed(topic, &e.to_string()))
}

fn malformed(topic: &str, reason: &str) -> GovError {
    GovError::MalformedEvent {
        topic: topic.to_string(),
        reason: reason.to_string(),
    }
}

/// Validating entry point for external producers.
///
/// Decodes `payload` against `topic`'s contract and publishes it only if it is
/// well formed. Rejections are logged and returned; nothing reaches a
/// subscriber.
pub async fn ingest(
    bus: &EventBus,
    topic: &str,
    payload: serde_json::Value,
) -> Result<PublishReport> {
    let event = match GovEvent::from_parts(topic, &payload) {
        Ok(event) => event,
        Err(e) => {
            emit_event_rejected(topic, &e);
            return Err(e);
        }
    };
    let envelope = EventEnvelope::new(topic, event.candidate_id().clone(), payload);
    Ok(bus.publish(envelope).await)
}
