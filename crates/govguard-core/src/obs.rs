//! Structured observability hooks for the governance lifecycle.
//!
//! This module provides:
//! - Candidate-scoped tracing spans via the `CandidateSpan` RAII guard
//! - Emission functions for key lifecycle events: candidate created,
//!   evaluation recorded, gate decided, transition rejected, rollback,
//!   snapshot failure
//! - Bus observers: [`TracingObserver`] logs every envelope and subscriber
//!   failure, [`EventRecorder`] keeps published envelopes in memory
//!
//! Events are emitted at `info!` level (rejections and failures at `warn!`).
//! Verbosity is controlled through `RUST_LOG`; see [`crate::telemetry`].

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::bus::{BusObserver, SubscriberFailure};
use crate::domain::{CandidateId, CheckStatus, GateDecision, LifecycleState, RegressionReport};
use crate::events::EventEnvelope;

/// Span tagging everything inside it with the candidate id.
///
/// Use with `tracing::Instrument` in async code; [`CandidateSpan`] is the
/// synchronous counterpart.
pub fn candidate_span(candidate_id: &CandidateId) -> tracing::Span {
    tracing::info_span!("govguard.candidate", candidate_id = %candidate_id)
}

/// RAII guard that enters a candidate-scoped tracing span.
///
/// # Example
///
/// ```ignore
/// let _span = CandidateSpan::enter(&candidate_id);
/// // All tracing calls are now associated with candidate_id
/// ```
pub struct CandidateSpan {
    _span: tracing::span::EnteredSpan,
}

impl CandidateSpan {
    pub fn enter(candidate_id: &CandidateId) -> Self {
        Self {
            _span: candidate_span(candidate_id).entered(),
        }
    }
}

/// Emit event: candidate accepted by the orchestrator.
pub fn emit_candidate_created(candidate_id: &CandidateId, environment: &str, risk_tier: u8) {
    info!(
        event = "candidate.created",
        candidate_id = %candidate_id,
        environment = %environment,
        risk_tier = risk_tier,
    );
}

/// Emit event: an evaluation result was stored for a candidate.
pub fn emit_evaluation_recorded(
    candidate_id: &CandidateId,
    check_name: &str,
    status: CheckStatus,
    state: LifecycleState,
) {
    info!(
        event = "evaluation.recorded",
        candidate_id = %candidate_id,
        check_name = %check_name,
        status = %status,
        state = %state,
    );
}

/// Emit event: lifecycle state changed.
pub fn emit_transition(candidate_id: &CandidateId, from: LifecycleState, to: LifecycleState) {
    info!(event = "candidate.transition", candidate_id = %candidate_id, from = %from, to = %to);
}

/// Emit event: gate decision produced.
pub fn emit_gate_decided(decision: &GateDecision, forced: bool) {
    info!(
        event = "gate.decided",
        candidate_id = %decision.candidate_id,
        decision = %decision.decision,
        required_checks_passed = decision.required_checks_passed,
        reasons = decision.reasons.len(),
        warnings = decision.warnings.len(),
        forced = forced,
    );
}

/// Emit event: an event was not applicable in the candidate's current state
/// (warning level).
pub fn emit_transition_rejected(candidate_id: &CandidateId, state: LifecycleState, event: &str) {
    warn!(
        event = "transition.rejected",
        candidate_id = %candidate_id,
        state = %state,
        rejected_event = %event,
    );
}

/// Emit event: gating could not produce a decision; the candidate stays put
/// (warning level).
pub fn emit_policy_error(candidate_id: &CandidateId, state: LifecycleState, error: &dyn std::fmt::Display) {
    warn!(event = "policy.error", candidate_id = %candidate_id, state = %state, error = %error);
}

/// Emit event: evaluation forced complete by a deadline.
pub fn emit_evaluation_forced(candidate_id: &CandidateId, reason: &str, missing: &[String]) {
    info!(
        event = "evaluation.forced",
        candidate_id = %candidate_id,
        reason = %reason,
        missing = ?missing,
    );
}

/// Emit event: candidate rolled back after a regression.
pub fn emit_rollback(candidate_id: &CandidateId, report: &RegressionReport) {
    info!(
        event = "candidate.rolled_back",
        candidate_id = %candidate_id,
        metric = %report.metric,
        observed = report.observed,
        expected = report.expected,
    );
}

/// Emit event: snapshot store call failed; in-memory state is kept (warning level).
pub fn emit_snapshot_failed(candidate_id: &CandidateId, error: &dyn std::fmt::Display) {
    warn!(event = "snapshot.failed", candidate_id = %candidate_id, error = %error);
}

/// Emit event: inbound event rejected at the validation boundary (warning level).
pub fn emit_event_rejected(topic: &str, error: &dyn std::fmt::Display) {
    warn!(event = "event.rejected", topic = %topic, error = %error);
}

/// Emit event: a subscriber returned an error or panicked (warning level).
pub fn emit_subscriber_failed(
    topic: &str,
    candidate_id: &CandidateId,
    subscriber: &str,
    failure: &dyn std::fmt::Display,
) {
    warn!(
        event = "subscriber.failed",
        topic = %topic,
        candidate_id = %candidate_id,
        subscriber = %subscriber,
        failure = %failure,
    );
}

// ---------------------------------------------------------------------------
// Bus observers
// ---------------------------------------------------------------------------

/// Logs every published envelope at `debug!` and every subscriber failure at `warn!`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl BusObserver for TracingObserver {
    fn on_published(&self, event: &EventEnvelope) {
        debug!(
            event = "bus.published",
            topic = %event.topic,
            candidate_id = %event.candidate_id,
            event_id = %event.event_id,
        );
    }

    fn on_subscriber_failed(
        &self,
        event: &EventEnvelope,
        subscriber: &str,
        failure: &SubscriberFailure,
    ) {
        emit_subscriber_failed(&event.topic, &event.candidate_id, subscriber, failure);
    }
}

/// Captures every published envelope in publish order.
///
/// Used by the CLI replay command and by tests asserting on the event stream.
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<EventEnvelope>>,
    failures: Mutex<Vec<(String, String, SubscriberFailure)>>,
}

impl EventRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded envelopes, oldest first.
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Topics of all recorded envelopes, oldest first.
    pub fn topics(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.topic.clone())
            .collect()
    }

    /// Topics recorded for one candidate, oldest first.
    pub fn topics_for(&self, candidate_id: &CandidateId) -> Vec<String> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| &e.candidate_id == candidate_id)
            .map(|e| e.topic.clone())
            .collect()
    }

    /// Number of recorded envelopes on `topic`.
    pub fn count(&self, topic: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.topic == topic)
            .count()
    }

    /// Subscriber failures as `(topic, subscriber, failure)`.
    pub fn failures(&self) -> Vec<(String, String, SubscriberFailure)> {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl BusObserver for EventRecorder {
    fn on_published(&self, event: &EventEnvelope) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn on_subscriber_failed(
        &self,
        event: &EventEnvelope,
        subscriber: &str,
        failure: &SubscriberFailure,
    ) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((event.topic.clone(), subscriber.to_string(), failure.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_span_create() {
        let _span = CandidateSpan::enter(&CandidateId::from("rc-1"));
    }

    #[test]
    fn recorder_keeps_publish_order_and_filters() {
        let recorder = EventRecorder::new();
        let a = CandidateId::from("a");
        let b = CandidateId::from("b");
        recorder.on_published(&EventEnvelope::new("x", a.clone(), serde_json::json!({})));
        recorder.on_published(&EventEnvelope::new("y", b.clone(), serde_json::json!({})));
        recorder.on_published(&EventEnvelope::new("x", a.clone(), serde_json::json!({})));

        assert_eq!(recorder.topics(), vec!["x", "y", "x"]);
        assert_eq!(recorder.topics_for(&b), vec!["y"]);
        assert_eq!(recorder.count("x"), 2);

        recorder.clear();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn recorder_captures_failures() {
        let recorder = EventRecorder::new();
        let env = EventEnvelope::new("x", CandidateId::from("a"), serde_json::json!({}));
        recorder.on_subscriber_failed(&env, "sub", &SubscriberFailure::Panic("p".to_string()));
        let failures = recorder.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1, "sub");
    }
}
