//! Rollback trigger: turns post-deploy regression signals into rollbacks.
//!
//! A hard trigger, not a decision: no policy is re-evaluated. Only a
//! `DEPLOYED` candidate can be rolled back, and only once; duplicate signals
//! from several monitors collapse into a single `deploy.rolled_back`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, Instrument};

use crate::bus::EventSubscriber;
use crate::domain::{CandidateId, GovError, LifecycleState, RegressionReport, Result};
use crate::events::{EventEnvelope, EventId, GovEvent};
use crate::obs::{candidate_span, emit_event_rejected};
use crate::orchestrator::{Orchestrator, Outcome};
use crate::policy::{PolicyProvider, RollbackSettings};

/// What a regression signal led to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RollbackOutcome {
    /// The candidate moved `DEPLOYED → ROLLED_BACK`.
    RolledBack,
    /// The candidate is not deployed; nothing changed.
    NotApplicable { state: LifecycleState },
    /// The candidate was already rolled back; nothing changed.
    AlreadyRolledBack,
    /// The regression is no larger than the configured threshold.
    BelowThreshold { magnitude: f64 },
}

pub struct RollbackTrigger {
    orchestrator: Arc<Orchestrator>,
    policy: Arc<dyn PolicyProvider>,
    pinned: Option<RollbackSettings>,
}

impl RollbackTrigger {
    /// Settings are read from `policy` on every regression, so a reloaded
    /// threshold applies to the next report.
    pub fn new(orchestrator: Arc<Orchestrator>, policy: Arc<dyn PolicyProvider>) -> Self {
        Self {
            orchestrator,
            policy,
            pinned: None,
        }
    }

    /// Use fixed settings and ignore the provider's.
    pub fn with_settings(mut self, settings: RollbackSettings) -> Self {
        self.pinned = Some(settings);
        self
    }

    /// Settings in effect right now.
    pub fn settings(&self) -> RollbackSettings {
        self.pinned.unwrap_or_else(|| self.policy.rollback_settings())
    }

    /// React to a regression report for `candidate_id`.
    pub async fn on_regression(
        &self,
        candidate_id: &CandidateId,
        report: RegressionReport,
    ) -> Result<RollbackOutcome> {
        self.handle_regression(candidate_id, report, None).await
    }

    async fn handle_regression(
        &self,
        candidate_id: &CandidateId,
        report: RegressionReport,
        cause: Option<EventId>,
    ) -> Result<RollbackOutcome> {
        if let Some(threshold) = self.settings().min_regression_delta {
            let magnitude = report.magnitude();
            if magnitude <= threshold {
                debug!(
                    event = "regression.below_threshold",
                    candidate_id = %candidate_id,
                    metric = %report.metric,
                    magnitude = magnitude,
                    threshold = threshold,
                );
                return Ok(RollbackOutcome::BelowThreshold { magnitude });
            }
        }

        match self
            .orchestrator
            .request_rollback(candidate_id, report, cause)
            .await
        {
            Ok(Outcome::Transitioned { .. }) => Ok(RollbackOutcome::RolledBack),
            Ok(_) => Ok(RollbackOutcome::AlreadyRolledBack),
            Err(GovError::IllegalTransition { state, .. }) => {
                Ok(RollbackOutcome::NotApplicable { state })
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EventSubscriber for RollbackTrigger {
    fn name(&self) -> &str {
        "rollback-trigger"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let event = GovEvent::try_from(envelope).inspect_err(|e| {
            emit_event_rejected(&envelope.topic, e);
        })?;
        let GovEvent::RegressionDetected(detected) = event else {
            return Ok(());
        };
        let span = candidate_span(&detected.candidate_id);
        self.handle_regression(&detected.candidate_id, detected.report, Some(envelope.event_id))
            .instrument(span)
            .await
            .map(|_| ())
    }
}
