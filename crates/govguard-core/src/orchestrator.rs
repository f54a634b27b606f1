//! Release orchestrator: the single writer of candidate lifecycle state.
//!
//! Every inbound event is applied under the candidate's entry lock. Events the
//! step produces go into an outbox and are published only after the lock is
//! released, so subscribers can publish back into the bus without deadlocking
//! and lifecycle events leave in transition order.
//!
//! Transitions are keyed on the expected prior state. An event whose effect is
//! already reflected in the candidate's history is a no-op; an event that does
//! not apply in the current state is rejected with `IllegalTransition`.
//!
//! When a snapshot store is configured, the entry is persisted at every
//! transition while still locked. A failed save keeps the in-memory state and
//! the published events and is returned as `GovError::Snapshot`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use govguard_state::{SnapshotRecord, SnapshotStore, StorageError};
use tracing::{debug, info, Instrument};

use crate::bus::{EventBus, EventSubscriber};
use crate::coordinator::{missing_checks, EvaluationCoordinator, RecordOutcome};
use crate::domain::{
    CandidateId, CheckStatus, EvaluationResult, GateDecision, GovError, LifecycleState,
    RegressionReport, ReleaseCandidate, Result,
};
use crate::events::{
    topics, DeployBlocked, DeployNotice, EvalStarted, EventEnvelope, EventId, GateDecisionMade,
    GovEvent, RolledBack,
};
use crate::gatekeeper;
use crate::metrics::METRICS;
use crate::obs::{
    candidate_span, emit_candidate_created, emit_evaluation_forced, emit_evaluation_recorded,
    emit_event_rejected, emit_gate_decided, emit_policy_error, emit_rollback,
    emit_snapshot_failed, emit_transition, emit_transition_rejected,
};
use crate::policy::PolicyProvider;
use crate::registry::{CandidateEntry, CandidateRegistry, CandidateView, EntryHandle};

use LifecycleState::*;

/// What applying one event did to its candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The lifecycle moved from `from` to `to` (possibly through GATING).
    Transitioned {
        from: LifecycleState,
        to: LifecycleState,
    },
    /// An evaluation result was stored; the state did not change.
    Recorded { state: LifecycleState },
    /// Nothing changed; the event was a redelivery or already reflected.
    Unchanged { state: LifecycleState },
}

impl Outcome {
    /// State of the candidate after the event.
    pub fn state(&self) -> LifecycleState {
        match self {
            Outcome::Transitioned { to, .. } => *to,
            Outcome::Recorded { state } | Outcome::Unchanged { state } => *state,
        }
    }
}

/// Side effects collected under the entry lock.
#[derive(Default)]
struct Step {
    outbox: Vec<GovEvent>,
    snapshot_error: Option<GovError>,
}

/// Owns the candidate registry and drives every candidate through its lifecycle.
pub struct Orchestrator {
    bus: Arc<EventBus>,
    registry: CandidateRegistry,
    coordinator: EvaluationCoordinator,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl Orchestrator {
    pub fn new(bus: Arc<EventBus>, policy: Arc<dyn PolicyProvider>) -> Self {
        Self {
            bus,
            registry: CandidateRegistry::new(),
            coordinator: EvaluationCoordinator::new(policy),
            store: None,
        }
    }

    pub fn with_snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn registry(&self) -> &CandidateRegistry {
        &self.registry
    }

    // ------------------------------------------------------------------
    // Inbound events
    // ------------------------------------------------------------------

    /// Accept a new candidate and start its evaluation phase.
    ///
    /// A candidate id that is already registered is a no-op.
    pub async fn on_candidate_created(
        &self,
        candidate: ReleaseCandidate,
        cause: Option<EventId>,
    ) -> Result<Outcome> {
        if let Err(e) = candidate.validate() {
            emit_event_rejected(topics::RELEASE_CANDIDATE_CREATED, &e);
            return Err(e);
        }
        let id = candidate.candidate_id.clone();
        let environment = candidate.environment;
        let risk_tier = candidate.risk_tier;

        let Some(mut entry) = self.registry.insert_new(candidate).await else {
            let state = self.state(&id).await.unwrap_or(Created);
            debug!(event = "candidate.duplicate", candidate_id = %id, state = %state);
            return Ok(Outcome::Unchanged { state });
        };

        emit_candidate_created(&id, environment.as_str(), risk_tier);
        let mut step = Step::default();
        let outcome = self
            .transition(&mut entry, Created, Evaluating, topics::RELEASE_CANDIDATE_CREATED, &mut step)
            .await
            .map(|()| {
                step.outbox.push(GovEvent::EvalStarted(EvalStarted {
                    candidate_id: id.clone(),
                }));
                Outcome::Transitioned {
                    from: Created,
                    to: Evaluating,
                }
            });
        drop(entry);
        self.complete(step, cause, outcome).await
    }

    /// Record an evaluation result and gate the candidate once every required
    /// check has reported.
    pub async fn on_evaluation(
        &self,
        id: &CandidateId,
        result: EvaluationResult,
        cause: Option<EventId>,
    ) -> Result<Outcome> {
        let handle = self.lookup(id, eval_topic(result.status)).await?;
        let mut entry = handle.lock().await;
        let state = entry.state();

        if entry.results().get(&result.check_name) == Some(&result) {
            return Ok(Outcome::Unchanged { state });
        }
        emit_evaluation_recorded(id, &result.check_name, result.status, state);

        let mut step = Step::default();
        let outcome = match self.coordinator.record(&mut entry, result) {
            Ok(RecordOutcome::Complete) => self.gate(&mut entry, false, &mut step).await,
            Ok(RecordOutcome::Pending { missing }) => {
                debug!(event = "evaluation.pending", candidate_id = %id, missing = ?missing);
                self.save_snapshot(&entry, &mut step).await;
                Ok(Outcome::Recorded { state })
            }
            Ok(RecordOutcome::Late { state }) => {
                debug!(event = "evaluation.late", candidate_id = %id, state = %state);
                self.save_snapshot(&entry, &mut step).await;
                Ok(Outcome::Recorded { state })
            }
            Err(e) => {
                emit_policy_error(id, state, &e);
                self.save_snapshot(&entry, &mut step).await;
                Err(e)
            }
        };
        drop(entry);
        self.complete(step, cause, outcome).await
    }

    /// Deadline hook: gate an `EVALUATING` candidate with whatever has been
    /// recorded. Required checks that never reported count as missing.
    ///
    /// No-op in any later state.
    pub async fn force_completion(
        &self,
        id: &CandidateId,
        reason: &str,
        cause: Option<EventId>,
    ) -> Result<Outcome> {
        let handle = self.lookup(id, topics::EVAL_DEADLINE_EXPIRED).await?;
        let mut entry = handle.lock().await;
        let state = entry.state();
        if state != Evaluating {
            return Ok(Outcome::Unchanged { state });
        }

        let missing = match self.coordinator.tier_policy(&entry) {
            Ok(policy) => missing_checks(&entry, &policy),
            Err(e) => {
                emit_policy_error(id, state, &e);
                return Err(e);
            }
        };
        emit_evaluation_forced(id, reason, &missing);

        let mut step = Step::default();
        let outcome = self.gate(&mut entry, true, &mut step).await;
        drop(entry);
        self.complete(step, cause, outcome).await
    }

    /// Retry a step that stopped on a policy configuration error, typically
    /// after the policy has been reloaded.
    ///
    /// An `EVALUATING` candidate is gated if its required checks are now all
    /// recorded; a `GATING` candidate without a decision is gated again. Any
    /// other state is a no-op.
    pub async fn retry_gating(&self, id: &CandidateId) -> Result<Outcome> {
        let handle = self.registry.require(id).await?;
        let mut entry = handle.lock().await;
        let state = entry.state();

        let mut step = Step::default();
        let outcome = match state {
            Evaluating | Gating if entry.decision().is_none() => {
                let missing = match self.coordinator.tier_policy(&entry) {
                    Ok(policy) => missing_checks(&entry, &policy),
                    Err(e) => {
                        emit_policy_error(id, state, &e);
                        return Err(e);
                    }
                };
                if state == Evaluating && !missing.is_empty() {
                    return Ok(Outcome::Unchanged { state });
                }
                self.gate(&mut entry, !missing.is_empty(), &mut step).await
            }
            _ => return Ok(Outcome::Unchanged { state }),
        };
        drop(entry);
        self.complete(step, None, outcome).await
    }

    /// `deploy.started`: `APPROVED → DEPLOYING`.
    pub async fn on_deploy_started(
        &self,
        id: &CandidateId,
        cause: Option<EventId>,
    ) -> Result<Outcome> {
        self.external_step(id, Approved, Deploying, topics::DEPLOY_STARTED, cause)
            .await
    }

    /// `deploy.completed`: `DEPLOYING → DEPLOYED`.
    pub async fn on_deploy_completed(
        &self,
        id: &CandidateId,
        cause: Option<EventId>,
    ) -> Result<Outcome> {
        self.external_step(id, Deploying, Deployed, topics::DEPLOY_COMPLETED, cause)
            .await
    }

    /// `DEPLOYED → ROLLED_BACK`, publishing `deploy.rolled_back`.
    ///
    /// An already rolled back candidate is a no-op; any other state is an
    /// `IllegalTransition`. No policy is re-evaluated.
    pub async fn request_rollback(
        &self,
        id: &CandidateId,
        report: RegressionReport,
        cause: Option<EventId>,
    ) -> Result<Outcome> {
        let topic = topics::MONITORING_REGRESSION_DETECTED;
        let handle = self.lookup(id, topic).await?;
        let mut entry = handle.lock().await;
        let state = entry.state();
        if state == RolledBack {
            return Ok(Outcome::Unchanged { state });
        }
        if state == Deployed {
            entry.set_rollback_cause(report.clone());
        }

        let mut step = Step::default();
        let outcome = self
            .transition(&mut entry, Deployed, RolledBack, topic, &mut step)
            .await
            .map(|()| {
                METRICS.inc_rollbacks();
                emit_rollback(id, &report);
                step.outbox.push(GovEvent::RolledBack(RolledBack {
                    candidate_id: id.clone(),
                    cause: report,
                    timestamp: Utc::now(),
                }));
                Outcome::Transitioned {
                    from: Deployed,
                    to: RolledBack,
                }
            });
        drop(entry);
        self.complete(step, cause, outcome).await
    }

    /// Apply a decoded event. Topics the orchestrator does not consume
    /// return `Ok(None)`.
    pub async fn dispatch(&self, event: GovEvent, cause: Option<EventId>) -> Result<Option<Outcome>> {
        if let Some(result) = event.evaluation_result() {
            return self
                .on_evaluation(event.candidate_id(), result, cause)
                .await
                .map(Some);
        }
        let outcome = match event {
            GovEvent::CandidateCreated(p) => self.on_candidate_created(p.candidate, cause).await?,
            GovEvent::DeadlineExpired(p) => {
                self.force_completion(&p.candidate_id, &p.reason, cause)
                    .await?
            }
            GovEvent::DeployStarted(p) => self.on_deploy_started(&p.candidate_id, cause).await?,
            GovEvent::DeployCompleted(p) => {
                self.on_deploy_completed(&p.candidate_id, cause).await?
            }
            _ => return Ok(None),
        };
        Ok(Some(outcome))
    }

    /// Rebuild registry entries from stored snapshots. Candidates already in
    /// the registry are left alone. Returns how many entries were restored.
    pub async fn restore_from(&self, store: &dyn SnapshotStore) -> Result<usize> {
        let records = store.list().await.map_err(GovError::Restore)?;
        let mut restored = 0;
        for record in records {
            let view: CandidateView = serde_json::from_value(record.payload)?;
            if view.candidate.candidate_id.as_str() != record.candidate_id {
                return Err(GovError::InvalidCandidate(format!(
                    "snapshot {} holds candidate {}",
                    record.candidate_id, view.candidate.candidate_id
                )));
            }
            if self.registry.insert_entry(CandidateEntry::from_view(view)?).await {
                restored += 1;
            }
        }
        info!(event = "snapshot.restored", restored = restored);
        Ok(restored)
    }

    // ------------------------------------------------------------------
    // Read API
    // ------------------------------------------------------------------

    pub async fn state(&self, id: &CandidateId) -> Option<LifecycleState> {
        let handle = self.registry.entry(id).await?;
        let state = handle.lock().await.state();
        Some(state)
    }

    pub async fn candidate_view(&self, id: &CandidateId) -> Option<CandidateView> {
        self.registry.view(id).await
    }

    pub async fn decision(&self, id: &CandidateId) -> Option<GateDecision> {
        let handle = self.registry.entry(id).await?;
        let decision = handle.lock().await.decision().cloned();
        decision
    }

    pub async fn history(&self, id: &CandidateId) -> Option<Vec<LifecycleState>> {
        let handle = self.registry.entry(id).await?;
        let history = handle.lock().await.history().to_vec();
        Some(history)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn lookup(
        &self,
        id: &CandidateId,
        topic: &str,
    ) -> Result<EntryHandle> {
        self.registry.require(id).await.inspect_err(|e| {
            emit_event_rejected(topic, e);
        })
    }

    /// `EVALUATING|GATING → GATING → APPROVED|BLOCKED`, queueing the decision
    /// and the deploy notice. On a policy error the candidate stays in GATING.
    async fn gate(&self, entry: &mut CandidateEntry, forced: bool, step: &mut Step) -> Result<Outcome> {
        let from = entry.state();
        if from == Evaluating {
            self.transition(entry, Evaluating, Gating, "evaluation.complete", step)
                .await?;
        }

        let decided = self
            .coordinator
            .tier_policy(entry)
            .and_then(|policy| gatekeeper::decide(entry.candidate(), &policy, entry.results(), forced));
        let decision = match decided {
            Ok(decision) => decision,
            Err(e) => {
                emit_policy_error(entry.id(), entry.state(), &e);
                return Err(e);
            }
        };
        METRICS.inc_decision(decision.decision);
        emit_gate_decided(&decision, forced);

        let id = entry.id().clone();
        let (to, notice) = if decision.decision.is_approving() {
            (Approved, GovEvent::DeployApproved(DeployNotice::now(id)))
        } else {
            (
                Blocked,
                GovEvent::DeployBlocked(DeployBlocked {
                    candidate_id: id,
                    reasons: decision.reasons.clone(),
                    timestamp: Utc::now(),
                }),
            )
        };
        entry.set_decision(decision.clone(), forced);
        self.transition(entry, Gating, to, topics::GATE_DECISION_MADE, step)
            .await?;
        step.outbox
            .push(GovEvent::GateDecisionMade(GateDecisionMade { decision }));
        step.outbox.push(notice);
        Ok(Outcome::Transitioned { from, to })
    }

    /// Transition driven by an external actor's report. Redelivery after the
    /// candidate has already been through `next` is a no-op.
    async fn external_step(
        &self,
        id: &CandidateId,
        expected: LifecycleState,
        next: LifecycleState,
        topic: &str,
        cause: Option<EventId>,
    ) -> Result<Outcome> {
        let handle = self.lookup(id, topic).await?;
        let mut entry = handle.lock().await;
        let state = entry.state();
        if state != expected && entry.history().contains(&next) {
            return Ok(Outcome::Unchanged { state });
        }

        let mut step = Step::default();
        let outcome = self
            .transition(&mut entry, expected, next, topic, &mut step)
            .await
            .map(|()| Outcome::Transitioned {
                from: expected,
                to: next,
            });
        drop(entry);
        self.complete(step, cause, outcome).await
    }

    async fn transition(
        &self,
        entry: &mut CandidateEntry,
        from: LifecycleState,
        to: LifecycleState,
        event: &str,
        step: &mut Step,
    ) -> Result<()> {
        if let Err(e) = entry.advance(from, to, event) {
            METRICS.inc_rejected_transitions();
            emit_transition_rejected(entry.id(), entry.state(), event);
            return Err(e);
        }
        emit_transition(entry.id(), from, to);
        self.save_snapshot(entry, step).await;
        Ok(())
    }

    async fn save_snapshot(&self, entry: &CandidateEntry, step: &mut Step) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = write_snapshot(store.as_ref(), entry).await {
            emit_snapshot_failed(entry.id(), &e);
            step.snapshot_error.get_or_insert(e);
        }
    }

    /// Publish the outbox, then report the step's result. A step error wins
    /// over a snapshot error.
    async fn complete(
        &self,
        step: Step,
        cause: Option<EventId>,
        outcome: Result<Outcome>,
    ) -> Result<Outcome> {
        for event in step.outbox {
            let envelope = event.into_envelope()?.with_correlation(cause);
            self.bus.publish(envelope).await;
        }
        let outcome = outcome?;
        match step.snapshot_error {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }
}

async fn write_snapshot(store: &dyn SnapshotStore, entry: &CandidateEntry) -> Result<()> {
    let snapshot_error = |source: StorageError| GovError::Snapshot {
        candidate_id: entry.id().clone(),
        source,
    };
    let view = entry.view();
    let record = SnapshotRecord::new(
        entry.id().as_str(),
        entry.state().as_str(),
        entry.decision().map(|d| d.decision.as_str().to_string()),
        view.sequence(),
        serde_json::to_value(&view)?,
    )
    .map_err(snapshot_error)?;
    store.save(&record).await.map_err(snapshot_error)
}

fn eval_topic(status: CheckStatus) -> &'static str {
    match status {
        CheckStatus::Passed => topics::EVAL_COMPLETED,
        CheckStatus::Failed => topics::EVAL_FAILED,
        CheckStatus::Warning => topics::EVAL_WARNING,
    }
}

#[async_trait]
impl EventSubscriber for Orchestrator {
    fn name(&self) -> &str {
        "orchestrator"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let event = GovEvent::try_from(envelope).inspect_err(|e| {
            emit_event_rejected(&envelope.topic, e);
        })?;
        let span = candidate_span(event.candidate_id());
        self.dispatch(event, Some(envelope.event_id))
            .instrument(span)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactRef, ArtifactType, Environment, GateDecisionKind, Lineage};
    use crate::obs::EventRecorder;
    use crate::policy::{CheckRule, PolicyConfig, StaticPolicyProvider, TierPolicy};
    use govguard_state::fakes::MemorySnapshotStore;

    fn candidate(id: &str) -> ReleaseCandidate {
        ReleaseCandidate::new(
            CandidateId::from(id),
            Environment::Prod,
            1,
            vec![ArtifactRef::new(ArtifactType::Model, "3.1", "sha256:bb")],
            Lineage {
                source_revision: "abc".to_string(),
                data_snapshot_id: "snap".to_string(),
                schema_version: "1".to_string(),
                build_timestamp: Utc::now(),
            },
        )
    }

    fn setup() -> (Orchestrator, Arc<EventRecorder>) {
        let bus = Arc::new(EventBus::new());
        let recorder = Arc::new(EventRecorder::new());
        bus.add_observer(recorder.clone());
        let policy = PolicyConfig::default().with_tier(TierPolicy::new(
            Environment::Prod,
            1,
            vec![CheckRule::blocking("security"), CheckRule::non_blocking("drift")],
        ));
        let orchestrator = Orchestrator::new(bus, Arc::new(StaticPolicyProvider::new(policy)));
        (orchestrator, recorder)
    }

    #[tokio::test]
    async fn created_moves_to_evaluating_and_announces() {
        let (orch, recorder) = setup();
        let outcome = orch.on_candidate_created(candidate("rc-1"), None).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Transitioned {
                from: Created,
                to: Evaluating
            }
        );
        assert_eq!(recorder.topics(), vec![topics::EVAL_STARTED]);

        let again = orch.on_candidate_created(candidate("rc-1"), None).await.unwrap();
        assert_eq!(again, Outcome::Unchanged { state: Evaluating });
        assert_eq!(recorder.count(topics::EVAL_STARTED), 1);
    }

    #[tokio::test]
    async fn invalid_candidate_is_rejected() {
        let (orch, _) = setup();
        let mut c = candidate("rc-1");
        c.artifact_refs.clear();
        assert!(matches!(
            orch.on_candidate_created(c, None).await,
            Err(GovError::InvalidCandidate(_))
        ));
        assert!(orch.registry().is_empty().await);
    }

    #[tokio::test]
    async fn gating_happens_in_the_completing_step() {
        let (orch, recorder) = setup();
        let id = CandidateId::from("rc-1");
        orch.on_candidate_created(candidate("rc-1"), None).await.unwrap();

        let first = orch
            .on_evaluation(&id, EvaluationResult::passed("security"), None)
            .await
            .unwrap();
        assert_eq!(first, Outcome::Recorded { state: Evaluating });

        let second = orch
            .on_evaluation(&id, EvaluationResult::passed("drift"), None)
            .await
            .unwrap();
        assert_eq!(
            second,
            Outcome::Transitioned {
                from: Evaluating,
                to: Approved
            }
        );
        assert_eq!(
            orch.history(&id).await.unwrap(),
            vec![Created, Evaluating, Gating, Approved]
        );
        assert_eq!(
            recorder.topics(),
            vec![
                topics::EVAL_STARTED,
                topics::GATE_DECISION_MADE,
                topics::DEPLOY_APPROVED
            ]
        );
    }

    #[tokio::test]
    async fn unknown_candidate_is_rejected() {
        let (orch, _) = setup();
        let err = orch
            .on_evaluation(&CandidateId::from("ghost"), EvaluationResult::passed("security"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GovError::UnknownCandidate(_)));
    }

    #[tokio::test]
    async fn deploy_events_outside_their_state_are_illegal() {
        let (orch, _) = setup();
        let id = CandidateId::from("rc-1");
        orch.on_candidate_created(candidate("rc-1"), None).await.unwrap();

        let err = orch.on_deploy_completed(&id, None).await.unwrap_err();
        assert!(matches!(
            err,
            GovError::IllegalTransition {
                state: Evaluating,
                ..
            }
        ));
        assert_eq!(orch.state(&id).await, Some(Evaluating));
    }

    #[tokio::test]
    async fn deadline_forces_block_on_missing_blocking_check() {
        let (orch, recorder) = setup();
        let id = CandidateId::from("rc-1");
        orch.on_candidate_created(candidate("rc-1"), None).await.unwrap();
        orch.on_evaluation(&id, EvaluationResult::passed("drift"), None)
            .await
            .unwrap();

        let outcome = orch.force_completion(&id, "deadline", None).await.unwrap();
        assert_eq!(outcome.state(), Blocked);
        let decision = orch.decision(&id).await.unwrap();
        assert_eq!(decision.decision, GateDecisionKind::Block);
        assert_eq!(decision.reasons, vec!["security: no result reported"]);
        assert_eq!(recorder.count(topics::DEPLOY_BLOCKED), 1);

        let again = orch.force_completion(&id, "deadline", None).await.unwrap();
        assert_eq!(again, Outcome::Unchanged { state: Blocked });
    }

    #[tokio::test]
    async fn snapshot_failure_keeps_state_and_events() {
        let (orch, recorder) = setup();
        let store = Arc::new(MemorySnapshotStore::new());
        let orch = orch.with_snapshot_store(store.clone());
        store.set_unavailable(true);

        let err = orch
            .on_candidate_created(candidate("rc-1"), None)
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(orch.state(&CandidateId::from("rc-1")).await, Some(Evaluating));
        assert_eq!(recorder.count(topics::EVAL_STARTED), 1);

        store.set_unavailable(false);
        orch.on_evaluation(
            &CandidateId::from("rc-1"),
            EvaluationResult::passed("security"),
            None,
        )
        .await
        .unwrap();
        let saved = store.load("rc-1").await.unwrap().unwrap();
        assert_eq!(saved.state, "EVALUATING");
    }

    #[tokio::test]
    async fn restore_rebuilds_entries() {
        let store = Arc::new(MemorySnapshotStore::new());
        let (orch, _) = setup();
        let orch = orch.with_snapshot_store(store.clone());
        let id = CandidateId::from("rc-1");
        orch.on_candidate_created(candidate("rc-1"), None).await.unwrap();
        orch.on_evaluation(&id, EvaluationResult::passed("security"), None)
            .await
            .unwrap();
        orch.on_evaluation(&id, EvaluationResult::passed("drift"), None)
            .await
            .unwrap();

        let (fresh, _) = setup();
        assert_eq!(fresh.restore_from(store.as_ref()).await.unwrap(), 1);
        assert_eq!(fresh.state(&id).await, Some(Approved));
        assert_eq!(
            fresh.decision(&id).await.unwrap().decision,
            GateDecisionKind::Approve
        );
        assert_eq!(fresh.restore_from(store.as_ref()).await.unwrap(), 0);

        // Restored candidates continue their lifecycle.
        fresh.on_deploy_started(&id, None).await.unwrap();
        assert_eq!(fresh.state(&id).await, Some(Deploying));
    }
}
