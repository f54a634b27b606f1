//! Candidate registry: an arena of per-candidate entries.
//!
//! The map itself sits behind a short-lived async `RwLock`; each entry has its
//! own async `Mutex`, which is the per-candidate critical section. The map lock
//! is only held for lookup and insert, never while an entry is being worked on,
//! so candidates never wait on each other.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::domain::{
    CandidateId, EvaluationResult, GateDecision, GovError, LifecycleState, RegressionReport,
    ReleaseCandidate, Result,
};

/// Serializable copy of everything known about one candidate.
///
/// This is both the read-only view handed to callers and the payload
/// persisted in snapshots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateView {
    pub candidate: ReleaseCandidate,
    pub state: LifecycleState,
    /// Latest result per check name.
    #[serde(default)]
    pub results: BTreeMap<String, EvaluationResult>,
    #[serde(default)]
    pub decision: Option<GateDecision>,
    /// Every state the candidate has been in, oldest first.
    pub history: Vec<LifecycleState>,
    #[serde(default)]
    pub rollback_cause: Option<RegressionReport>,
    /// Set when gating ran on a forced (deadline) completion.
    #[serde(default)]
    pub forced_completion: bool,
}

impl CandidateView {
    /// Number of transitions applied so far.
    pub fn sequence(&self) -> u64 {
        self.history.len().saturating_sub(1) as u64
    }
}

/// Mutable per-candidate record. Only reachable through the entry lock.
#[derive(Debug)]
pub struct CandidateEntry {
    view: CandidateView,
}

impl CandidateEntry {
    fn new(candidate: ReleaseCandidate) -> Self {
        Self {
            view: CandidateView {
                candidate,
                state: LifecycleState::Created,
                results: BTreeMap::new(),
                decision: None,
                history: vec![LifecycleState::Created],
                rollback_cause: None,
                forced_completion: false,
            },
        }
    }

    /// Rebuild an entry from a persisted view.
    pub fn from_view(view: CandidateView) -> Result<Self> {
        if view.history.last() != Some(&view.state) {
            return Err(GovError::InvalidCandidate(format!(
                "snapshot for {} has a history that does not end in {}",
                view.candidate.candidate_id, view.state
            )));
        }
        Ok(Self { view })
    }

    pub fn id(&self) -> &CandidateId {
        &self.view.candidate.candidate_id
    }

    pub fn candidate(&self) -> &ReleaseCandidate {
        &self.view.candidate
    }

    pub fn state(&self) -> LifecycleState {
        self.view.state
    }

    pub fn results(&self) -> &BTreeMap<String, EvaluationResult> {
        &self.view.results
    }

    pub fn decision(&self) -> Option<&GateDecision> {
        self.view.decision.as_ref()
    }

    pub fn history(&self) -> &[LifecycleState] {
        &self.view.history
    }

    pub fn view(&self) -> CandidateView {
        self.view.clone()
    }

    /// Store a result, replacing any earlier one for the same check.
    pub fn record_result(&mut self, result: EvaluationResult) {
        self.view.results.insert(result.check_name.clone(), result);
    }

    /// Move from `expected` to `next`.
    ///
    /// Fails with `IllegalTransition` when the candidate is not in `expected`
    /// or the lifecycle does not allow the step; `event` names the cause in
    /// the error.
    pub fn advance(
        &mut self,
        expected: LifecycleState,
        next: LifecycleState,
        event: &str,
    ) -> Result<()> {
        if self.view.state != expected || !expected.can_transition_to(next) {
            return Err(GovError::IllegalTransition {
                candidate_id: self.id().clone(),
                state: self.view.state,
                event: event.to_string(),
            });
        }
        self.view.state = next;
        self.view.history.push(next);
        Ok(())
    }

    /// Attach the gate decision. Only the first one sticks.
    pub fn set_decision(&mut self, decision: GateDecision, forced: bool) -> bool {
        if self.view.decision.is_some() {
            return false;
        }
        self.view.decision = Some(decision);
        self.view.forced_completion = forced;
        true
    }

    pub fn set_rollback_cause(&mut self, report: RegressionReport) {
        self.view.rollback_cause = Some(report);
    }
}

/// Shared handle to one candidate's entry.
pub type EntryHandle = Arc<Mutex<CandidateEntry>>;

/// Arena of candidates keyed by id.
#[derive(Debug, Default)]
pub struct CandidateRegistry {
    entries: RwLock<HashMap<CandidateId, EntryHandle>>,
}

impl CandidateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entry in `CREATED` and return it already locked, so nobody
    /// else can observe it before the caller is done with it.
    ///
    /// Returns `None` if the id is already registered.
    pub async fn insert_new(
        &self,
        candidate: ReleaseCandidate,
    ) -> Option<OwnedMutexGuard<CandidateEntry>> {
        let id = candidate.candidate_id.clone();
        let handle = Arc::new(Mutex::new(CandidateEntry::new(candidate)));
        let guard = handle.clone().lock_owned().await;

        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            return None;
        }
        entries.insert(id, handle);
        Some(guard)
    }

    /// Insert a rebuilt entry. Returns `false` if the id is already registered.
    pub async fn insert_entry(&self, entry: CandidateEntry) -> bool {
        let id = entry.id().clone();
        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, Arc::new(Mutex::new(entry)));
        true
    }

    pub async fn entry(&self, id: &CandidateId) -> Option<EntryHandle> {
        self.entries.read().await.get(id).cloned()
    }

    /// Entry handle, or `UnknownCandidate`.
    pub async fn require(&self, id: &CandidateId) -> Result<EntryHandle> {
        self.entry(id)
            .await
            .ok_or_else(|| GovError::UnknownCandidate(id.clone()))
    }

    /// Cloned read-only snapshot of a candidate.
    pub async fn view(&self, id: &CandidateId) -> Option<CandidateView> {
        let handle = self.entry(id).await?;
        let entry = handle.lock().await;
        Some(entry.view())
    }

    /// All registered ids, sorted.
    pub async fn ids(&self) -> Vec<CandidateId> {
        let mut ids: Vec<_> = self.entries.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactRef, ArtifactType, Environment, Lineage};
    use chrono::Utc;

    fn candidate(id: &str) -> ReleaseCandidate {
        ReleaseCandidate::new(
            CandidateId::from(id),
            Environment::Prod,
            1,
            vec![ArtifactRef::new(ArtifactType::Prompt, "7", "sha256:01")],
            Lineage {
                source_revision: "abc".to_string(),
                data_snapshot_id: "snap".to_string(),
                schema_version: "1".to_string(),
                build_timestamp: Utc::now(),
            },
        )
    }

    #[tokio::test]
    async fn insert_new_rejects_duplicates() {
        let registry = CandidateRegistry::new();
        let guard = registry.insert_new(candidate("rc-1")).await;
        assert!(guard.is_some());
        drop(guard);
        assert!(registry.insert_new(candidate("rc-1")).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn advance_enforces_expected_state_and_table() {
        let registry = CandidateRegistry::new();
        let mut entry = registry.insert_new(candidate("rc-1")).await.unwrap();

        entry
            .advance(LifecycleState::Created, LifecycleState::Evaluating, "created")
            .unwrap();

        let err = entry
            .advance(LifecycleState::Created, LifecycleState::Evaluating, "created")
            .unwrap_err();
        assert!(matches!(err, GovError::IllegalTransition { state: LifecycleState::Evaluating, .. }));

        let err = entry
            .advance(LifecycleState::Evaluating, LifecycleState::Approved, "skip")
            .unwrap_err();
        assert!(matches!(err, GovError::IllegalTransition { .. }));
        assert_eq!(
            entry.history(),
            &[LifecycleState::Created, LifecycleState::Evaluating]
        );
        assert_eq!(entry.view().sequence(), 1);
    }

    #[tokio::test]
    async fn results_are_last_write_wins() {
        let registry = CandidateRegistry::new();
        let mut entry = registry.insert_new(candidate("rc-1")).await.unwrap();
        entry.record_result(EvaluationResult::failed("security", &["pii"]));
        entry.record_result(EvaluationResult::passed("security"));
        assert_eq!(entry.results().len(), 1);
        assert!(entry.results()["security"].findings.is_empty());
    }

    #[tokio::test]
    async fn view_and_ids() {
        let registry = CandidateRegistry::new();
        drop(registry.insert_new(candidate("b")).await);
        drop(registry.insert_new(candidate("a")).await);

        assert_eq!(
            registry.ids().await,
            vec![CandidateId::from("a"), CandidateId::from("b")]
        );
        let view = registry.view(&CandidateId::from("a")).await.unwrap();
        assert_eq!(view.state, LifecycleState::Created);
        assert!(registry.view(&CandidateId::from("zz")).await.is_none());
        assert!(matches!(
            registry.require(&CandidateId::from("zz")).await,
            Err(GovError::UnknownCandidate(_))
        ));
    }

    #[test]
    fn from_view_rejects_inconsistent_history() {
        let mut view = CandidateEntry::new(candidate("rc-1")).view();
        view.state = LifecycleState::Gating;
        assert!(CandidateEntry::from_view(view).is_err());
    }
}
