//! Bootstrap wiring: builds the bus, orchestrator and rollback trigger and
//! subscribes them to their topics.
//!
//! ```rust,ignore
//! let engine = GovernanceEngine::builder()
//!     .policy(Arc::new(StaticPolicyProvider::from_path(&path)?))
//!     .snapshot_store(Arc::new(FsSnapshotStore::new(dir)?))
//!     .simulate_deploy(true)
//!     .build()?;
//! engine.ingest(topics::RELEASE_CANDIDATE_CREATED, payload).await?;
//! ```

use std::sync::{Arc, Mutex, PoisonError, Weak};

use async_trait::async_trait;
use govguard_state::SnapshotStore;
use tracing::info;

use crate::bus::{EventBus, EventSubscriber, ObserverToken, PublishReport, SubscriptionToken};
use crate::domain::{GovError, Result};
use crate::events::{self, topics, DeployNotice, EventEnvelope, GovEvent};
use crate::obs::{emit_event_rejected, TracingObserver};
use crate::orchestrator::Orchestrator;
use crate::policy::{PolicyProvider, RollbackSettings};
use crate::rollback::RollbackTrigger;

/// Topics the orchestrator consumes.
pub const ORCHESTRATOR_TOPICS: [&str; 7] = [
    topics::RELEASE_CANDIDATE_CREATED,
    topics::EVAL_COMPLETED,
    topics::EVAL_FAILED,
    topics::EVAL_WARNING,
    topics::EVAL_DEADLINE_EXPIRED,
    topics::DEPLOY_STARTED,
    topics::DEPLOY_COMPLETED,
];

/// Builder for [`GovernanceEngine`].
#[derive(Default)]
pub struct GovernanceEngineBuilder {
    bus: Option<Arc<EventBus>>,
    policy: Option<Arc<dyn PolicyProvider>>,
    store: Option<Arc<dyn SnapshotStore>>,
    rollback: Option<RollbackSettings>,
    simulate_deploy: bool,
    without_tracing: bool,
}

impl GovernanceEngineBuilder {
    /// Use an existing bus instead of a fresh one.
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn policy(mut self, policy: Arc<dyn PolicyProvider>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn snapshot_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Pin the rollback settings instead of reading them from the policy
    /// provider on every regression.
    pub fn rollback_settings(mut self, settings: RollbackSettings) -> Self {
        self.rollback = Some(settings);
        self
    }

    /// Subscribe a [`SimulatedDeployer`] that deploys every approved candidate.
    pub fn simulate_deploy(mut self, enabled: bool) -> Self {
        self.simulate_deploy = enabled;
        self
    }

    /// Skip registering the [`TracingObserver`].
    pub fn without_tracing(mut self) -> Self {
        self.without_tracing = true;
        self
    }

    pub fn build(self) -> Result<GovernanceEngine> {
        let policy = self.policy.ok_or_else(|| {
            GovError::PolicyConfig("no policy provider configured".to_string())
        })?;
        let bus = self.bus.unwrap_or_default();
        let observer =
            (!self.without_tracing).then(|| bus.add_observer(Arc::new(TracingObserver)));

        let mut orchestrator = Orchestrator::new(bus.clone(), policy.clone());
        if let Some(store) = self.store {
            orchestrator = orchestrator.with_snapshot_store(store);
        }
        let orchestrator = Arc::new(orchestrator);
        let mut rollback = RollbackTrigger::new(orchestrator.clone(), policy);
        if let Some(settings) = self.rollback {
            rollback = rollback.with_settings(settings);
        }
        let rollback = Arc::new(rollback);

        let mut tokens = Vec::new();
        for topic in ORCHESTRATOR_TOPICS {
            tokens.push(bus.subscribe(topic, orchestrator.clone()));
        }
        tokens.push(bus.subscribe(topics::MONITORING_REGRESSION_DETECTED, rollback.clone()));
        if self.simulate_deploy {
            let deployer = Arc::new(SimulatedDeployer::new(&bus));
            tokens.push(bus.subscribe(topics::DEPLOY_APPROVED, deployer));
        }

        info!(
            event = "engine.started",
            subscriptions = tokens.len(),
            simulate_deploy = self.simulate_deploy,
        );
        Ok(GovernanceEngine {
            bus,
            orchestrator,
            rollback,
            tokens: Mutex::new(tokens),
            observer: Mutex::new(observer),
        })
    }
}

/// A fully wired governance core.
///
/// Dropping the engine unsubscribes its components from the bus.
pub struct GovernanceEngine {
    bus: Arc<EventBus>,
    orchestrator: Arc<Orchestrator>,
    rollback: Arc<RollbackTrigger>,
    tokens: Mutex<Vec<SubscriptionToken>>,
    observer: Mutex<Option<ObserverToken>>,
}

impl GovernanceEngine {
    pub fn builder() -> GovernanceEngineBuilder {
        GovernanceEngineBuilder::default()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn rollback_trigger(&self) -> &Arc<RollbackTrigger> {
        &self.rollback
    }

    /// Validate and publish a raw event from an external producer.
    pub async fn ingest(&self, topic: &str, payload: serde_json::Value) -> Result<PublishReport> {
        events::ingest(&self.bus, topic, payload).await
    }

    /// Publish a typed event.
    pub async fn publish(&self, event: &GovEvent) -> Result<PublishReport> {
        Ok(self.bus.publish(event.into_envelope()?).await)
    }

    /// Unsubscribe every component and detach the tracing observer. Returns
    /// how many subscriptions were removed.
    pub fn shutdown(&self) -> usize {
        if let Some(observer) = self
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            self.bus.remove_observer(&observer);
        }
        let tokens: Vec<_> = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let removed = tokens.iter().filter(|t| self.bus.unsubscribe(t)).count();
        if removed > 0 {
            info!(event = "engine.stopped", unsubscribed = removed);
        }
        removed
    }
}

impl Drop for GovernanceEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Stand-in deployer: answers `deploy.approved` with `deploy.started` and
/// `deploy.completed`, as an external deployment actor would.
pub struct SimulatedDeployer {
    bus: Weak<EventBus>,
}

impl SimulatedDeployer {
    pub fn new(bus: &Arc<EventBus>) -> Self {
        Self {
            bus: Arc::downgrade(bus),
        }
    }
}

#[async_trait]
impl EventSubscriber for SimulatedDeployer {
    fn name(&self) -> &str {
        "simulated-deployer"
    }

    async fn handle(&self, envelope: &EventEnvelope) -> Result<()> {
        let event = GovEvent::try_from(envelope).inspect_err(|e| {
            emit_event_rejected(&envelope.topic, e);
        })?;
        let GovEvent::DeployApproved(approved) = event else {
            return Ok(());
        };
        let Some(bus) = self.bus.upgrade() else {
            return Ok(());
        };

        info!(event = "deploy.simulated", candidate_id = %approved.candidate_id);
        let cause = Some(envelope.event_id);
        for event in [
            GovEvent::DeployStarted(DeployNotice::now(approved.candidate_id.clone())),
            GovEvent::DeployCompleted(DeployNotice::now(approved.candidate_id.clone())),
        ] {
            bus.publish(event.into_envelope()?.with_correlation(cause))
                .await;
        }
        Ok(())
    }
}
