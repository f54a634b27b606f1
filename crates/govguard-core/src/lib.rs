//! GovGuard Core Library
//!
//! Event-driven coordination engine for release governance: candidates are
//! created, fanned out to evaluators, gated by policy, deployed by an external
//! actor and rolled back on regression signals.

pub mod bus;
pub mod coordinator;
pub mod domain;
pub mod engine;
pub mod events;
pub mod gatekeeper;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod policy;
pub mod registry;
pub mod rollback;
pub mod telemetry;

pub use domain::{
    ArtifactRef, ArtifactType, CandidateId, CheckStatus, Environment, EvaluationResult,
    GateDecision, GateDecisionKind, GovError, LifecycleState, Lineage, RegressionReport,
    ReleaseCandidate, Result,
};

pub use govguard_state::{
    fakes::MemorySnapshotStore, FsSnapshotStore, SnapshotRecord, SnapshotStore, StorageError,
};

pub use bus::{
    BusObserver, EventBus, EventSubscriber, ObserverToken, PublishReport, SubscriberFailure,
};
pub use coordinator::{EvaluationCoordinator, RecordOutcome};
pub use engine::{GovernanceEngine, GovernanceEngineBuilder, SimulatedDeployer};
pub use events::{ingest, topics, EventEnvelope, EventId, GovEvent};
pub use gatekeeper::decide;
pub use orchestrator::{Orchestrator, Outcome};
pub use policy::{
    CheckRule, PolicyConfig, PolicyProvider, RollbackSettings, Severity, StaticPolicyProvider,
    TierPolicy,
};
pub use registry::{CandidateRegistry, CandidateView};
pub use rollback::{RollbackOutcome, RollbackTrigger};

pub use metrics::METRICS;
pub use obs::{CandidateSpan, EventRecorder, TracingObserver};
pub use telemetry::init_tracing;

/// GovGuard version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
