//! GovGuard CLI
//!
//! The `govguard` command drives the governance engine from files.
//!
//! ## Commands
//!
//! - `check-policy`: Validate a policy file and summarize its tiers
//! - `decide`: Run the gatekeeper on a candidate and a set of results
//! - `replay`: Feed a recorded event stream through a fully wired engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

use govguard_core::{
    decide, CandidateId, CandidateSpan, EvaluationResult, EventBus, EventRecorder,
    FsSnapshotStore, GateDecision, GovernanceEngine, PolicyConfig, ReleaseCandidate, Severity,
    StaticPolicyProvider, METRICS,
};

#[derive(Parser)]
#[command(name = "govguard")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release governance for model, prompt and retrieval-config changes", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a policy file
    CheckPolicy {
        /// Path to the policy TOML file
        path: PathBuf,
    },

    /// Decide a single candidate from files, without running the engine
    Decide {
        /// Path to the policy TOML file
        #[arg(short, long)]
        policy: PathBuf,

        /// Path to the release candidate (JSON)
        #[arg(short, long)]
        candidate: PathBuf,

        /// Path to a JSON array of evaluation results
        #[arg(short, long)]
        results: PathBuf,

        /// Treat missing required checks as a forced completion
        #[arg(long)]
        forced: bool,
    },

    /// Replay a JSON array of `{ "topic", "payload" }` events through the engine
    Replay {
        /// Path to the policy TOML file
        #[arg(short, long)]
        policy: PathBuf,

        /// Path to the recorded events (JSON)
        #[arg(short, long)]
        events: PathBuf,

        /// Persist candidate snapshots here and resume from them
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,

        /// Answer every approval with a simulated deployment
        #[arg(long)]
        simulate_deploy: bool,

        /// Summary format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    govguard_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::CheckPolicy { path } => cmd_check_policy(&path),
        Commands::Decide {
            policy,
            candidate,
            results,
            forced,
        } => cmd_decide(&policy, &candidate, &results, forced),
        Commands::Replay {
            policy,
            events,
            snapshot_dir,
            simulate_deploy,
            format,
        } => {
            cmd_replay(
                &policy,
                &events,
                snapshot_dir.as_deref(),
                simulate_deploy,
                format,
            )
            .await
        }
    }
}

// ---------------------------------------------------------------------------
// check-policy
// ---------------------------------------------------------------------------

fn cmd_check_policy(path: &Path) -> Result<()> {
    let config = load_policy(path)?;
    print!("{}", render_policy_summary(&config));
    Ok(())
}

fn load_policy(path: &Path) -> Result<PolicyConfig> {
    PolicyConfig::load(path).with_context(|| format!("Invalid policy file: {:?}", path))
}

/// Checks that load fine but will fail gating because they carry no severity.
fn unclassified_checks(config: &PolicyConfig) -> Vec<String> {
    config
        .tiers
        .iter()
        .flat_map(|tier| {
            tier.checks
                .iter()
                .filter(|c| c.severity.is_none())
                .map(move |c| format!("{}/{}: {}", tier.environment, tier.risk_tier, c.name))
        })
        .collect()
}

fn render_policy_summary(config: &PolicyConfig) -> String {
    let mut out = format!("Policy OK: {} tier(s)\n", config.tiers.len());
    for tier in &config.tiers {
        let checks: Vec<String> = tier
            .checks
            .iter()
            .map(|c| match c.severity {
                Some(Severity::Blocking) => format!("{} (blocking)", c.name),
                Some(Severity::NonBlocking) => format!("{} (non-blocking)", c.name),
                None => format!("{} (UNCLASSIFIED)", c.name),
            })
            .collect();
        out.push_str(&format!(
            "  {}/{}: {}\n",
            tier.environment,
            tier.risk_tier,
            checks.join(", ")
        ));
    }
    if let Some(delta) = config.rollback.min_regression_delta {
        out.push_str(&format!("  rollback: min_regression_delta = {delta}\n"));
    }
    let unclassified = unclassified_checks(config);
    if !unclassified.is_empty() {
        out.push_str(&format!(
            "Warning: {} check(s) have no severity and will stop gating: {}\n",
            unclassified.len(),
            unclassified.join(", ")
        ));
    }
    out
}

// ---------------------------------------------------------------------------
// decide
// ---------------------------------------------------------------------------

fn cmd_decide(policy: &Path, candidate: &Path, results: &Path, forced: bool) -> Result<()> {
    let config = load_policy(policy)?;
    let candidate: ReleaseCandidate = read_json_file(candidate)?;
    let results: Vec<EvaluationResult> = read_json_file(results)?;

    let decision = decide_offline(&config, &candidate, results, forced)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn decide_offline(
    config: &PolicyConfig,
    candidate: &ReleaseCandidate,
    results: Vec<EvaluationResult>,
    forced: bool,
) -> Result<GateDecision> {
    candidate.validate()?;
    let _span = CandidateSpan::enter(&candidate.candidate_id);
    let tier = config
        .tier(candidate.environment, candidate.risk_tier)
        .with_context(|| {
            format!(
                "No policy for {}/{}",
                candidate.environment, candidate.risk_tier
            )
        })?;

    // Later results for the same check replace earlier ones.
    let results: BTreeMap<String, EvaluationResult> = results
        .into_iter()
        .map(|r| (r.check_name.clone(), r))
        .collect();

    let decision = decide(candidate, tier, &results, forced)?;
    info!(
        event = "cli.decided",
        candidate_id = %candidate.candidate_id,
        decision = %decision.decision,
    );
    Ok(decision)
}

// ---------------------------------------------------------------------------
// replay
// ---------------------------------------------------------------------------

/// One recorded event.
#[derive(Debug, Clone, Deserialize)]
struct RecordedEvent {
    topic: String,
    payload: Value,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct CandidateSummary {
    candidate_id: String,
    state: String,
    decision: Option<String>,
    reasons: Vec<String>,
    warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
struct ReplaySummary {
    ingested: usize,
    rejected: usize,
    subscriber_failures: usize,
    restored: usize,
    published: BTreeMap<String, usize>,
    candidates: Vec<CandidateSummary>,
}

async fn cmd_replay(
    policy: &Path,
    events: &Path,
    snapshot_dir: Option<&Path>,
    simulate_deploy: bool,
    format: OutputFormat,
) -> Result<()> {
    let config = load_policy(policy)?;
    let events: Vec<RecordedEvent> = read_json_file(events)?;

    let summary = replay(config, &events, snapshot_dir, simulate_deploy).await?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print!("{}", render_replay_text(&summary)),
    }
    METRICS.flush();
    Ok(())
}

async fn replay(
    config: PolicyConfig,
    events: &[RecordedEvent],
    snapshot_dir: Option<&Path>,
    simulate_deploy: bool,
) -> Result<ReplaySummary> {
    let bus = Arc::new(EventBus::new());
    let recorder = Arc::new(EventRecorder::new());
    bus.add_observer(recorder.clone());

    let mut builder = GovernanceEngine::builder()
        .bus(bus)
        .policy(Arc::new(StaticPolicyProvider::new(config)))
        .simulate_deploy(simulate_deploy);
    let store = match snapshot_dir {
        Some(dir) => {
            let store = Arc::new(
                FsSnapshotStore::new(dir)
                    .with_context(|| format!("Failed to open snapshot dir: {:?}", dir))?,
            );
            builder = builder.snapshot_store(store.clone());
            Some(store)
        }
        None => None,
    };
    let engine = builder.build().context("Failed to build engine")?;

    let mut summary = ReplaySummary::default();
    if let Some(store) = &store {
        summary.restored = engine
            .orchestrator()
            .restore_from(store.as_ref())
            .await
            .context("Failed to restore snapshots")?;
    }

    for (index, event) in events.iter().enumerate() {
        match engine.ingest(&event.topic, event.payload.clone()).await {
            Ok(report) => {
                summary.ingested += 1;
                summary.subscriber_failures += report.failed;
            }
            Err(e) => {
                warn!(event = "cli.event_rejected", index = index, topic = %event.topic, error = %e);
                summary.rejected += 1;
            }
        }
    }

    for event in recorder.events() {
        *summary.published.entry(event.topic).or_default() += 1;
    }
    for id in engine.orchestrator().registry().ids().await {
        summary.candidates.push(candidate_summary(&engine, &id).await);
    }
    Ok(summary)
}

async fn candidate_summary(engine: &GovernanceEngine, id: &CandidateId) -> CandidateSummary {
    let orchestrator = engine.orchestrator();
    let state = orchestrator
        .state(id)
        .await
        .map(|s| s.to_string())
        .unwrap_or_default();
    let decision = orchestrator.decision(id).await;
    CandidateSummary {
        candidate_id: id.to_string(),
        state,
        decision: decision.as_ref().map(|d| d.decision.to_string()),
        reasons: decision
            .as_ref()
            .map(|d| d.reasons.clone())
            .unwrap_or_default(),
        warnings: decision.map(|d| d.warnings).unwrap_or_default(),
    }
}

fn render_replay_text(summary: &ReplaySummary) -> String {
    let mut out = format!(
        "Replayed {} event(s): {} rejected, {} subscriber failure(s)",
        summary.ingested + summary.rejected,
        summary.rejected,
        summary.subscriber_failures
    );
    if summary.restored > 0 {
        out.push_str(&format!(", {} candidate(s) restored", summary.restored));
    }
    out.push('\n');

    for candidate in &summary.candidates {
        let decision = candidate.decision.as_deref().unwrap_or("-");
        out.push_str(&format!(
            "  {:<24} {:<12} {}\n",
            truncate(&candidate.candidate_id, 24),
            candidate.state,
            decision
        ));
        for reason in &candidate.reasons {
            out.push_str(&format!("      reason:  {reason}\n"));
        }
        for warning in &candidate.warnings {
            out.push_str(&format!("      warning: {warning}\n"));
        }
    }
    out
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read JSON file: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {:?}", path))
}
