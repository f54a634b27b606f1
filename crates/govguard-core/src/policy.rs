//! Policy configuration: which checks are required for an (environment,
//! risk tier) pair and how severe each one is.
//!
//! Policies are plain TOML:
//!
//! ```toml
//! [[tiers]]
//! environment = "prod"
//! risk_tier = 2
//! checks = [
//!   { name = "security", severity = "blocking" },
//!   { name = "drift", severity = "non_blocking" },
//! ]
//!
//! [rollback]
//! min_regression_delta = 0.05
//! ```
//!
//! A check without a `severity` is accepted at load time and rejected by the
//! gatekeeper when it is asked to decide with it.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::domain::{Environment, GovError, Result, MAX_RISK_TIER};

/// How a failing or missing required check affects the decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// FAILED or MISSING blocks the release.
    Blocking,
    /// FAILED or MISSING only produces a warning.
    NonBlocking,
}

/// One required check in a tier policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckRule {
    pub name: String,
    #[serde(default)]
    pub severity: Option<Severity>,
}

impl CheckRule {
    pub fn blocking(name: &str) -> Self {
        Self {
            name: name.to_string(),
            severity: Some(Severity::Blocking),
        }
    }

    pub fn non_blocking(name: &str) -> Self {
        Self {
            name: name.to_string(),
            severity: Some(Severity::NonBlocking),
        }
    }

    /// A rule with no severity classification.
    pub fn unclassified(name: &str) -> Self {
        Self {
            name: name.to_string(),
            severity: None,
        }
    }
}

/// Required checks for one (environment, risk tier) pair, in declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TierPolicy {
    pub environment: Environment,
    pub risk_tier: u8,
    pub checks: Vec<CheckRule>,
}

impl TierPolicy {
    pub fn new(environment: Environment, risk_tier: u8, checks: Vec<CheckRule>) -> Self {
        Self {
            environment,
            risk_tier,
            checks,
        }
    }

    /// Names of the required checks, in declaration order.
    pub fn required_names(&self) -> impl Iterator<Item = &str> {
        self.checks.iter().map(|c| c.name.as_str())
    }

    pub fn is_required(&self, check_name: &str) -> bool {
        self.checks.iter().any(|c| c.name == check_name)
    }
}

/// Rollback tuning.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RollbackSettings {
    /// Regressions whose |observed − expected| is no larger than this are
    /// ignored.
    /// Unset means every report triggers a rollback.
    #[serde(default)]
    pub min_regression_delta: Option<f64>,
}

/// A complete policy file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyConfig {
    #[serde(default)]
    pub tiers: Vec<TierPolicy>,
    #[serde(default)]
    pub rollback: RollbackSettings,
}

impl PolicyConfig {
    /// Parse and validate a TOML policy document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: PolicyConfig =
            toml::from_str(s).map_err(|e| GovError::PolicyConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML policy file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn with_tier(mut self, tier: TierPolicy) -> Self {
        self.tiers.push(tier);
        self
    }

    pub fn with_rollback(mut self, rollback: RollbackSettings) -> Self {
        self.rollback = rollback;
        self
    }

    /// Structural checks:
    /// 1. No (environment, risk tier) pair declared twice.
    /// 2. Risk tiers within range.
    /// 3. Every tier names at least one check, each name non-empty and unique.
    /// 4. `min_regression_delta`, when set, is finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for tier in &self.tiers {
            let label = format!("{}/{}", tier.environment, tier.risk_tier);
            if !seen.insert((tier.environment, tier.risk_tier)) {
                return Err(GovError::PolicyConfig(format!(
                    "tier {label} declared more than once"
                )));
            }
            if tier.risk_tier > MAX_RISK_TIER {
                return Err(GovError::PolicyConfig(format!(
                    "tier {label} exceeds maximum risk tier {MAX_RISK_TIER}"
                )));
            }
            if tier.checks.is_empty() {
                return Err(GovError::PolicyConfig(format!(
                    "tier {label} has no required checks"
                )));
            }
            let mut names = HashSet::new();
            for check in &tier.checks {
                if check.name.trim().is_empty() {
                    return Err(GovError::PolicyConfig(format!(
                        "tier {label} has a check with an empty name"
                    )));
                }
                if !names.insert(check.name.as_str()) {
                    return Err(GovError::PolicyConfig(format!(
                        "tier {label} lists check {} more than once",
                        check.name
                    )));
                }
            }
        }
        if let Some(delta) = self.rollback.min_regression_delta {
            if !delta.is_finite() || delta < 0.0 {
                return Err(GovError::PolicyConfig(format!(
                    "min_regression_delta must be a non-negative number, got {delta}"
                )));
            }
        }
        Ok(())
    }

    /// Look up the tier policy for an (environment, risk tier) pair.
    pub fn tier(&self, environment: Environment, risk_tier: u8) -> Option<&TierPolicy> {
        self.tiers
            .iter()
            .find(|t| t.environment == environment && t.risk_tier == risk_tier)
    }
}

/// Source of tier policies for the engine.
pub trait PolicyProvider: Send + Sync {
    /// Required checks for `(environment, risk_tier)`, or
    /// `GovError::PolicyConfig` when none is configured.
    fn tier_policy(&self, environment: Environment, risk_tier: u8) -> Result<TierPolicy>;

    fn rollback_settings(&self) -> RollbackSettings {
        RollbackSettings::default()
    }
}

/// In-memory provider backed by a [`PolicyConfig`], swappable at runtime.
#[derive(Debug, Default)]
pub struct StaticPolicyProvider {
    config: RwLock<PolicyConfig>,
}

impl StaticPolicyProvider {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Ok(Self::new(PolicyConfig::load(path)?))
    }

    /// Replace the active configuration. Decisions already made are unaffected.
    pub fn reload(&self, config: PolicyConfig) -> Result<()> {
        config.validate()?;
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        tracing::info!(event = "policy.reloaded");
        Ok(())
    }

    /// Re-read the policy file. On error the previous configuration stays active.
    pub fn reload_from_path(&self, path: &Path) -> Result<()> {
        let config = PolicyConfig::load(path)?;
        self.reload(config)
    }

    pub fn snapshot(&self) -> PolicyConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PolicyProvider for StaticPolicyProvider {
    fn tier_policy(&self, environment: Environment, risk_tier: u8) -> Result<TierPolicy> {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tier(environment, risk_tier)
            .cloned()
            .ok_or_else(|| {
                GovError::PolicyConfig(format!(
                    "no policy configured for {environment}/{risk_tier}"
                ))
            })
    }

    fn rollback_settings(&self) -> RollbackSettings {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .rollback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [[tiers]]
        environment = "prod"
        risk_tier = 2
        checks = [
          { name = "security", severity = "blocking" },
          { name = "drift", severity = "non_blocking" },
        ]

        [[tiers]]
        environment = "dev"
        risk_tier = 0
        checks = [{ name = "security" }]

        [rollback]
        min_regression_delta = 0.05
    "#;

    #[test]
    fn parses_sample_policy() {
        let config = PolicyConfig::from_toml_str(SAMPLE).unwrap();
        let prod = config.tier(Environment::Prod, 2).unwrap();
        assert_eq!(
            prod.required_names().collect::<Vec<_>>(),
            vec!["security", "drift"]
        );
        assert_eq!(prod.checks[1].severity, Some(Severity::NonBlocking));
        assert_eq!(config.tier(Environment::Dev, 0).unwrap().checks[0].severity, None);
        assert_eq!(config.rollback.min_regression_delta, Some(0.05));
    }

    #[test]
    fn duplicate_tier_rejected() {
        let config = PolicyConfig::default()
            .with_tier(TierPolicy::new(Environment::Prod, 1, vec![CheckRule::blocking("a")]))
            .with_tier(TierPolicy::new(Environment::Prod, 1, vec![CheckRule::blocking("b")]));
        assert!(matches!(config.validate(), Err(GovError::PolicyConfig(_))));
    }

    #[test]
    fn duplicate_check_rejected() {
        let config = PolicyConfig::default().with_tier(TierPolicy::new(
            Environment::Stage,
            0,
            vec![CheckRule::blocking("a"), CheckRule::non_blocking("a")],
        ));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn empty_checks_rejected() {
        let config =
            PolicyConfig::default().with_tier(TierPolicy::new(Environment::Dev, 0, Vec::new()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn negative_delta_rejected() {
        let config = PolicyConfig::default().with_rollback(RollbackSettings {
            min_regression_delta: Some(-1.0),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_toml_is_policy_error() {
        let err = PolicyConfig::from_toml_str("tiers = 3").unwrap_err();
        assert!(matches!(err, GovError::PolicyConfig(_)));
    }

    #[test]
    fn provider_reports_missing_tier() {
        let provider = StaticPolicyProvider::new(PolicyConfig::from_toml_str(SAMPLE).unwrap());
        assert!(provider.tier_policy(Environment::Prod, 2).is_ok());
        let err = provider.tier_policy(Environment::Stage, 1).unwrap_err();
        assert!(err.to_string().contains("stage/1"));
    }

    #[test]
    fn reload_swaps_config_and_keeps_old_on_error() {
        let provider = StaticPolicyProvider::default();
        assert!(provider.tier_policy(Environment::Dev, 0).is_err());

        provider
            .reload(PolicyConfig::from_toml_str(SAMPLE).unwrap())
            .unwrap();
        assert!(provider.tier_policy(Environment::Dev, 0).is_ok());

        let bad =
            PolicyConfig::default().with_tier(TierPolicy::new(Environment::Dev, 0, Vec::new()));
        assert!(provider.reload(bad).is_err());
        assert!(provider.tier_policy(Environment::Dev, 0).is_ok());
        assert_eq!(
            provider.rollback_settings().min_regression_delta,
            Some(0.05)
        );
    }

    #[test]
    fn reload_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let provider = StaticPolicyProvider::default();
        provider.reload_from_path(&path).unwrap();
        assert!(provider.tier_policy(Environment::Prod, 2).is_ok());

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            provider.reload_from_path(&missing),
            Err(GovError::Io(_))
        ));
    }
}
