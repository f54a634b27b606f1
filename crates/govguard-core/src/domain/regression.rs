//! Post-deploy regression signals.

use serde::{Deserialize, Serialize};

/// A monitoring signal that a deployed candidate underperforms its baseline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionReport {
    pub metric: String,
    pub observed: f64,
    pub expected: f64,
    /// Which monitor raised the signal, if known.
    #[serde(default)]
    pub source: Option<String>,
}

impl RegressionReport {
    pub fn new(metric: &str, observed: f64, expected: f64) -> Self {
        Self {
            metric: metric.to_string(),
            observed,
            expected,
            source: None,
        }
    }

    /// Absolute distance between observed and expected values.
    pub fn magnitude(&self) -> f64 {
        (self.observed - self.expected).abs()
    }
}
