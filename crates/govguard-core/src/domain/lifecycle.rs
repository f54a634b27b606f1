//! The release candidate state machine.
//!
//! ```text
//! CREATED → EVALUATING → GATING → APPROVED → DEPLOYING → DEPLOYED → ROLLED_BACK
//!                               ↘ BLOCKED
//! ```
//!
//! `BLOCKED` and `ROLLED_BACK` are terminal. `DEPLOYED` is terminal unless a
//! regression triggers a rollback.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a release candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    Created,
    Evaluating,
    Gating,
    Approved,
    Blocked,
    Deploying,
    Deployed,
    RolledBack,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::Evaluating => "EVALUATING",
            LifecycleState::Gating => "GATING",
            LifecycleState::Approved => "APPROVED",
            LifecycleState::Blocked => "BLOCKED",
            LifecycleState::Deploying => "DEPLOYING",
            LifecycleState::Deployed => "DEPLOYED",
            LifecycleState::RolledBack => "ROLLED_BACK",
        }
    }

    /// States reachable in one step from `self`.
    pub fn successors(&self) -> &'static [LifecycleState] {
        use LifecycleState::*;
        match self {
            Created => &[Evaluating],
            Evaluating => &[Gating],
            Gating => &[Approved, Blocked],
            Approved => &[Deploying],
            Deploying => &[Deployed],
            Deployed => &[RolledBack],
            Blocked | RolledBack => &[],
        }
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        self.successors().contains(&next)
    }

    /// No further transitions are accepted.
    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
