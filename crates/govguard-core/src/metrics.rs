//! Global atomic counters for GovGuard observability.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (e.g. at the end of a replay or on shutdown).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::GateDecisionKind;

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Lightweight atomic counters, no allocations and no locking.
pub struct Metrics {
    events_published: AtomicU64,
    subscriber_failures: AtomicU64,
    decisions_approve: AtomicU64,
    decisions_block: AtomicU64,
    decisions_warn: AtomicU64,
    rollbacks: AtomicU64,
    rejected_transitions: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            events_published: AtomicU64::new(0),
            subscriber_failures: AtomicU64::new(0),
            decisions_approve: AtomicU64::new(0),
            decisions_block: AtomicU64::new(0),
            decisions_warn: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            rejected_transitions: AtomicU64::new(0),
        }
    }

    pub fn inc_events_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "events_published", "counter incremented");
    }

    pub fn inc_subscriber_failures(&self) {
        self.subscriber_failures.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "subscriber_failures", "counter incremented");
    }

    /// Count one gate decision under its kind.
    pub fn inc_decision(&self, kind: GateDecisionKind) {
        let counter = match kind {
            GateDecisionKind::Approve => &self.decisions_approve,
            GateDecisionKind::Block => &self.decisions_block,
            GateDecisionKind::ApproveWithWarnings => &self.decisions_warn,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "decisions", decision = %kind, "counter incremented");
    }

    pub fn inc_rollbacks(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rollbacks", "counter incremented");
    }

    pub fn inc_rejected_transitions(&self) {
        self.rejected_transitions.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "rejected_transitions", "counter incremented");
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call this at natural boundaries rather than on every increment.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            events_published = self.events_published(),
            subscriber_failures = self.subscriber_failures(),
            decisions_approve = self.decisions(GateDecisionKind::Approve),
            decisions_block = self.decisions(GateDecisionKind::Block),
            decisions_warn = self.decisions(GateDecisionKind::ApproveWithWarnings),
            rollbacks = self.rollbacks(),
            rejected_transitions = self.rejected_transitions(),
        );
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    pub fn subscriber_failures(&self) -> u64 {
        self.subscriber_failures.load(Ordering::Relaxed)
    }

    pub fn decisions(&self, kind: GateDecisionKind) -> u64 {
        match kind {
            GateDecisionKind::Approve => self.decisions_approve.load(Ordering::Relaxed),
            GateDecisionKind::Block => self.decisions_block.load(Ordering::Relaxed),
            GateDecisionKind::ApproveWithWarnings => self.decisions_warn.load(Ordering::Relaxed),
        }
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.load(Ordering::Relaxed)
    }

    pub fn rejected_transitions(&self) -> u64 {
        self.rejected_transitions.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.events_published,
            &self.subscriber_failures,
            &self.decisions_approve,
            &self.decisions_block,
            &self.decisions_warn,
            &self.rollbacks,
            &self.rejected_transitions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let m = Metrics::new();
        assert_eq!(m.events_published(), 0);
        m.inc_events_published();
        m.inc_events_published();
        assert_eq!(m.events_published(), 2);

        m.inc_decision(GateDecisionKind::Block);
        m.inc_decision(GateDecisionKind::ApproveWithWarnings);
        m.inc_decision(GateDecisionKind::ApproveWithWarnings);
        assert_eq!(m.decisions(GateDecisionKind::Block), 1);
        assert_eq!(m.decisions(GateDecisionKind::ApproveWithWarnings), 2);
        assert_eq!(m.decisions(GateDecisionKind::Approve), 0);

        m.inc_rollbacks();
        assert_eq!(m.rollbacks(), 1);
    }

    #[test]
    fn reset_zeroes_all() {
        let m = Metrics::new();
        m.inc_events_published();
        m.inc_subscriber_failures();
        m.inc_rejected_transitions();
        m.inc_decision(GateDecisionKind::Approve);
        m.reset();
        assert_eq!(m.events_published(), 0);
        assert_eq!(m.subscriber_failures(), 0);
        assert_eq!(m.rejected_transitions(), 0);
        assert_eq!(m.decisions(GateDecisionKind::Approve), 0);
    }
}
