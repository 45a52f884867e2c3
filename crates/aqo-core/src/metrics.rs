//! Monotonic counters for predictor activity.
//!
//! Plain atomics behind a struct, not a full exporter: `aqo-server` is
//! where these get turned into a wire format, if at all.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time counter values, returned by [`Metrics::snapshot`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Predictions returned to a caller (refusal or not).
    pub predictions_served: u64,
    /// Predictions that refused (insufficient neighbors, disabled, etc.).
    pub predictions_refused: u64,
    /// Learn calls that resulted in a store mutation.
    pub learns_applied: u64,
    /// Learn calls resolved via the nudge branch.
    pub learns_nudged: u64,
    /// Learn calls resolved via the append branch.
    pub learns_appended: u64,
    /// Learn calls resolved via the K-full adjust branch.
    pub learns_adjusted: u64,
    /// Inserts rejected because a table was at capacity.
    pub table_full_events: u64,
    /// Writes rejected due to a `cols` mismatch (suspected fss collision).
    pub collisions: u64,
    /// Learning samples staged by the statement-timeout path.
    pub timeouts_staged: u64,
}

/// Atomic counters tracking predictor activity across its lifetime.
///
/// Intended to be held behind a single shared instance (e.g. inside
/// [`crate::store::Store`] or alongside it) and read via
/// [`Metrics::snapshot`] for introspection.
#[derive(Debug, Default)]
pub struct Metrics {
    predictions_served: AtomicU64,
    predictions_refused: AtomicU64,
    learns_applied: AtomicU64,
    learns_nudged: AtomicU64,
    learns_appended: AtomicU64,
    learns_adjusted: AtomicU64,
    table_full_events: AtomicU64,
    collisions: AtomicU64,
    timeouts_staged: AtomicU64,
}

impl Metrics {
    /// Creates a fresh, zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a prediction that returned a usable estimate.
    pub fn record_prediction_served(&self) {
        self.predictions_served.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a prediction that refused to estimate.
    pub fn record_prediction_refused(&self) {
        self.predictions_refused.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a learn call resolved via the nudge branch.
    pub fn record_learn_nudged(&self) {
        self.learns_applied.fetch_add(1, Ordering::Relaxed);
        self.learns_nudged.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a learn call resolved via the append branch.
    pub fn record_learn_appended(&self) {
        self.learns_applied.fetch_add(1, Ordering::Relaxed);
        self.learns_appended.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a learn call resolved via the K-full adjust branch.
    pub fn record_learn_adjusted(&self) {
        self.learns_applied.fetch_add(1, Ordering::Relaxed);
        self.learns_adjusted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an insert rejected because its table was at capacity.
    pub fn record_table_full(&self) {
        self.table_full_events.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a write rejected due to a `cols` mismatch.
    pub fn record_collision(&self) {
        self.collisions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a learning sample staged by the timeout path.
    pub fn record_timeout_staged(&self) {
        self.timeouts_staged.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            predictions_served: self.predictions_served.load(Ordering::Relaxed),
            predictions_refused: self.predictions_refused.load(Ordering::Relaxed),
            learns_applied: self.learns_applied.load(Ordering::Relaxed),
            learns_nudged: self.learns_nudged.load(Ordering::Relaxed),
            learns_appended: self.learns_appended.load(Ordering::Relaxed),
            learns_adjusted: self.learns_adjusted.load(Ordering::Relaxed),
            table_full_events: self.table_full_events.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            timeouts_staged: self.timeouts_staged.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let m = Metrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn nudge_counts_both_applied_and_nudged() {
        let m = Metrics::new();
        m.record_learn_nudged();
        let s = m.snapshot();
        assert_eq!(s.learns_applied, 1);
        assert_eq!(s.learns_nudged, 1);
        assert_eq!(s.learns_appended, 0);
    }

    #[test]
    fn counters_are_independent() {
        let m = Metrics::new();
        m.record_prediction_served();
        m.record_prediction_refused();
        m.record_table_full();
        m.record_collision();
        m.record_timeout_staged();
        let s = m.snapshot();
        assert_eq!(s.predictions_served, 1);
        assert_eq!(s.predictions_refused, 1);
        assert_eq!(s.table_full_events, 1);
        assert_eq!(s.collisions, 1);
        assert_eq!(s.timeouts_staged, 1);
        assert_eq!(s.learns_applied, 0);
    }
}
