//! Revalidation counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for every branch the coordinator and its deferred units take.
#[derive(Debug, Default)]
pub struct SwrMetrics {
    cold_misses: AtomicU64,
    fresh_hits: AtomicU64,
    stale_hits: AtomicU64,
    contended_hits: AtomicU64,
    revalidations_completed: AtomicU64,
    revalidations_skipped: AtomicU64,
    revalidation_failures: AtomicU64,
}

/// Point-in-time copy of [`SwrMetrics`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwrMetricsSnapshot {
    /// Entry absent; computed inline.
    pub cold_misses: u64,
    /// Entry present and fresh.
    pub fresh_hits: u64,
    /// Entry stale; this caller scheduled the revalidation.
    pub stale_hits: u64,
    /// Claim held elsewhere; cached value served as-is.
    pub contended_hits: u64,
    pub revalidations_completed: u64,
    /// Deferred unit ran after losing its claim.
    pub revalidations_skipped: u64,
    pub revalidation_failures: u64,
}

impl SwrMetricsSnapshot {
    /// Revalidations scheduled; equals stale hits.
    pub fn revalidations_scheduled(&self) -> u64 {
        self.stale_hits
    }
}

impl SwrMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_cold_miss(&self) {
        self.cold_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_fresh_hit(&self) {
        self.fresh_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_stale_hit(&self) {
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_contended_hit(&self) {
        self.contended_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.revalidations_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.revalidations_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.revalidation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SwrMetricsSnapshot {
        SwrMetricsSnapshot {
            cold_misses: self.cold_misses.load(Ordering::Relaxed),
            fresh_hits: self.fresh_hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            contended_hits: self.contended_hits.load(Ordering::Relaxed),
            revalidations_completed: self.revalidations_completed.load(Ordering::Relaxed),
            revalidations_skipped: self.revalidations_skipped.load(Ordering::Relaxed),
            revalidation_failures: self.revalidation_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = SwrMetrics::new();
        metrics.record_cold_miss();
        metrics.record_stale_hit();
        metrics.record_stale_hit();
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cold_misses, 1);
        assert_eq!(snapshot.revalidations_scheduled(), 2);
        assert_eq!(snapshot.revalidation_failures, 1);
        assert_eq!(snapshot.fresh_hits, 0);
    }

    #[test]
    fn test_snapshot_serializes_flat() {
        let metrics = SwrMetrics::new();
        metrics.record_contended_hit();

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["contended_hits"], 1);
        assert_eq!(json["revalidations_completed"], 0);
    }
}
