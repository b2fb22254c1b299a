//! Metrics registry for tessera
//!
//! - Counters only (no gauges, no histograms)
//! - Monotonic increase
//! - Reset only on process start
//! - Thread-safe but lock-minimal

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters shared by the coordinator and its workers.
///
/// All counters use Relaxed atomics; values are exact once the
/// incrementing threads have been joined.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Queries that produced a MasterPlan
    plans_built: AtomicU64,
    /// Queries rejected during planning or optimization
    queries_rejected: AtomicU64,
    /// Optimizer rewrites applied
    rewrites_applied: AtomicU64,
    /// Execution blocks handed to a dispatcher
    blocks_dispatched: AtomicU64,
    /// Execution blocks finished successfully
    blocks_completed: AtomicU64,
    /// Execution blocks that failed
    blocks_failed: AtomicU64,
    /// Index entries written by index builds
    index_entries_written: AtomicU64,
    /// Index lookups (equality or range) issued by scans
    index_lookups: AtomicU64,
    /// Tuples produced by scan operators
    tuples_scanned: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Planning

    pub fn increment_plans_built(&self) {
        self.plans_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_rewrites(&self, count: u64) {
        self.rewrites_applied.fetch_add(count, Ordering::Relaxed);
    }

    // Scheduling

    pub fn increment_blocks_dispatched(&self) {
        self.blocks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_blocks_completed(&self) {
        self.blocks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_blocks_failed(&self) {
        self.blocks_failed.fetch_add(1, Ordering::Relaxed);
    }

    // Index and scan

    pub fn add_index_entries(&self, count: u64) {
        self.index_entries_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_index_lookups(&self) {
        self.index_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_tuples_scanned(&self) {
        self.tuples_scanned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tuples_scanned(&self) -> u64 {
        self.tuples_scanned.load(Ordering::Relaxed)
    }

    /// Current values as a single-line JSON object
    pub fn to_json(&self) -> String {
        // Serialization of a plain struct of integers cannot fail
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            plans_built: self.plans_built.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            rewrites_applied: self.rewrites_applied.load(Ordering::Relaxed),
            blocks_dispatched: self.blocks_dispatched.load(Ordering::Relaxed),
            blocks_completed: self.blocks_completed.load(Ordering::Relaxed),
            blocks_failed: self.blocks_failed.load(Ordering::Relaxed),
            index_entries_written: self.index_entries_written.load(Ordering::Relaxed),
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            tuples_scanned: self.tuples_scanned.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub plans_built: u64,
    pub queries_rejected: u64,
    pub rewrites_applied: u64,
    pub blocks_dispatched: u64,
    pub blocks_completed: u64,
    pub blocks_failed: u64,
    pub index_entries_written: u64,
    pub index_lookups: u64,
    pub tuples_scanned: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_registry_has_zero_values() {
        let snapshot = MetricsRegistry::new().snapshot();
        assert_eq!(snapshot.plans_built, 0);
        assert_eq!(snapshot.blocks_dispatched, 0);
        assert_eq!(snapshot.tuples_scanned, 0);
    }

    #[test]
    fn test_increment_counters() {
        let registry = MetricsRegistry::new();

        registry.increment_plans_built();
        registry.add_rewrites(3);
        registry.increment_blocks_dispatched();
        registry.increment_blocks_dispatched();
        registry.increment_blocks_completed();
        registry.increment_blocks_failed();
        registry.add_index_entries(10_000);
        registry.increment_index_lookups();
        registry.increment_queries_rejected();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.plans_built, 1);
        assert_eq!(snapshot.rewrites_applied, 3);
        assert_eq!(snapshot.blocks_dispatched, 2);
        assert_eq!(snapshot.blocks_completed, 1);
        assert_eq!(snapshot.blocks_failed, 1);
        assert_eq!(snapshot.index_entries_written, 10_000);
        assert_eq!(snapshot.index_lookups, 1);
        assert_eq!(snapshot.queries_rejected, 1);
    }

    #[test]
    fn test_to_json() {
        let registry = MetricsRegistry::new();
        registry.add_rewrites(2);
        registry.increment_tuples_scanned();

        let parsed: serde_json::Value = serde_json::from_str(&registry.to_json()).unwrap();
        assert_eq!(parsed["rewrites_applied"], 2);
        assert_eq!(parsed["tuples_scanned"], 1);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let registry = Arc::new(MetricsRegistry::new());
        let mut handles = vec![];

        for _ in 0..10 {
            let reg = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    reg.increment_tuples_scanned();
                    reg.increment_index_lookups();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.tuples_scanned, 1000);
        assert_eq!(snapshot.index_lookups, 1000);
    }
}
