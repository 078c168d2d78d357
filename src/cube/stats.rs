use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BuildSnapshot {
    pub elapsed_millis: u64,
    pub queries_issued: u64,
    pub queries_failed: u64,
    pub slices_retained: u64,
    pub values_pruned: u64,
    pub levels_built: u64,
}

/// Counters shared by the builder and its query tasks.
pub struct BuildStats {
    start_time: Instant,
    queries_issued: AtomicU64,
    queries_failed: AtomicU64,
    slices_retained: AtomicU64,
    values_pruned: AtomicU64,
    levels_built: AtomicU64,
}

impl BuildStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            queries_issued: AtomicU64::new(0),
            queries_failed: AtomicU64::new(0),
            slices_retained: AtomicU64::new(0),
            values_pruned: AtomicU64::new(0),
            levels_built: AtomicU64::new(0),
        }
    }

    pub fn query_issued(&self) {
        self.queries_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn query_failed(&self) {
        self.queries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn slices_retained(&self, count: u64) {
        self.slices_retained.fetch_add(count, Ordering::Relaxed);
    }

    pub fn values_pruned(&self, count: u64) {
        self.values_pruned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn level_built(&self) {
        self.levels_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BuildSnapshot {
        BuildSnapshot {
            elapsed_millis: self.start_time.elapsed().as_millis() as u64,
            queries_issued: self.queries_issued.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            slices_retained: self.slices_retained.load(Ordering::Relaxed),
            values_pruned: self.values_pruned.load(Ordering::Relaxed),
            levels_built: self.levels_built.load(Ordering::Relaxed),
        }
    }
}
