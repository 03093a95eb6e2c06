//! Pipeline statistics.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters shared by the handle, both workers and the loader.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Submissions accepted into the ingestion queue
    pub submitted: AtomicU64,

    /// Actions fully persisted (counter, index, value)
    pub persisted: AtomicU64,

    /// Actions that completed with an error
    pub failed: AtomicU64,

    /// Completion callbacks invoked
    pub callbacks_fired: AtomicU64,

    /// `load_values` calls that completed
    pub loads: AtomicU64,

    /// Value blobs returned by loads
    pub values_loaded: AtomicU64,

    /// Index members whose value had already expired
    pub values_missing: AtomicU64,

    /// Index members removed by pruning
    pub index_pruned: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback(&self) {
        self.callbacks_fired.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished load.
    pub fn record_load(&self, values: u64, missing: u64, pruned: u64) {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.values_loaded.fetch_add(values, Ordering::Relaxed);
        self.values_missing.fetch_add(missing, Ordering::Relaxed);
        self.index_pruned.fetch_add(pruned, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            callbacks_fired: self.callbacks_fired.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            values_loaded: self.values_loaded.load(Ordering::Relaxed),
            values_missing: self.values_missing.load(Ordering::Relaxed),
            index_pruned: self.index_pruned.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`PipelineStats`] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStatsSnapshot {
    pub submitted: u64,
    pub persisted: u64,
    pub failed: u64,
    pub callbacks_fired: u64,
    pub loads: u64,
    pub values_loaded: u64,
    pub values_missing: u64,
    pub index_pruned: u64,
}

impl PipelineStatsSnapshot {
    /// Submissions whose callback has not fired yet.
    pub fn in_flight(&self) -> u64 {
        self.submitted.saturating_sub(self.callbacks_fired)
    }
}
