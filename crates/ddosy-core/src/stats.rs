//! Per-run emission counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Live counters for one run, shared with its dispatch tasks.
#[derive(Debug, Default)]
pub struct RunStats {
    emitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`RunStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStatsSnapshot {
    /// Requests handed to the transport.
    pub emitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    /// Emissions skipped because every dispatch slot was busy.
    pub dropped: u64,
}

impl RunStatsSnapshot {
    /// Dispatched requests that have not finished yet.
    pub fn in_flight(&self) -> u64 {
        self.emitted
            .saturating_sub(self.succeeded)
            .saturating_sub(self.failed)
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RunStatsSnapshot {
        RunStatsSnapshot {
            emitted: self.emitted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}
