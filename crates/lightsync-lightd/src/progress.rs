//! Sync progress with scan rate and ETA
//!
//! The rate counts only time spent streaming, so refresh-interval sleeps do
//! not drag it down.

use crate::state::SyncStatus;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Point-in-time copy of [`SyncProgress`]
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    /// Height the wallet reports
    pub current_height: u64,
    /// Tip of the current pass
    pub target_height: u64,
    /// Engine status
    pub status: SyncStatus,
    /// Completion percentage since tracking started
    pub percentage: f64,
    /// Scan rate
    pub blocks_per_second: f64,
    /// Estimated seconds remaining
    pub eta_seconds: Option<u64>,
    /// Batches streamed
    pub batches: u64,
    /// Blocks the wallet rejected
    pub ingest_failures: u64,
}

/// Progress shared between the engine task and observers
#[derive(Debug, Clone, Default)]
pub struct SyncProgress {
    counters: Arc<RwLock<Counters>>,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    origin: u64,
    current: u64,
    target: u64,
    status: SyncStatus,
    batches: u64,
    ingest_failures: u64,
    streaming: Duration,
}

impl Counters {
    fn percentage(&self) -> f64 {
        if self.target == 0 {
            return 0.0;
        }
        if self.current >= self.target {
            return 100.0;
        }
        let span = self.target.saturating_sub(self.origin);
        if span == 0 {
            return 0.0;
        }
        self.current.saturating_sub(self.origin) as f64 * 100.0 / span as f64
    }

    fn rate(&self) -> f64 {
        let secs = self.streaming.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.current.saturating_sub(self.origin) as f64 / secs
    }

    fn eta_seconds(&self) -> Option<u64> {
        let rate = self.rate();
        (rate > 0.0).then(|| (self.target.saturating_sub(self.current) as f64 / rate) as u64)
    }
}

impl SyncProgress {
    /// Empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset and measure from `height`
    pub fn start(&self, height: u64) {
        let mut counters = self.counters.write();
        *counters = Counters {
            origin: height,
            current: height,
            target: counters.target.max(height),
            status: counters.status,
            ..Counters::default()
        };
    }

    /// Wallet height outside a batch (e.g. on convergence)
    pub fn set_current(&self, height: u64) {
        self.counters.write().current = height;
    }

    /// Tip observed by the current pass
    pub fn set_target(&self, height: u64) {
        self.counters.write().target = height;
    }

    /// Mirror the engine status
    pub fn set_status(&self, status: SyncStatus) {
        self.counters.write().status = status;
    }

    /// Account one streamed batch
    pub fn record_batch(&self, scanned_height: u64, ingest_failures: u64, took: Duration) {
        let mut counters = self.counters.write();
        counters.current = scanned_height;
        counters.batches += 1;
        counters.ingest_failures += ingest_failures;
        counters.streaming += took;
    }

    /// Percent of the distance from the start height to the target
    pub fn percentage(&self) -> f64 {
        self.counters.read().percentage()
    }

    /// Engine status as last mirrored
    pub fn status(&self) -> SyncStatus {
        self.counters.read().status
    }

    /// Copy everything under one lock
    pub fn snapshot(&self) -> ProgressSnapshot {
        let counters = self.counters.read();
        ProgressSnapshot {
            current_height: counters.current,
            target_height: counters.target,
            status: counters.status,
            percentage: counters.percentage(),
            blocks_per_second: counters.rate(),
            eta_seconds: counters.eta_seconds(),
            batches: counters.batches,
            ingest_failures: counters.ingest_failures,
        }
    }
}
