use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of client-side request counters.
///
/// `attempted` counts logical operations; `retried` counts the extra sends
/// the retry policy made on their behalf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub attempted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

impl RequestStats {
    /// Percentage of attempted operations that succeeded, 0 when idle.
    pub fn success_rate(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.succeeded as f64 * 100.0 / self.attempted as f64
        }
    }
}

/// Counters are grouped into epochs. An operation records against the epoch
/// it started in, and outcomes from an earlier epoch are dropped so a
/// request straddling `reset` cannot push `succeeded` above `attempted`.
#[derive(Debug, Default)]
pub(crate) struct RequestCounters {
    epoch: AtomicU64,
    attempted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl RequestCounters {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch() == epoch
    }

    /// Count a new operation and return the epoch its outcome belongs to.
    pub(crate) fn record_attempt(&self) -> u64 {
        let epoch = self.epoch();
        self.attempted.fetch_add(1, Ordering::Relaxed);
        epoch
    }

    pub(crate) fn record_success(&self, epoch: u64) {
        if self.is_current(epoch) {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_failure(&self, epoch: u64) {
        if self.is_current(epoch) {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_retries(&self, epoch: u64, retries: u64) {
        if self.is_current(epoch) {
            self.retried.fetch_add(retries, Ordering::Relaxed);
        }
    }

    pub(crate) fn reset(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.attempted.store(0, Ordering::Relaxed);
        self.succeeded.store(0, Ordering::Relaxed);
        self.failed.store(0, Ordering::Relaxed);
        self.retried.store(0, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RequestStats {
        RequestStats {
            attempted: self.attempted.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
        }
    }
}
