use std::sync::atomic::{AtomicU64, Ordering};

/// Publisher counters, updated by workers and the drain task.
#[derive(Debug, Default)]
pub struct PublishStats {
    published: AtomicU64,
    written: AtomicU64,
    dropped_full: AtomicU64,
    dropped_timeout: AtomicU64,
    dropped_closed: AtomicU64,
    write_failures: AtomicU64,
    lost: AtomicU64,
}

/// Point-in-time copy of [`PublishStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStatsSnapshot {
    /// Events accepted into the queue
    pub published: u64,
    /// Events the sink acknowledged
    pub written: u64,
    /// Events dropped because the queue was full (`drop_if_full`)
    pub dropped_full: u64,
    /// Events dropped after waiting out the publish timeout (`default`)
    pub dropped_timeout: u64,
    /// Events offered after the publisher closed
    pub dropped_closed: u64,
    /// Failed sink write attempts
    pub write_failures: u64,
    /// Queued events discarded after a failed write
    pub lost: u64,
}

impl PublishStatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_full + self.dropped_timeout + self.dropped_closed
    }
}

impl PublishStats {
    pub(crate) fn record_published(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self, count: usize) {
        self.written.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_full(&self) {
        self.dropped_full.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_timeout(&self) {
        self.dropped_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_closed(&self) {
        self.dropped_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write_failure(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lost(&self, count: usize) {
        self.lost.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PublishStatsSnapshot {
        PublishStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_timeout: self.dropped_timeout.load(Ordering::Relaxed),
            dropped_closed: self.dropped_closed.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }
}
