//! Metrics for vortex endpoints.
//!
//! Lightweight counters kept per shared ring buffer reference

use std::sync::atomic::{ AtomicU64, Ordering };

pub struct Metrics {
    pub published: AtomicU64,
    pub processed: AtomicU64,
    pub ignored: AtomicU64,
    pub replayed: AtomicU64,
    pub backpressure_events: AtomicU64,
    pub timeouts: AtomicU64,
    pub reconfigurations: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            published: AtomicU64::new(0),
            processed: AtomicU64::new(0),
            ignored: AtomicU64::new(0),
            replayed: AtomicU64::new(0),
            backpressure_events: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            reconfigurations: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_publish(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_replayed(&self, count: u64) {
        self.replayed.fetch_add(count, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_backpressure(&self) {
        self.backpressure_events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconfiguration(&self) {
        self.reconfigurations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            backpressure_events: self.backpressure_events.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            reconfigurations: self.reconfigurations.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.published.store(0, Ordering::Relaxed);
        self.processed.store(0, Ordering::Relaxed);
        self.ignored.store(0, Ordering::Relaxed);
        self.replayed.store(0, Ordering::Relaxed);
        self.backpressure_events.store(0, Ordering::Relaxed);
        self.timeouts.store(0, Ordering::Relaxed);
        self.reconfigurations.store(0, Ordering::Relaxed);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub published: u64,
    pub processed: u64,
    pub ignored: u64,
    pub replayed: u64,
    pub backpressure_events: u64,
    pub timeouts: u64,
    pub reconfigurations: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "published={} processed={} ignored={} replayed={} backpressure={} timeouts={} reconfigurations={}",
            self.published,
            self.processed,
            self.ignored,
            self.replayed,
            self.backpressure_events,
            self.timeouts,
            self.reconfigurations
        )
    }
}
