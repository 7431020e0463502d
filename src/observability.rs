//! Logging setup and harvest counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // a subscriber may already be installed (tests, embedding binaries)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Counters shared by every worker of a pool
#[derive(Debug, Default)]
pub struct HarvestMetrics {
    dequeued: AtomicU64,
    processed: AtomicU64,
    dropped: AtomicU64,
    persisted: AtomicU64,
    write_skipped: AtomicU64,
    write_failed: AtomicU64,
}

impl HarvestMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_dequeued(&self) {
        self.dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "dropped", "Metric incremented");
    }

    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn write_skipped(&self) {
        self.write_skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "write_skipped", "Metric incremented");
    }

    pub fn write_failed(&self) {
        self.write_failed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "write_failed", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dequeued: self.dequeued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            write_skipped: self.write_skipped.load(Ordering::Relaxed),
            write_failed: self.write_failed.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub dequeued: u64,
    pub processed: u64,
    pub dropped: u64,
    pub persisted: u64,
    pub write_skipped: u64,
    pub write_failed: u64,
}

impl MetricsSnapshot {
    /// Writes attempted, whatever their result
    pub fn writes_attempted(&self) -> u64 {
        self.persisted + self.write_skipped + self.write_failed
    }
}
