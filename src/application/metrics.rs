//! Observability counters for a rate limiter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters for one limiter, shared between the limiter, its store and its sweeper.
///
/// Cloning is cheap and every clone observes the same counters.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

#[derive(Debug, Default)]
struct MetricsInner {
    allowed: AtomicU64,
    rejected: AtomicU64,
    evicted: AtomicU64,
    swept: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_allowed(&self) {
        self.inner.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.inner.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A record dropped to make room for a new key.
    pub(crate) fn record_eviction(&self) {
        self.inner.evicted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records reclaimed because their window expired.
    pub(crate) fn record_swept(&self, count: usize) {
        self.inner.swept.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn allowed(&self) -> u64 {
        self.inner.allowed.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.inner.rejected.load(Ordering::Relaxed)
    }

    pub fn evicted(&self) -> u64 {
        self.inner.evicted.load(Ordering::Relaxed)
    }

    pub fn swept(&self) -> u64 {
        self.inner.swept.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allowed: self.allowed(),
            rejected: self.rejected(),
            evicted: self.evicted(),
            swept: self.swept(),
        }
    }
}

/// A point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub allowed: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub swept: u64,
}

impl MetricsSnapshot {
    /// Total `check` calls observed.
    pub fn total_checks(&self) -> u64 {
        self.allowed.saturating_add(self.rejected)
    }

    /// Ratio of rejected checks, 0.0 when nothing was checked.
    pub fn rejection_rate(&self) -> f64 {
        let total = self.total_checks();
        if total == 0 {
            0.0
        } else {
            self.rejected as f64 / total as f64
        }
    }
}
