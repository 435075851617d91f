//! Bounded-memory counting-window rate limiter.
//!
//! A [`RateLimiter`] keeps one [`RateLimitRecord`] per caller key in a
//! [`FifoStorage`], so memory is bounded by `max_entries` no matter how many
//! distinct callers show up. Expired records are reclaimed by a background
//! sweeper owned by the limiter and stopped by [`RateLimiter::destroy`].
//!
//! Records live in process memory. Several processes each running a limiter
//! enforce the limit per process, not across the fleet.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::application::metrics::Metrics;
use crate::application::ports::{Clock, Storage};
use crate::application::sweeper::{ShutdownError, SweeperHandle};
use crate::domain::window::{CountingWindow, RateLimitDecision, RateLimitRecord, WindowError};
use crate::infrastructure::clock::SystemClock;
use crate::infrastructure::storage::FifoStorage;

/// Default number of caller records kept per limiter.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Error returned when a limiter configuration is invalid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("limit must be greater than 0")]
    ZeroLimit,
    #[error("window length must be greater than 0")]
    ZeroWindow,
    #[error("max_entries must be greater than 0")]
    ZeroMaxEntries,
    #[error("cleanup interval must be greater than 0")]
    ZeroCleanupInterval,
    #[error("background sweep requires a running tokio runtime")]
    NoRuntime,
}

impl From<WindowError> for BuildError {
    fn from(e: WindowError) -> Self {
        match e {
            WindowError::ZeroLimit => BuildError::ZeroLimit,
            WindowError::ZeroLength => BuildError::ZeroWindow,
        }
    }
}

#[derive(Debug)]
struct LimiterCore {
    name: String,
    window: CountingWindow,
    storage: FifoStorage<String, RateLimitRecord>,
    clock: Arc<dyn Clock>,
    metrics: Metrics,
}

impl LimiterCore {
    fn sweep(&self) -> usize {
        let now = self.clock.now();
        let window = self.window;
        let swept = self
            .storage
            .retain(|_, record| !window.is_expired(record, now));

        if swept > 0 {
            self.metrics.record_swept(swept);
            debug!(window = %self.name, swept, "reclaimed expired rate limit records");
        }
        swept
    }
}

/// Counting-window rate limiter keyed by caller identity.
///
/// `check` never blocks on I/O and never waits for the sweeper. Calls for the
/// same key are serialized, so within one window no two calls observe the same
/// `remaining` after a success.
///
/// # Example
/// ```
/// use fetch_perimeter::RateLimiter;
/// use std::time::Duration;
///
/// let limiter = RateLimiter::builder()
///     .with_limit(2)
///     .with_window(Duration::from_secs(60))
///     .with_background_sweep(false)
///     .build()
///     .unwrap();
///
/// assert_eq!(limiter.check("203.0.113.7").remaining, 1);
/// assert_eq!(limiter.check("203.0.113.7").remaining, 0);
/// assert!(!limiter.check("203.0.113.7").success);
///
/// limiter.destroy();
/// assert_eq!(limiter.size(), 0);
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    core: Arc<LimiterCore>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl RateLimiter {
    /// Defaults: limit 5 per 60 seconds, 10,000 entries, cleanup every window,
    /// system clock, background sweep on.
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    /// Register one event for `key`.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let core = &self.core;
        let now = core.clock.now();
        let decision = core.storage.with_entry_mut(
            key.to_owned(),
            || RateLimitRecord::new(now),
            |record| core.window.register(record, now),
        );

        if decision.success {
            core.metrics.record_allowed();
        } else {
            core.metrics.record_rejected();
            debug!(
                window = %core.name,
                key,
                reset_after_ms = decision.reset_after.as_millis() as u64,
                "rate limit exceeded"
            );
        }
        decision
    }

    /// Remove every expired record now and return how many were removed.
    pub fn sweep(&self) -> usize {
        self.core.sweep()
    }

    /// Number of records currently held.
    pub fn size(&self) -> usize {
        self.core.storage.len()
    }

    /// Stop the background sweeper and clear the store.
    ///
    /// After this returns `size()` is 0 and no sweep runs again. `check` keeps
    /// working, bounded by `max_entries`, but expired records are only reclaimed
    /// by eviction or an explicit `sweep`.
    pub fn destroy(&self) {
        if let Some(handle) = self.lock_sweeper().take() {
            handle.cancel();
        }
        self.core.storage.clear();
        info!(window = %self.core.name, "rate limiter destroyed");
    }

    /// Like [`destroy`](Self::destroy), but waits for the sweeper task to exit.
    ///
    /// # Errors
    /// [`ShutdownError`] if the sweeper panicked. The store is cleared anyway.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        let handle = self.lock_sweeper().take();
        let result = match handle {
            Some(handle) => handle.shutdown().await,
            None => Ok(()),
        };
        self.core.storage.clear();
        info!(window = %self.core.name, "rate limiter shut down");
        result
    }

    /// Whether a background sweeper is attached and still running.
    pub fn is_sweeping(&self) -> bool {
        self.lock_sweeper()
            .as_ref()
            .map_or(false, |handle| !handle.is_finished())
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn window(&self) -> CountingWindow {
        self.core.window
    }

    pub fn max_entries(&self) -> usize {
        self.core.storage.max_entries()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.core.metrics
    }

    fn lock_sweeper(&self) -> MutexGuard<'_, Option<SweeperHandle>> {
        self.sweeper
            .lock()
            .expect("RateLimiter sweeper mutex poisoned - a thread panicked while holding the lock")
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Ok(slot) = self.sweeper.get_mut() {
            if let Some(handle) = slot.take() {
                handle.cancel();
            }
        }
    }
}

/// Builder for [`RateLimiter`]. Values are validated in [`build`](Self::build).
#[derive(Debug, Clone)]
pub struct RateLimiterBuilder {
    name: String,
    limit: u32,
    window: Duration,
    max_entries: usize,
    cleanup_interval: Option<Duration>,
    clock: Option<Arc<dyn Clock>>,
    background_sweep: bool,
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            limit: 5,
            window: Duration::from_secs(60),
            max_entries: DEFAULT_MAX_ENTRIES,
            cleanup_interval: None,
            clock: None,
            background_sweep: true,
        }
    }
}

impl RateLimiterBuilder {
    /// Name used in logs and quota errors, e.g. "per-minute" or "daily".
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Maximum events per key per window.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Bound on stored records. The oldest-inserted record is evicted first.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// How often the sweeper runs. Defaults to the window length.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = Some(interval);
        self
    }

    /// Set a custom clock (mainly for testing).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Disable the background sweeper, e.g. outside a tokio runtime.
    pub fn with_background_sweep(mut self, enabled: bool) -> Self {
        self.background_sweep = enabled;
        self
    }

    /// Build the limiter and, unless disabled, spawn its sweeper on the current
    /// tokio runtime.
    ///
    /// # Errors
    /// [`BuildError`] if a value is zero, or if the sweeper is enabled and no
    /// runtime is running.
    pub fn build(self) -> Result<RateLimiter, BuildError> {
        let window = CountingWindow::new(self.limit, self.window)?;
        if self.max_entries == 0 {
            return Err(BuildError::ZeroMaxEntries);
        }
        let cleanup_interval = self.cleanup_interval.unwrap_or(self.window);
        if cleanup_interval.is_zero() {
            return Err(BuildError::ZeroCleanupInterval);
        }

        let runtime = if self.background_sweep {
            Some(Handle::try_current().map_err(|_| BuildError::NoRuntime)?)
        } else {
            None
        };

        let metrics = Metrics::new();
        let core = Arc::new(LimiterCore {
            name: self.name,
            window,
            storage: FifoStorage::new(self.max_entries).with_metrics(metrics.clone()),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock::new())),
            metrics,
        });

        let sweeper = runtime.map(|runtime| {
            SweeperHandle::spawn(
                &runtime,
                Arc::downgrade(&core),
                cleanup_interval,
                LimiterCore::sweep,
            )
        });

        Ok(RateLimiter {
            core,
            sweeper: Mutex::new(sweeper),
        })
    }
}
