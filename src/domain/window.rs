//! Counting-window rate limiting.
//!
//! Each caller key owns one [`RateLimitRecord`]: the instant its current window
//! opened and how many events were admitted since. A [`CountingWindow`] admits up
//! to `limit` events per record and starts a fresh window once `length` has
//! elapsed since the record's window opened. This is a fixed window per key, not a
//! sliding log of timestamps, so a record costs the same regardless of the limit.

use std::time::{Duration, Instant};

/// Error returned when window parameters are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowError {
    /// The limit must be at least 1.
    ZeroLimit,
    /// The window length must be greater than zero.
    ZeroLength,
}

impl std::fmt::Display for WindowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WindowError::ZeroLimit => write!(f, "limit must be greater than 0"),
            WindowError::ZeroLength => write!(f, "window length must be greater than 0"),
        }
    }
}

impl std::error::Error for WindowError {}

/// Per-key counter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitRecord {
    window_start: Instant,
    count: u32,
}

impl RateLimitRecord {
    /// A record whose window opens at `now` with nothing admitted yet.
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            count: 0,
        }
    }

    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Events admitted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Result of registering one event against a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the event is admitted.
    pub success: bool,
    /// Events still available in the current window.
    pub remaining: u32,
    /// Time until the current window of this key expires.
    pub reset_after: Duration,
}

/// Window parameters shared by every record of one limiter.
///
/// # Example
/// ```
/// use fetch_perimeter::{CountingWindow, RateLimitRecord};
/// use std::time::{Duration, Instant};
///
/// let window = CountingWindow::new(2, Duration::from_secs(60)).unwrap();
/// let now = Instant::now();
/// let mut record = RateLimitRecord::new(now);
///
/// assert_eq!(window.register(&mut record, now).remaining, 1);
/// assert_eq!(window.register(&mut record, now).remaining, 0);
/// assert!(!window.register(&mut record, now).success);
///
/// // A new window opens once the old one has fully elapsed
/// let later = now + Duration::from_secs(60);
/// assert_eq!(window.register(&mut record, later).remaining, 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountingWindow {
    limit: u32,
    length: Duration,
}

impl CountingWindow {
    /// # Errors
    /// [`WindowError`] if `limit` is 0 or `length` is zero.
    pub fn new(limit: u32, length: Duration) -> Result<Self, WindowError> {
        if limit == 0 {
            return Err(WindowError::ZeroLimit);
        }
        if length.is_zero() {
            return Err(WindowError::ZeroLength);
        }
        Ok(Self { limit, length })
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn length(&self) -> Duration {
        self.length
    }

    /// A record is logically expired once `length` has elapsed since its window
    /// opened, whether or not it has been evicted yet.
    pub fn is_expired(&self, record: &RateLimitRecord, now: Instant) -> bool {
        now.saturating_duration_since(record.window_start) >= self.length
    }

    /// Register one event at `now`.
    ///
    /// An expired record is restarted at `now` before counting. Once `limit`
    /// events were admitted the count stays at `limit`.
    pub fn register(&self, record: &mut RateLimitRecord, now: Instant) -> RateLimitDecision {
        if self.is_expired(record, now) {
            *record = RateLimitRecord::new(now);
        }

        let reset_after = self
            .length
            .saturating_sub(now.saturating_duration_since(record.window_start));

        if record.count < self.limit {
            record.count += 1;
            RateLimitDecision {
                success: true,
                remaining: self.limit - record.count,
                reset_after,
            }
        } else {
            RateLimitDecision {
                success: false,
                remaining: 0,
                reset_after,
            }
        }
    }
}
