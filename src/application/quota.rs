//! Several named rate-limit windows applied to the same caller.

use std::time::Duration;

use thiserror::Error;

use crate::application::limiter::RateLimiter;

/// Quota exhausted for the named window.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{window} limit of {limit} reached, retry in {}s", .reset_after.as_secs().max(1))]
pub struct RateLimitError {
    pub window: String,
    pub limit: u32,
    pub reset_after: Duration,
}

/// Ordered set of limiters checked together, e.g. "per-minute" then "daily".
///
/// Windows are checked in the order they were added. The first exhausted window
/// stops the check, so windows after it are not consumed by a rejected request.
#[derive(Debug, Default)]
pub struct QuotaSet {
    limiters: Vec<RateLimiter>,
}

impl QuotaSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiters.push(limiter);
        self
    }

    /// Consume one event for `caller` in every window.
    ///
    /// Returns the smallest `remaining` across windows, or `u32::MAX` when the
    /// set is empty.
    ///
    /// # Errors
    /// [`RateLimitError`] naming the first window that is exhausted.
    pub fn check(&self, caller: &str) -> Result<u32, RateLimitError> {
        let mut tightest = u32::MAX;
        for limiter in &self.limiters {
            let decision = limiter.check(caller);
            if !decision.success {
                return Err(RateLimitError {
                    window: limiter.name().to_string(),
                    limit: limiter.window().limit(),
                    reset_after: decision.reset_after,
                });
            }
            tightest = tightest.min(decision.remaining);
        }
        Ok(tightest)
    }

    pub fn window(&self, name: &str) -> Option<&RateLimiter> {
        self.limiters.iter().find(|limiter| limiter.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RateLimiter> {
        self.limiters.iter()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }

    /// Destroy every limiter in the set.
    pub fn destroy(&self) {
        for limiter in &self.limiters {
            limiter.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mocks::MockClock;
    use std::sync::Arc;
    use std::time::Instant;

    fn window(name: &str, limit: u32, length: Duration, clock: &MockClock) -> RateLimiter {
        RateLimiter::builder()
            .with_name(name)
            .with_limit(limit)
            .with_window(length)
            .with_clock(Arc::new(clock.clone()))
            .with_background_sweep(false)
            .build()
            .unwrap()
    }

    fn per_minute_and_daily(clock: &MockClock) -> QuotaSet {
        QuotaSet::new()
            .with_limiter(window("per-minute", 2, Duration::from_secs(60), clock))
            .with_limiter(window("daily", 3, Duration::from_secs(86_400), clock))
    }

    #[test]
    fn test_reports_tightest_remaining() {
        let clock = MockClock::new(Instant::now());
        let quotas = per_minute_and_daily(&clock);

        assert_eq!(quotas.check("ip"), Ok(1));
        assert_eq!(quotas.check("ip"), Ok(0));
    }

    #[test]
    fn test_names_triggering_window() {
        let clock = MockClock::new(Instant::now());
        let quotas = per_minute_and_daily(&clock);

        quotas.check("ip").unwrap();
        quotas.check("ip").unwrap();
        let err = quotas.check("ip").unwrap_err();
        assert_eq!(err.window, "per-minute");
        assert_eq!(err.limit, 2);
        assert_eq!(err.reset_after, Duration::from_secs(60));
        assert_eq!(err.to_string(), "per-minute limit of 2 reached, retry in 60s");

        clock.advance(Duration::from_secs(61));
        quotas.check("ip").unwrap();
        let err = quotas.check("ip").unwrap_err();
        assert_eq!(err.window, "daily");
    }

    #[test]
    fn test_rejected_check_does_not_consume_later_windows() {
        let clock = MockClock::new(Instant::now());
        let quotas = per_minute_and_daily(&clock);

        for _ in 0..10 {
            let _ = quotas.check("ip");
        }

        // Only the two admitted requests reached the daily window
        let daily = quotas.window("daily").unwrap();
        assert_eq!(daily.metrics().allowed(), 2);
        assert_eq!(daily.metrics().rejected(), 0);
    }

    #[test]
    fn test_empty_set_admits_everything() {
        let quotas = QuotaSet::new();
        assert!(quotas.is_empty());
        assert_eq!(quotas.check("ip"), Ok(u32::MAX));
    }

    #[test]
    fn test_destroy_clears_all_windows() {
        let clock = MockClock::new(Instant::now());
        let quotas = per_minute_and_daily(&clock);

        quotas.check("a").unwrap();
        quotas.check("b").unwrap();
        quotas.destroy();

        assert!(quotas.iter().all(|limiter| limiter.size() == 0));
    }
}
