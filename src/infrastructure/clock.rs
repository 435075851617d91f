//! Clock adapters.
//!
//! Tests drive time through `MockClock` in `crate::infrastructure::mocks`.

use crate::application::ports::Clock;
use std::time::Instant;

/// Monotonic wall clock backed by `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let earlier = clock.now();
        let later = clock.now();
        assert!(later >= earlier);
    }
}
