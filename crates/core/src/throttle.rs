//! Rate limiting for repetitive status log lines.

use std::time::{Duration, Instant};

/// Allows an action at most once per `interval`.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl LogThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns `true` (and records `now`) if the interval has elapsed.
    pub fn ready(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }

    /// Forget the last emission so the next call is allowed immediately.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_allowed_then_suppressed() {
        let start = Instant::now();
        let mut throttle = LogThrottle::new(Duration::from_secs(300));
        assert!(throttle.ready(start));
        assert!(!throttle.ready(start + Duration::from_secs(299)));
        assert!(throttle.ready(start + Duration::from_secs(300)));
    }

    #[test]
    fn reset_allows_immediately() {
        let start = Instant::now();
        let mut throttle = LogThrottle::new(Duration::from_secs(60));
        assert!(throttle.ready(start));
        throttle.reset();
        assert!(throttle.ready(start + Duration::from_secs(1)));
    }
}
