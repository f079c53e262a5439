use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Counts failed sign-ins per key inside a sliding window.
#[derive(Debug)]
pub struct RateLimiter {
    max_failures: usize,
    window: Duration,
    failures: Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new(max_failures: usize, window: Duration) -> Self {
        Self {
            max_failures,
            window,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// True when `key` has used up its failures for the current window.
    pub fn is_limited(&self, key: &str) -> bool {
        let key = normalize(key);
        let cutoff = self.cutoff();
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(times) = failures.get_mut(&key) else {
            return false;
        };
        if let Some(cutoff) = cutoff {
            times.retain(|t| *t > cutoff);
        }
        if times.is_empty() {
            failures.remove(&key);
            return false;
        }
        times.len() >= self.max_failures
    }

    pub fn record_failure(&self, key: &str) {
        let cutoff = self.cutoff();
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let times = failures.entry(normalize(key)).or_default();
        if let Some(cutoff) = cutoff {
            times.retain(|t| *t > cutoff);
        }
        times.push(Instant::now());
    }

    /// Drops failures older than the window and every key left without any.
    /// Returns the number of keys removed.
    pub fn prune(&self) -> usize {
        let cutoff = self.cutoff();
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let before = failures.len();
        failures.retain(|_, times| {
            if let Some(cutoff) = cutoff {
                times.retain(|t| *t > cutoff);
            }
            !times.is_empty()
        });
        before - failures.len()
    }

    /// Number of keys with failures on record.
    pub fn len(&self) -> usize {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cutoff(&self) -> Option<Instant> {
        Instant::now().checked_sub(self.window)
    }

    pub fn reset(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize(key));
    }
}

impl Default for RateLimiter {
    /// Five failures per minute.
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}

fn normalize(key: &str) -> String {
    key.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_after_max_failures() {
        let limiter = RateLimiter::default();

        for _ in 0..4 {
            limiter.record_failure("a@x.com");
        }
        assert!(!limiter.is_limited("a@x.com"));

        limiter.record_failure("A@X.com");
        assert!(limiter.is_limited("a@x.com"));
        assert!(!limiter.is_limited("b@x.com"));
    }

    #[test]
    fn test_window_expires() {
        let limiter = RateLimiter::new(1, Duration::from_millis(5));
        limiter.record_failure("a@x.com");
        assert!(limiter.is_limited("a@x.com"));

        std::thread::sleep(Duration::from_millis(20));
        assert!(!limiter.is_limited("a@x.com"));
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_prune_evicts_expired_keys() {
        let limiter = RateLimiter::new(5, Duration::from_millis(10));
        for n in 0..1000 {
            limiter.record_failure(&format!("user{}@x.com", n));
        }
        assert_eq!(limiter.len(), 1000);

        std::thread::sleep(Duration::from_millis(50));
        limiter.record_failure("fresh@x.com");

        assert_eq!(limiter.prune(), 1000);
        assert_eq!(limiter.len(), 1);
        assert!(!limiter.is_limited("fresh@x.com"));
    }

    #[test]
    fn test_reset() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.record_failure("a@x.com");
        limiter.reset("a@x.com");
        assert!(!limiter.is_limited("a@x.com"));
    }
}
