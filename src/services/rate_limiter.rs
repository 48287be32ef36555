use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Result of counting one attempt against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Attempts left in the current window after this one.
    pub remaining: u32,
    /// Seconds until the window resets; at least 1 when denied.
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window attempt counter keyed by `route:client`.
///
/// Counters live in this process only; running several instances multiplies
/// the effective limit.
#[derive(Clone)]
pub struct RateLimiter {
    max_attempts: u32,
    window: Duration,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn key(route: &str, client: &str) -> String {
        format!("{}:{}", route, client)
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        self.check_at(key, Instant::now())
    }

    pub(crate) fn check_at(&self, key: &str, now: Instant) -> RateLimitDecision {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.saturating_duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        let elapsed = now.saturating_duration_since(entry.started);
        let retry_after_secs = ceil_secs(self.window.saturating_sub(elapsed)).max(1);

        if entry.count >= self.max_attempts {
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs,
            };
        }

        entry.count += 1;
        RateLimitDecision {
            allowed: true,
            remaining: self.max_attempts - entry.count,
            retry_after_secs,
        }
    }

    /// Drops windows that have fully elapsed. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = windows.len();
        windows.retain(|_, window| now.saturating_duration_since(window.started) < self.window);
        before - windows.len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_after_limit_within_window() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("login:1.2.3.4", start);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check_at("login:1.2.3.4", start + Duration::from_secs(10));
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs, 50);
    }

    #[test]
    fn window_resets_after_elapsing() {
        let limiter = RateLimiter::new(1, Duration::from_secs(30));
        let start = Instant::now();

        assert!(limiter.check_at("k", start).allowed);
        assert!(!limiter.check_at("k", start + Duration::from_secs(29)).allowed);
        assert!(limiter.check_at("k", start + Duration::from_secs(30)).allowed);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(1, Duration::from_secs(30));
        let now = Instant::now();

        assert!(limiter.check_at(&RateLimiter::key("login", "1.1.1.1"), now).allowed);
        assert!(limiter.check_at(&RateLimiter::key("login", "2.2.2.2"), now).allowed);
        assert!(limiter.check_at(&RateLimiter::key("register", "1.1.1.1"), now).allowed);
        assert!(!limiter.check_at(&RateLimiter::key("login", "1.1.1.1"), now).allowed);
    }

    #[test]
    fn retry_after_rounds_up_and_never_exceeds_window() {
        let limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check_at("k", start);

        let denied = limiter.check_at("k", start + Duration::from_millis(2_500));
        assert_eq!(denied.retry_after_secs, 8);

        let denied = limiter.check_at("k", start + Duration::from_millis(9_999));
        assert_eq!(denied.retry_after_secs, 1);
        assert!(denied.retry_after_secs <= limiter.window().as_secs());
    }

    #[test]
    fn purge_removes_only_elapsed_windows() {
        let limiter = RateLimiter::new(5, Duration::from_secs(10));
        let start = Instant::now();
        limiter.check_at("old", start);
        limiter.check_at("fresh", start + Duration::from_secs(8));

        assert_eq!(limiter.purge_expired_at(start + Duration::from_secs(12)), 1);
        assert_eq!(limiter.purge_expired_at(start + Duration::from_secs(12)), 0);
    }

    #[test]
    fn concurrent_checks_never_exceed_the_limit() {
        let limiter = RateLimiter::new(50, Duration::from_secs(60));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20).filter(|_| limiter.check("login:9.9.9.9").allowed).count()
                })
            })
            .collect();

        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 50);
    }
}
