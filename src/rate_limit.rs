use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use dashmap::DashMap;

// idle clients are swept once per this many checks
const SWEEP_EVERY: usize = 1024;

/// Sliding window limiter keyed by client. Process local: every replica
/// counts on its own.
#[derive(Clone, Default)]
pub struct InMemoryRateLimiter {
    hits: Arc<DashMap<String, VecDeque<Instant>>>,
    checks: Arc<AtomicUsize>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a hit for `key` and returns false once `limit` hits fall inside `window`.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        let now = Instant::now();
        let allowed = {
            let mut q = self.hits.entry(key.to_owned()).or_default();
            while q.front().is_some_and(|t| now.duration_since(*t) >= window) {
                q.pop_front();
            }
            if q.len() < limit {
                q.push_back(now);
                true
            } else {
                false
            }
        };
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            self.sweep(window);
        }
        allowed
    }

    /// Forgets clients whose latest hit is older than `window`.
    pub fn sweep(&self, window: Duration) {
        let now = Instant::now();
        self.hits.retain(|_, q| q.back().is_some_and(|t| now.duration_since(*t) < window));
    }

    pub fn tracked_clients(&self) -> usize {
        self.hits.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub booking_limit: usize,
    pub booking_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { booking_limit: 5, booking_window: Duration::from_secs(600) }
    }
}

/// Budget for public booking submissions, per client IP.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self { Self { limiter, cfg } }
    pub fn allow_booking(&self, ip: &str) -> bool { self.limiter.check(&format!("booking:{ip}"), self.cfg.booking_limit, self.cfg.booking_window) }
}
