//! Per-client request rate limiting.
//!
//! Every request is recorded into a trailing window keyed by client identity;
//! once the window holds more than `max_requests` events the request is denied.

use std::time::{Duration, Instant};

use crate::core::fingerprint::ClientIdentity;
use crate::core::sliding_window::SlidingWindowCounter;
use crate::models::RateLimitConfig;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    /// Denied with the number of requests seen in the current window
    Deny { count: usize },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow)
    }
}

/// Rate limiter backed by an in-process sliding window
pub struct RateLimiter {
    counter: SlidingWindowCounter<ClientIdentity>,
    max_requests: usize,
}

impl RateLimiter {
    /// Create a new rate limiter instance
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            counter: SlidingWindowCounter::new(
                Duration::from_secs(config.window_seconds),
                config.max_tracked_keys,
            ),
            max_requests: config.max_requests as usize,
        }
    }

    /// Record a request for `identity` and decide whether it may proceed
    pub fn admit(&self, identity: &ClientIdentity) -> Admission {
        self.admit_at(identity, Instant::now())
    }

    /// Same as [`admit`](Self::admit) with an explicit clock reading
    pub fn admit_at(&self, identity: &ClientIdentity, now: Instant) -> Admission {
        let count = self.counter.record_and_count(identity, now);
        if count > self.max_requests {
            Admission::Deny { count }
        } else {
            Admission::Allow
        }
    }

    /// Forget the window for `identity`
    pub fn reset(&self, identity: &ClientIdentity) {
        self.counter.reset(identity);
    }

    /// Drop idle identities, returning how many were removed
    pub fn sweep(&self, now: Instant) -> usize {
        self.counter.sweep(now)
    }

    pub fn window(&self) -> Duration {
        self.counter.window()
    }

    pub fn tracked_clients(&self) -> usize {
        self.counter.tracked_keys()
    }
}
