//! Failed-authentication tracking per (client, account) pair.

use std::time::{Duration, Instant};

use crate::core::fingerprint::ClientIdentity;
use crate::core::sliding_window::SlidingWindowCounter;
use crate::models::BruteForceConfig;

type PairKey = (ClientIdentity, String);

/// Brute-force tracker
///
/// Accounts are keyed by the submitted identifier, lowercased and trimmed,
/// whether or not such an account exists.
pub struct BruteForceTracker {
    counter: SlidingWindowCounter<PairKey>,
    max_failures: usize,
}

impl BruteForceTracker {
    pub fn new(config: &BruteForceConfig) -> Self {
        Self {
            counter: SlidingWindowCounter::new(
                Duration::from_secs(config.window_seconds),
                config.max_tracked_keys,
            ),
            max_failures: config.max_failures.max(1) as usize,
        }
    }

    /// Record a failed login. Returns true exactly once per burst, on the
    /// failure that brings the window count up to the threshold.
    pub fn report_failure(&self, identity: &ClientIdentity, account: &str) -> bool {
        self.report_failure_at(identity, account, Instant::now())
    }

    pub fn report_failure_at(&self, identity: &ClientIdentity, account: &str, now: Instant) -> bool {
        let key = pair_key(identity, account);
        self.counter
            .record_with_threshold(&key, now, self.max_failures)
            .crossed
    }

    /// A successful login clears suspicion for the pair immediately
    pub fn report_success(&self, identity: &ClientIdentity, account: &str) {
        self.counter.reset(&pair_key(identity, account));
    }

    /// Failures currently in the window for the pair
    pub fn failures(&self, identity: &ClientIdentity, account: &str) -> usize {
        self.failures_at(identity, account, Instant::now())
    }

    pub fn failures_at(&self, identity: &ClientIdentity, account: &str, now: Instant) -> usize {
        self.counter.count(&pair_key(identity, account), now)
    }

    pub fn sweep(&self, now: Instant) -> usize {
        self.counter.sweep(now)
    }

    pub fn window(&self) -> Duration {
        self.counter.window()
    }

    pub fn tracked_pairs(&self) -> usize {
        self.counter.tracked_keys()
    }
}

fn pair_key(identity: &ClientIdentity, account: &str) -> PairKey {
    (identity.clone(), account.trim().to_lowercase())
}
