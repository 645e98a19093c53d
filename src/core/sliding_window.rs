//! Trailing-window event counter shared by the rate limiter and the
//! brute-force tracker.
//!
//! Each key owns an ordered queue of event instants. Entries older than the
//! window are purged lazily whenever the key is touched. Keys live in an LRU
//! map bounded by `max_keys`: a new key arriving at capacity evicts the least
//! recently recorded one in constant time, and [`sweep`](SlidingWindowCounter::sweep)
//! drops idle keys periodically.

use std::collections::VecDeque;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;
use lru::LruCache;

#[derive(Debug, Default)]
struct WindowEntry {
    events: VecDeque<Instant>,
    /// Set once a threshold crossing has been reported for this burst.
    latched: bool,
}

impl WindowEntry {
    fn purge(&mut self, now: Instant, window: Duration) {
        while let Some(oldest) = self.events.front() {
            if now.saturating_duration_since(*oldest) >= window {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

/// Result of recording an event against a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crossing {
    /// Events in the window, including the one just recorded
    pub count: usize,
    /// True only for the event that first brought the count up to the threshold
    pub crossed: bool,
}

/// Sliding window counter keyed by `K`
pub struct SlidingWindowCounter<K: Hash + Eq> {
    window: Duration,
    state: Mutex<LruCache<K, WindowEntry>>,
}

impl<K> SlidingWindowCounter<K>
where
    K: Eq + Hash + Clone,
{
    /// Create a counter with the given trailing window and key bound
    pub fn new(window: Duration, max_keys: usize) -> Self {
        let capacity = NonZeroUsize::new(max_keys).unwrap_or(NonZeroUsize::MIN);
        Self {
            window,
            state: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<K, WindowEntry>> {
        // A panic elsewhere must not take every other client down with it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append an event for `key` at `timestamp`
    pub fn record(&self, key: &K, timestamp: Instant) {
        self.with_entry(key, |entry| {
            entry.purge(timestamp, self.window);
            entry.events.push_back(timestamp);
        })
    }

    /// Number of events for `key` strictly inside `(now - window, now]`.
    ///
    /// Stale entries are purged as a side effect; a key left empty is dropped.
    /// Reading does not refresh the key's position in the LRU order.
    pub fn count(&self, key: &K, now: Instant) -> usize {
        let mut state = self.lock();
        let count = match state.peek_mut(key) {
            Some(entry) => {
                entry.purge(now, self.window);
                entry.events.len()
            }
            None => return 0,
        };
        if count == 0 {
            state.pop(key);
        }
        count
    }

    /// Record an event and return the resulting window count in one critical section
    pub fn record_and_count(&self, key: &K, now: Instant) -> usize {
        self.with_entry(key, |entry| {
            entry.purge(now, self.window);
            entry.events.push_back(now);
            entry.events.len()
        })
    }

    /// Record an event and report whether it is the first to reach `threshold`.
    ///
    /// The crossing latch re-arms once the window count falls back below the
    /// threshold, so a sustained burst reports exactly once.
    pub fn record_with_threshold(&self, key: &K, now: Instant, threshold: usize) -> Crossing {
        self.with_entry(key, |entry| {
            entry.purge(now, self.window);
            if entry.events.len() < threshold {
                entry.latched = false;
            }
            entry.events.push_back(now);

            let count = entry.events.len();
            let crossed = count >= threshold && !entry.latched;
            if crossed {
                entry.latched = true;
            }
            Crossing { count, crossed }
        })
    }

    /// Forget everything recorded for `key`
    pub fn reset(&self, key: &K) {
        self.lock().pop(key);
    }

    /// Drop every key with no events inside the window. Returns the number removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let mut state = self.lock();
        let idle: Vec<K> = state
            .iter_mut()
            .filter_map(|(key, entry)| {
                entry.purge(now, self.window);
                entry.events.is_empty().then(|| key.clone())
            })
            .collect();
        for key in &idle {
            state.pop(key);
        }
        idle.len()
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    /// Run `f` on the entry for `key`, creating it (and evicting the least
    /// recently used key at capacity) when absent.
    fn with_entry<R>(&self, key: &K, f: impl FnOnce(&mut WindowEntry) -> R) -> R {
        let mut state = self.lock();
        if let Some(entry) = state.get_mut(key) {
            return f(entry);
        }

        let mut entry = WindowEntry::default();
        let result = f(&mut entry);
        if state.push(key.clone(), entry).is_some() {
            debug!("Window key bound {} reached, evicted least recently used key", state.cap());
            metrics::counter!("honeypot_window_evictions_total", 1);
        }
        result
    }
}
