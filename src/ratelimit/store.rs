//! Keyed fixed-window counters and the admission check.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::key::RateLimitKey;

/// One active counting window for one key.
///
/// An entry is expired once `now >= window_reset_at`. Expired entries are
/// treated as absent, never as a zero count; they are reclaimed lazily on
/// reuse or eagerly by the sweeper.
#[derive(Debug, Clone)]
pub struct RateLimitEntry {
    /// Requests admitted in the current window, including the one that
    /// created it
    pub count: u32,
    /// Absolute time at which the window ends
    pub window_reset_at: Instant,
}

impl RateLimitEntry {
    /// Whether this entry's window has ended.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.window_reset_at
    }
}

/// Outcome of a single window check.
#[derive(Debug, Clone)]
pub struct PolicyDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// The configured ceiling for the checked window
    pub limit: u32,
    /// Admissions left in the window
    pub remaining: u32,
    /// Time until the window ends
    pub retry_after: Duration,
    /// Wall-clock time at which the window ends
    pub reset_at: DateTime<Utc>,
}

impl PolicyDecision {
    fn new(allowed: bool, limit: u32, remaining: u32, retry_after: Duration) -> Self {
        let reset_at = Utc::now()
            + chrono::Duration::from_std(retry_after).unwrap_or_else(|_| chrono::Duration::zero());
        Self {
            allowed,
            limit,
            remaining,
            retry_after,
            reset_at,
        }
    }

    /// Retry hint in milliseconds.
    pub fn retry_after_ms(&self) -> u64 {
        self.retry_after.as_millis() as u64
    }
}

/// Process-wide table of active counting windows.
///
/// Constructed once per process and shared via `Arc` into the HTTP layer;
/// the table is only reset by a process restart. Counting has no
/// persistence and no cross-process coordination.
pub struct RateLimitStore {
    entries: DashMap<RateLimitKey, RateLimitEntry>,
}

impl RateLimitStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Check and account one request against the window for `key`.
    ///
    /// Only admissions mutate the table; a denial never consumes quota.
    /// The whole read-decide-mutate sequence runs while holding the map's
    /// shard write lock for the key, so concurrent checks for one key
    /// serialize and the limit cannot be overshot.
    pub fn check(&self, key: RateLimitKey, limit: u32, window: Duration) -> PolicyDecision {
        let now = Instant::now();

        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(RateLimitEntry {
                    count: 1,
                    window_reset_at: now + window,
                });
                PolicyDecision::new(true, limit, limit.saturating_sub(1), window)
            }
            Entry::Occupied(mut slot) => {
                if slot.get().is_expired(now) {
                    // Stale window: reuse the slot as if the key were fresh.
                    let entry = slot.get_mut();
                    entry.count = 1;
                    entry.window_reset_at = now + window;
                    PolicyDecision::new(true, limit, limit.saturating_sub(1), window)
                } else if slot.get().count >= limit {
                    let retry_after = slot.get().window_reset_at.saturating_duration_since(now);
                    debug!(key = %slot.key(), limit, "window exhausted");
                    PolicyDecision::new(false, limit, 0, retry_after)
                } else {
                    let entry = slot.get_mut();
                    entry.count += 1;
                    let remaining = limit.saturating_sub(entry.count);
                    let retry_after = entry.window_reset_at.saturating_duration_since(now);
                    PolicyDecision::new(true, limit, remaining, retry_after)
                }
            }
        }
    }

    /// Current admitted count for a key, if it has a live window.
    pub fn current_count(&self, key: &RateLimitKey) -> Option<u32> {
        let now = Instant::now();
        self.entries.get(key).and_then(|entry| {
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.count)
            }
        })
    }

    /// Drop every expired entry. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of tracked entries, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store tracks no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove all entries.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for RateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}
