//! Sliding-window rate limiting over an in-memory per-visitor store.
//!
//! Each visitor maps to an ordered list of millisecond timestamps inside
//! the trailing window. The filter-then-append on a visitor's entry
//! happens under that entry's lock, so concurrent requests from the same
//! visitor cannot lose updates.

use dashmap::DashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Current wall-clock time in milliseconds since the epoch.
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Result of one rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateCheck {
    pub exceeded: bool,
    /// Requests in the window, counting the one being checked.
    pub count: u32,
    pub limit: u32,
}

/// In-memory sliding-window rate limiter keyed by visitor ID.
///
/// Window size and max are passed per call so the dynamic settings source
/// stays authoritative; the limiter owns only the timestamp state.
#[derive(Default)]
pub struct RateLimiter {
    windows: DashMap<String, Vec<i64>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the visitor against the window and record the request if it
    /// is admitted.
    ///
    /// Filters the stored timestamps to those newer than `now - window_ms`
    /// (the filtered list persists, so memory never accumulates stale
    /// entries), counts this in-flight request on top, and appends it only
    /// when the count stays within `max`. Blocked requests are not
    /// counted. One atomic per-entry operation; there is no separate
    /// check-then-act window.
    pub fn check_and_record(&self, visitor_id: &str, window_ms: i64, max: u32) -> RateCheck {
        self.check_and_record_at(visitor_id, window_ms, max, now_ms())
    }

    fn check_and_record_at(&self, visitor_id: &str, window_ms: i64, max: u32, now: i64) -> RateCheck {
        let cutoff = now - window_ms;
        let mut entry = self.windows.entry(visitor_id.to_string()).or_default();
        entry.retain(|ts| *ts > cutoff);
        let count = entry.len() as u32 + 1;
        let exceeded = count > max;
        if !exceeded {
            entry.push(now);
        }
        RateCheck {
            exceeded,
            count,
            limit: max,
        }
    }

    /// Record a request timestamp without checking. Used to replay
    /// persisted logs into the limiter at startup.
    pub fn record_at(&self, visitor_id: &str, timestamp_ms: i64) {
        self.windows
            .entry(visitor_id.to_string())
            .or_default()
            .push(timestamp_ms);
    }

    /// Drop timestamps older than the window for every tracked visitor and
    /// evict visitors whose lists emptied. Run periodically to bound
    /// memory to active visitors.
    pub fn sweep(&self, window_ms: i64) {
        let cutoff = now_ms() - window_ms;
        let before = self.windows.len();
        self.windows.retain(|_, timestamps| {
            timestamps.retain(|ts| *ts > cutoff);
            !timestamps.is_empty()
        });
        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, tracked = self.windows.len(), "rate window sweep");
        }
    }

    /// Number of visitors currently tracked.
    pub fn tracked_visitors(&self) -> usize {
        self.windows.len()
    }
}
