//! Rate limiting and debouncing against an explicit millisecond clock.
//!
//! The core never reads wall time itself. Every call takes `now` so the
//! movement loop, heartbeat and publish coalescing stay deterministic in
//! tests.

#[cfg(test)]
#[path = "throttle_test.rs"]
mod throttle_test;

/// Allows an action at most once per `interval_ms`.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval_ms: i64,
    last_at: Option<i64>,
}

impl Throttle {
    #[must_use]
    pub fn new(interval_ms: i64) -> Self {
        Self { interval_ms, last_at: None }
    }

    /// Whether the interval has elapsed since the last recorded action.
    #[must_use]
    pub fn ready(&self, now: i64) -> bool {
        self.last_at
            .is_none_or(|last| now.saturating_sub(last) >= self.interval_ms)
    }

    pub fn mark(&mut self, now: i64) {
        self.last_at = Some(now);
    }

    /// Check and record in one step. Returns `true` if the action may run.
    pub fn try_acquire(&mut self, now: i64) -> bool {
        if self.ready(now) {
            self.mark(now);
            return true;
        }
        false
    }

    pub fn reset(&mut self) {
        self.last_at = None;
    }

    #[must_use]
    pub fn last_at(&self) -> Option<i64> {
        self.last_at
    }
}

/// Fires once, `delay_ms` after the most recent trigger.
#[derive(Debug, Clone)]
pub struct Debounce {
    delay_ms: i64,
    pending_since: Option<i64>,
}

impl Debounce {
    #[must_use]
    pub fn new(delay_ms: i64) -> Self {
        Self { delay_ms, pending_since: None }
    }

    /// Restart the quiet period.
    pub fn trigger(&mut self, now: i64) {
        self.pending_since = Some(now);
    }

    /// Returns `true` exactly once when the quiet period has elapsed.
    pub fn take_due(&mut self, now: i64) -> bool {
        match self.pending_since {
            Some(since) if now.saturating_sub(since) >= self.delay_ms => {
                self.pending_since = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    pub fn cancel(&mut self) {
        self.pending_since = None;
    }
}
