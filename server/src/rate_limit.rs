//! In-memory rate limiting for room broadcasts.
//!
//! DESIGN
//! ======
//! Sliding-window counters backed by `VecDeque<Instant>`. Two limits apply to
//! every `broadcast:*` frame:
//! - Per-connection: `RATE_LIMIT_PER_CLIENT` frames per window
//! - Global: `RATE_LIMIT_GLOBAL` frames per window across all rooms
//!
//! Presence traffic is not counted; clients already throttle it themselves.

#[cfg(test)]
#[path = "rate_limit_test.rs"]
mod tests;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use frames::ErrorCode;
use uuid::Uuid;

const DEFAULT_PER_CLIENT_LIMIT: usize = 20;
const DEFAULT_PER_CLIENT_WINDOW_SECS: u64 = 10;

const DEFAULT_GLOBAL_LIMIT: usize = 1_000;
const DEFAULT_GLOBAL_WINDOW_SECS: u64 = 10;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub per_client_limit: usize,
    pub per_client_window: Duration,
    pub global_limit: usize,
    pub global_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_client_limit: DEFAULT_PER_CLIENT_LIMIT,
            per_client_window: Duration::from_secs(DEFAULT_PER_CLIENT_WINDOW_SECS),
            global_limit: DEFAULT_GLOBAL_LIMIT,
            global_window: Duration::from_secs(DEFAULT_GLOBAL_WINDOW_SECS),
        }
    }
}

impl RateLimitConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let per_client_window_secs = env_parse("RATE_LIMIT_PER_CLIENT_WINDOW_SECS", DEFAULT_PER_CLIENT_WINDOW_SECS);
        let global_window_secs = env_parse("RATE_LIMIT_GLOBAL_WINDOW_SECS", DEFAULT_GLOBAL_WINDOW_SECS);
        Self {
            per_client_limit: env_parse("RATE_LIMIT_PER_CLIENT", DEFAULT_PER_CLIENT_LIMIT),
            per_client_window: Duration::from_secs(per_client_window_secs),
            global_limit: env_parse("RATE_LIMIT_GLOBAL", DEFAULT_GLOBAL_LIMIT),
            global_window: Duration::from_secs(global_window_secs),
        }
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy + std::fmt::Display,
{
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(key, value = %raw, %default, "ignoring invalid rate limit setting");
        default
    })
}

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[allow(clippy::enum_variant_names)]
pub enum RateLimitError {
    #[error("per-connection rate limit exceeded (max {limit} broadcasts/{window_secs}s)")]
    PerClientExceeded { limit: usize, window_secs: u64 },
    #[error("global rate limit exceeded (max {limit} broadcasts/{window_secs}s)")]
    GlobalExceeded { limit: usize, window_secs: u64 },
}

impl ErrorCode for RateLimitError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::PerClientExceeded { .. } => "E_RATE_LIMIT_CLIENT",
            Self::GlobalExceeded { .. } => "E_RATE_LIMIT_GLOBAL",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

// =============================================================================
// RATE LIMITER
// =============================================================================

/// One sliding window: at most `limit` hits within `span`.
#[derive(Debug)]
struct Window {
    limit: usize,
    span: Duration,
    hits: VecDeque<Instant>,
}

impl Window {
    fn new(limit: usize, span: Duration) -> Self {
        Self { limit, span, hits: VecDeque::new() }
    }

    /// Drops hits older than the span, then reports whether one more fits.
    fn has_room(&mut self, now: Instant) -> bool {
        while self.hits.front().is_some_and(|&hit| now.duration_since(hit) > self.span) {
            self.hits.pop_front();
        }
        self.hits.len() < self.limit
    }

    fn record(&mut self, now: Instant) {
        self.hits.push_back(now);
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Arc<Mutex<Windows>>,
}

struct Windows {
    global: Window,
    per_client: HashMap<Uuid, Window>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        let windows = Windows {
            global: Window::new(config.global_limit, config.global_window),
            per_client: HashMap::new(),
        };
        Self { config, windows: Arc::new(Mutex::new(windows)) }
    }

    /// Check both limits, then record the broadcast.
    ///
    /// # Errors
    ///
    /// Returns the first limit that would be exceeded, global first. Nothing
    /// is recorded for a refused broadcast.
    pub fn check_and_record(&self, client_id: Uuid) -> Result<(), RateLimitError> {
        self.check_and_record_at(client_id, Instant::now())
    }

    fn check_and_record_at(&self, client_id: Uuid, now: Instant) -> Result<(), RateLimitError> {
        let cfg = self.config;
        let mut guard = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let Windows { global, per_client } = &mut *guard;

        if !global.has_room(now) {
            return Err(RateLimitError::GlobalExceeded {
                limit: cfg.global_limit,
                window_secs: cfg.global_window.as_secs(),
            });
        }
        let client = per_client
            .entry(client_id)
            .or_insert_with(|| Window::new(cfg.per_client_limit, cfg.per_client_window));
        if !client.has_room(now) {
            return Err(RateLimitError::PerClientExceeded {
                limit: cfg.per_client_limit,
                window_secs: cfg.per_client_window.as_secs(),
            });
        }

        client.record(now);
        global.record(now);
        Ok(())
    }

    /// Drop a disconnected client's window.
    pub fn forget(&self, client_id: Uuid) {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).per_client.remove(&client_id);
    }

    #[cfg(test)]
    fn tracked_clients(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).per_client.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
