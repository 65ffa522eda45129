//! Per-client fixed-window request throttle.
//!
//! Each client key (the source IP in practice) owns a `RateWindow` holding
//! a request counter and the instant its window opened. The first request
//! after a window has aged past `window` opens a fresh one. This is a fixed
//! window, not a sliding log: a client straddling a boundary can get up to
//! `2 * max_requests` through in one `window`-long interval.
//!
//! All state sits behind a single mutex: the read-check-increment in
//! [`RateLimiter::admit`] and the eviction sweep take the same lock.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use seedshare::reliability::{Admission, RateLimitConfig, RateLimiter};
//!
//! let limiter = RateLimiter::new(RateLimitConfig::default());
//! if limiter.admit("203.0.113.7") == Admission::Deny {
//!     // reply 429
//! }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::background::PeriodicTask;
use crate::constants;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests admitted per client inside one window.
    pub max_requests: u32,
    /// Window length.
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: constants::DEFAULT_MAX_REQUESTS,
            window: constants::DEFAULT_RATE_WINDOW,
        }
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed.
    Allow,
    /// The client has used up its budget for the current window.
    Deny,
}

impl Admission {
    /// Returns true if the request was admitted.
    pub const fn is_allowed(self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Counter state for one client.
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    count: u32,
    window_start: Instant,
}

impl RateWindow {
    const fn fresh(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) > window
    }
}

/// Fixed-window rate limiter keyed by client identifier.
///
/// Construct once and share through an `Arc`; the limiter has no global
/// state and can be exercised in isolation.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    /// Create a limiter with the given configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the limiter configuration.
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Check and count one request from `client`.
    pub fn admit(&self, client: &str) -> Admission {
        self.admit_at(client, Instant::now())
    }

    /// Check and count one request from `client` as of `now`.
    pub fn admit_at(&self, client: &str, now: Instant) -> Admission {
        let mut windows = self.windows.lock();

        match windows.get_mut(client) {
            Some(entry) if !entry.is_stale(now, self.config.window) => {
                if entry.count < self.config.max_requests {
                    entry.count += 1;
                    Admission::Allow
                } else {
                    Admission::Deny
                }
            },
            Some(entry) => {
                *entry = RateWindow::fresh(now);
                Admission::Allow
            },
            None => {
                windows.insert(client.to_string(), RateWindow::fresh(now));
                Admission::Allow
            },
        }
    }

    /// Drop every entry whose window has aged past the window length.
    ///
    /// Returns the number of entries removed.
    pub fn evict_stale(&self) -> usize {
        self.evict_stale_at(Instant::now())
    }

    /// Drop stale entries as of `now`.
    pub fn evict_stale_at(&self, now: Instant) -> usize {
        let window = self.config.window;
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, entry| !entry.is_stale(now, window));
        before - windows.len()
    }

    /// Number of clients currently tracked.
    pub fn tracked_clients(&self) -> usize {
        self.windows.lock().len()
    }

    /// Start the background eviction sweep, running once per window.
    ///
    /// The task stops when `shutdown` (or the returned handle) is cancelled.
    pub fn spawn_eviction(self: &Arc<Self>, shutdown: &CancellationToken) -> PeriodicTask {
        let limiter = Arc::clone(self);
        PeriodicTask::spawn(
            "rate-limit-eviction",
            self.config.window,
            false,
            shutdown,
            move || {
                let limiter = Arc::clone(&limiter);
                async move {
                    let evicted = limiter.evict_stale();
                    if evicted > 0 {
                        debug!(
                            evicted,
                            remaining = limiter.tracked_clients(),
                            "Evicted stale rate-limit windows"
                        );
                    }
                }
            },
        )
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
