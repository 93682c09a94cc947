//! Client-side throttle for search calls.
//!
//! Enforces both a minimum spacing between calls and a cap per rolling
//! minute, so a busy worker pool does not trip the catalog's own limits.

use shared::config::RateLimitConfig;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::time::sleep;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limiter with per-second spacing and a per-minute cap
#[derive(Debug)]
pub struct RateLimiter {
    /// Minimum spacing between calls
    min_interval: Duration,
    /// Calls allowed per rolling minute
    max_per_minute: usize,
    /// Call timestamps inside the current window, oldest first
    recent: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(requests_per_second: f64, requests_per_minute: u32) -> Self {
        let min_interval = if requests_per_second > 0.0 {
            Duration::from_secs_f64(1.0 / requests_per_second)
        } else {
            Duration::ZERO
        };

        Self {
            min_interval,
            max_per_minute: requests_per_minute.max(1) as usize,
            recent: VecDeque::with_capacity(requests_per_minute as usize),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.requests_per_minute)
    }

    /// How long the next call has to wait, given the calls recorded so far.
    fn delay_at(&mut self, now: Instant) -> Duration {
        while let Some(&oldest) = self.recent.front() {
            if now.duration_since(oldest) >= WINDOW {
                self.recent.pop_front();
            } else {
                break;
            }
        }

        let minute_wait = if self.recent.len() >= self.max_per_minute {
            self.recent
                .front()
                .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        let spacing_wait = self
            .recent
            .back()
            .map(|&last| self.min_interval.saturating_sub(now.duration_since(last)))
            .unwrap_or_default();

        minute_wait.max(spacing_wait)
    }

    /// Wait until a call is allowed, then record it.
    pub async fn acquire(&mut self) {
        let wait = self.delay_at(Instant::now());
        if !wait.is_zero() {
            tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit: delaying search");
            sleep(wait).await;
        }

        self.recent.push_back(Instant::now());
    }

    /// Calls recorded in the last minute
    pub fn current_minute_count(&mut self) -> usize {
        self.delay_at(Instant::now());
        self.recent.len()
    }
}
