//! Reconnect Backoff
//!
//! Decides how long an upstream feed waits after a failed connection and when
//! it stops trying. The wait before retry `n` (counting from zero) is
//! `initial_delay * multiplier^n`, capped at `max_delay` and spread by up to
//! `jitter_factor` either way. Any connection that gets as far as subscribing
//! clears the failure count.

use std::time::Duration;

use rand::Rng;

use super::feed::FeedError;
use crate::infrastructure::config::WebSocketSettings;

/// Backoff parameters shared by every feed.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Wait after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any wait.
    pub max_delay: Duration,
    /// Growth factor between consecutive waits.
    pub multiplier: f64,
    /// Randomization as a fraction of the wait (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Consecutive failures tolerated before the feed gives up (0 = never).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from_websocket_settings(&WebSocketSettings::default())
    }
}

impl ReconnectConfig {
    /// Retry immediately, without limit.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
            jitter_factor: 0.0,
            max_attempts: 0,
        }
    }

    /// Backoff configured from the relay's upstream settings.
    #[must_use]
    pub const fn from_websocket_settings(settings: &WebSocketSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: 0.1,
            max_attempts: settings.max_reconnect_attempts,
        }
    }

    /// Un-jittered wait before retry `retry` (zero-based).
    #[must_use]
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    const fn gives_up_after(&self, failures: u32) -> bool {
        self.max_attempts > 0 && failures >= self.max_attempts
    }
}

/// Failure bookkeeping for one feed.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    failures: u32,
}

impl ReconnectPolicy {
    /// Start with a clean failure count.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Record a failed connection and return the wait before the next one.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::MaxReconnectAttemptsExceeded`] once the feed has
    /// used up its retries; the count is left as is.
    pub fn on_failure(&mut self) -> Result<Duration, FeedError> {
        if self.config.gives_up_after(self.failures) {
            return Err(FeedError::MaxReconnectAttemptsExceeded);
        }
        let delay = self.config.base_delay(self.failures);
        self.failures += 1;
        Ok(self.jittered(delay))
    }

    /// Record a connection that reached the subscribed state.
    pub const fn on_connected(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last good connection.
    #[must_use]
    pub const fn failures(&self) -> u32 {
        self.failures
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if delay.is_zero() || self.config.jitter_factor <= 0.0 {
            return delay;
        }
        let spread = self.config.jitter_factor.min(1.0);
        delay.mul_f64(1.0 + rand::rng().random_range(-spread..=spread))
    }
}
