//! Exponential backoff reconnection strategy.
//!
//! Delays grow by a constant multiplier per attempt up to a ceiling, with
//! optional jitter so that a fleet of clients losing the same broker does not
//! reconnect in lockstep.

use super::traits::{ReconnectionMetrics, ReconnectionStrategy};
use crate::session::SessionError;
use parking_lot::Mutex;
use std::time::Duration;

/// Exponential backoff strategy.
///
/// # Examples
///
/// ```
/// use msgbus::reconnection::ExponentialBackoff;
/// use std::time::Duration;
///
/// // The policy a broker client uses by default
/// let strategy = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_secs(1))
///     .max_delay(Duration::from_secs(60))
///     .multiplier(5.0)
///     .jitter(false)
///     .max_attempts(Some(10))
///     .build();
/// ```
#[derive(Debug)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    /// None = unlimited
    max_attempts: Option<u32>,
    metrics: Mutex<ReconnectionMetrics>,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        ExponentialBackoffBuilder::default().build()
    }
}

impl ExponentialBackoff {
    /// Create a new builder for configuring exponential backoff.
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Get the current metrics.
    pub fn metrics(&self) -> ReconnectionMetrics {
        self.metrics.lock().clone()
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = if base_ms.is_finite() && base_ms < self.max_delay.as_millis() as f64 {
            Duration::from_millis(base_ms as u64)
        } else {
            self.max_delay
        };

        if self.jitter {
            let jitter_ms = (rand::random::<f64>() * capped.as_millis() as f64) as u64;
            Duration::from_millis(jitter_ms)
        } else {
            capped
        }
    }
}

impl ReconnectionStrategy for ExponentialBackoff {
    fn should_reconnect(&self, attempt: u32, last_error: &SessionError) -> bool {
        if !last_error.is_recoverable() {
            return false;
        }
        let allowed = self.max_attempts.is_none_or(|max| attempt < max);
        if allowed {
            self.metrics.lock().record_attempt();
        }
        allowed
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        self.calculate_delay(attempt)
    }

    fn on_connected(&self) {
        self.metrics.lock().record_success();
    }

    fn on_disconnected(&self, error: &SessionError) {
        self.metrics.lock().record_failure(error);
    }

    fn reset(&self) {
        self.metrics.lock().reset();
    }

    fn name(&self) -> &str {
        "ExponentialBackoff"
    }
}

/// Builder for configuring exponential backoff strategy.
#[derive(Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    max_attempts: Option<u32>,
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: true,
            max_attempts: None,
        }
    }
}

impl ExponentialBackoffBuilder {
    /// Set the initial delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the multiplier for exponential growth.
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Enable or disable jitter.
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the maximum number of attempts.
    pub fn max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    /// Build the exponential backoff strategy.
    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter: self.jitter,
            max_attempts: self.max_attempts,
            metrics: Mutex::new(ReconnectionMetrics::new()),
        }
    }
}
