//! Fixed delay reconnection strategy.

use super::traits::{ReconnectionMetrics, ReconnectionStrategy};
use crate::session::SessionError;
use parking_lot::Mutex;
use std::time::Duration;

/// Waits a constant amount of time between attempts.
///
/// Useful in tests, where a short predictable delay keeps reconnection
/// scenarios fast and deterministic.
///
/// # Examples
///
/// ```
/// use msgbus::reconnection::FixedDelay;
/// use std::time::Duration;
///
/// let strategy = FixedDelay::builder()
///     .delay(Duration::from_millis(50))
///     .max_attempts(Some(20))
///     .build();
/// ```
#[derive(Debug)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<u32>,
    metrics: Mutex<ReconnectionMetrics>,
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FixedDelay {
    /// Create a new builder for configuring fixed delay.
    pub fn builder() -> FixedDelayBuilder {
        FixedDelayBuilder::default()
    }

    /// Create an unlimited fixed delay strategy with the given delay.
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
            metrics: Mutex::new(ReconnectionMetrics::new()),
        }
    }

    /// Get the current metrics.
    pub fn metrics(&self) -> ReconnectionMetrics {
        self.metrics.lock().clone()
    }
}

impl ReconnectionStrategy for FixedDelay {
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

    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
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
        "FixedDelay"
    }
}

/// Builder for configuring fixed delay strategy.
#[derive(Debug)]
pub struct FixedDelayBuilder {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl Default for FixedDelayBuilder {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

impl FixedDelayBuilder {
    /// Set the delay between attempts.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the maximum number of attempts.
    pub fn max_attempts(mut self, max: Option<u32>) -> Self {
        self.max_attempts = max;
        self
    }

    /// Build the fixed delay strategy.
    pub fn build(self) -> FixedDelay {
        FixedDelay {
            delay: self.delay,
            max_attempts: self.max_attempts,
            metrics: Mutex::new(ReconnectionMetrics::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_delay() {
        let strategy = FixedDelay::new(Duration::from_millis(250));
        assert_eq!(strategy.next_delay(0), Duration::from_millis(250));
        assert_eq!(strategy.next_delay(42), Duration::from_millis(250));
    }

    #[test]
    fn test_attempt_limit() {
        let strategy = FixedDelay::builder().max_attempts(Some(2)).build();
        let error = SessionError::connection_lost("test");

        assert!(strategy.should_reconnect(0, &error));
        assert!(strategy.should_reconnect(1, &error));
        assert!(!strategy.should_reconnect(2, &error));
    }

    #[test]
    fn test_closed_session_is_final() {
        let strategy = FixedDelay::default();
        assert!(!strategy.should_reconnect(0, &SessionError::Closed));
    }
}
