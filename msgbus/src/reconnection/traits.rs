//! Reconnection strategy traits and types.
//!
//! Transports consult a [`ReconnectionStrategy`] every time a connection
//! attempt fails or an established connection is lost. The client adapter
//! never reconnects by itself; it only reacts to the lifecycle callbacks the
//! transport emits while following the strategy.

use crate::session::SessionError;
use std::time::Duration;

/// A strategy for handling reconnection attempts after connection failures.
///
/// Strategies are called from transport driver threads, so every method is
/// synchronous and must return promptly. Sleeping for [`next_delay`] is the
/// transport's job.
///
/// [`next_delay`]: ReconnectionStrategy::next_delay
///
/// # Examples
///
/// ```
/// use msgbus::reconnection::{ExponentialBackoff, ReconnectionStrategy};
/// use std::time::Duration;
///
/// let strategy = ExponentialBackoff::builder()
///     .initial_delay(Duration::from_millis(100))
///     .max_delay(Duration::from_secs(30))
///     .build();
/// assert_eq!(strategy.name(), "ExponentialBackoff");
/// ```
pub trait ReconnectionStrategy: Send + Sync {
    /// Determine if reconnection should be attempted.
    ///
    /// # Arguments
    ///
    /// * `attempt` - The current attempt number (0-indexed)
    /// * `last_error` - The error that caused the disconnection
    fn should_reconnect(&self, attempt: u32, last_error: &SessionError) -> bool;

    /// Calculate the delay before the next reconnection attempt.
    fn next_delay(&self, attempt: u32) -> Duration;

    /// Called when a connection is successfully established.
    fn on_connected(&self);

    /// Called when a connection attempt fails or a live connection drops.
    fn on_disconnected(&self, error: &SessionError);

    /// Reset the strategy's internal state.
    fn reset(&self);

    /// Get a human-readable name for this strategy.
    fn name(&self) -> &str;
}

/// Counters describing reconnection activity.
#[derive(Debug, Clone, Default)]
pub struct ReconnectionMetrics {
    /// Total number of reconnection attempts
    pub total_attempts: u64,
    /// Number of successful connections
    pub successful_reconnections: u64,
    /// Number of failed attempts and drops
    pub failed_reconnections: u64,
    /// Current consecutive failures
    pub consecutive_failures: u32,
    /// Last error encountered
    pub last_error: Option<String>,
}

impl ReconnectionMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reconnection attempt.
    pub fn record_attempt(&mut self) {
        self.total_attempts += 1;
    }

    /// Record a successful connection.
    pub fn record_success(&mut self) {
        self.successful_reconnections += 1;
        self.consecutive_failures = 0;
        self.last_error = None;
    }

    /// Record a failed attempt or a dropped connection.
    pub fn record_failure(&mut self, error: &SessionError) {
        self.failed_reconnections += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
    }

    /// Reset all metrics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_record_success_clears_failures() {
        let mut metrics = ReconnectionMetrics::new();
        metrics.record_failure(&SessionError::connection_lost("reset by peer"));
        metrics.record_failure(&SessionError::connection_lost("reset by peer"));
        assert_eq!(metrics.consecutive_failures, 2);
        assert!(metrics.last_error.as_deref().unwrap().contains("reset by peer"));

        metrics.record_success();

        assert_eq!(metrics.successful_reconnections, 1);
        assert_eq!(metrics.failed_reconnections, 2);
        assert_eq!(metrics.consecutive_failures, 0);
        assert!(metrics.last_error.is_none());
    }

    #[test]
    fn test_metrics_reset() {
        let mut metrics = ReconnectionMetrics::new();
        metrics.record_attempt();
        metrics.record_attempt();
        metrics.record_failure(&SessionError::connection_lost("gone"));

        metrics.reset();

        assert_eq!(metrics.total_attempts, 0);
        assert_eq!(metrics.failed_reconnections, 0);
        assert!(metrics.last_error.is_none());
    }
}
