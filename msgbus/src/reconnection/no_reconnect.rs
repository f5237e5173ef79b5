//! No reconnection strategy.
//!
//! Gives up on the first failure. Useful for one-shot tools and for tests
//! that need a lost connection to stay lost.

use super::traits::{ReconnectionMetrics, ReconnectionStrategy};
use crate::session::SessionError;
use parking_lot::Mutex;
use std::time::Duration;

/// Never attempts to reconnect after a connection failure.
///
/// # Examples
///
/// ```
/// use msgbus::reconnection::NoReconnect;
///
/// let strategy = NoReconnect::new();
/// ```
#[derive(Debug, Default)]
pub struct NoReconnect {
    metrics: Mutex<ReconnectionMetrics>,
}

impl NoReconnect {
    /// Create a new no-reconnect strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current metrics.
    pub fn metrics(&self) -> ReconnectionMetrics {
        self.metrics.lock().clone()
    }
}

impl ReconnectionStrategy for NoReconnect {
    fn should_reconnect(&self, _attempt: u32, _last_error: &SessionError) -> bool {
        false
    }

    fn next_delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
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
        "NoReconnect"
    }
}
