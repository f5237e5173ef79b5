//! Reconnection strategies for handling connection failures.
//!
//! A strategy is handed to the transport when a connection is opened. The
//! transport asks it whether and when to retry; the client adapter only sees
//! the resulting `on_connection_open(reconnected)` and `on_transport_error`
//! callbacks.
//!
//! # Available Strategies
//!
//! - [`ExponentialBackoff`]: Increases delay exponentially with optional jitter
//! - [`FixedDelay`]: Uses a constant delay between attempts
//! - [`NoReconnect`]: Never attempts to reconnect
//!
//! # Examples
//!
//! ```
//! use msgbus::reconnection::{FixedDelay, ReconnectionStrategy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let strategy: Arc<dyn ReconnectionStrategy> = Arc::new(FixedDelay::new(Duration::from_secs(5)));
//! assert_eq!(strategy.name(), "FixedDelay");
//! ```

mod exponential;
mod fixed;
mod no_reconnect;
mod traits;

pub use exponential::{ExponentialBackoff, ExponentialBackoffBuilder};
pub use fixed::{FixedDelay, FixedDelayBuilder};
pub use no_reconnect::NoReconnect;
pub use traits::{ReconnectionMetrics, ReconnectionStrategy};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionError;
    use std::time::Duration;

    #[test]
    fn test_all_strategies_implement_trait() {
        let strategies: Vec<Box<dyn ReconnectionStrategy>> = vec![
            Box::new(ExponentialBackoff::default()),
            Box::new(FixedDelay::default()),
            Box::new(NoReconnect::new()),
        ];
        let error = SessionError::connection_lost("test");

        for strategy in strategies {
            assert!(!strategy.name().is_empty());
            let _ = strategy.should_reconnect(0, &error);
            assert!(strategy.next_delay(0) <= Duration::from_secs(60));
            strategy.on_disconnected(&error);
            strategy.on_connected();
            strategy.reset();
        }
    }
}
