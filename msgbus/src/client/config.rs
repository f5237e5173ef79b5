//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Client configuration.

use crate::dispatch::DEFAULT_QUEUE_CAPACITY;
use crate::reconnection::{ExponentialBackoff, ReconnectionStrategy};
use crate::session::ConnectOptions;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Well-known local AMQP broker endpoint.
pub const DEFAULT_AMQP_ENDPOINT: &str = "amqp://127.0.0.1:5672";
/// Well-known local MQTT broker endpoint.
pub const DEFAULT_MQTT_ENDPOINT: &str = "tcp://localhost:1883";
/// Endpoint conventionally used with the in-process broker.
pub const DEFAULT_MEMORY_ENDPOINT: &str = "memory://localhost";

/// Environment variable overriding [`ClientConfig::endpoint`].
pub const ENV_ENDPOINT: &str = "MSGBUS_ENDPOINT";
/// Environment variable overriding [`ClientConfig::name`].
pub const ENV_CLIENT_NAME: &str = "MSGBUS_CLIENT_NAME";
/// Environment variable overriding [`ClientConfig::operation_timeout`], in milliseconds.
pub const ENV_TIMEOUT_MS: &str = "MSGBUS_TIMEOUT_MS";

/// Configuration of a client adapter or message bus.
///
/// # Examples
///
/// ```rust
/// use msgbus::client::{ClientConfig, DEFAULT_MEMORY_ENDPOINT};
/// use std::time::Duration;
///
/// let config = ClientConfig::new("inventory")
///     .with_endpoint(DEFAULT_MEMORY_ENDPOINT)
///     .with_operation_timeout(Duration::from_millis(500));
/// assert_eq!(config.name, "inventory");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Broker endpoint URI.
    pub endpoint: String,

    /// Client name, used as the broker client id and in logs.
    pub name: String,

    /// Bound on every blocking wait (connect, send, receive).
    ///
    /// Default: 2 seconds
    pub operation_timeout: Duration,

    /// Strategy the transport follows after a failure.
    ///
    /// Default: exponential backoff from 1 s to 60 s, multiplier 5, at most
    /// 10 attempts, no jitter
    pub reconnection_strategy: Arc<dyn ReconnectionStrategy>,

    /// Idle period after which the broker may consider the client gone.
    ///
    /// Default: 5 seconds
    pub idle_timeout: Duration,

    /// Number of listener dispatch threads.
    ///
    /// Default: 2
    pub dispatch_workers: usize,

    /// Messages each dispatch worker may have queued before further ones
    /// are dropped.
    ///
    /// Default: 1024
    pub dispatch_queue_capacity: usize,
}

impl ClientConfig {
    /// Creates a default configuration with the given client name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Applies `MSGBUS_*` environment overrides to the defaults.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(endpoint) = lookup(ENV_ENDPOINT).filter(|v| !v.is_empty()) {
            self.endpoint = endpoint;
        }
        if let Some(name) = lookup(ENV_CLIENT_NAME).filter(|v| !v.is_empty()) {
            self.name = name;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            match raw.trim().parse::<u64>() {
                Ok(millis) => self.operation_timeout = Duration::from_millis(millis),
                Err(error) => warn!(variable = ENV_TIMEOUT_MS, value = %raw, error = %error, "ignoring override"),
            }
        }
        self
    }

    /// Sets the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the client name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the operation timeout.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the reconnection strategy.
    pub fn with_reconnection_strategy(mut self, strategy: Arc<dyn ReconnectionStrategy>) -> Self {
        self.reconnection_strategy = strategy;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Sets the number of dispatch workers.
    pub fn with_dispatch_workers(mut self, workers: usize) -> Self {
        self.dispatch_workers = workers;
        self
    }

    /// Sets the per-worker dispatch queue capacity.
    pub fn with_dispatch_queue_capacity(mut self, capacity: usize) -> Self {
        self.dispatch_queue_capacity = capacity;
        self
    }

    /// Options handed to the transport on connect.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions::new(self.name.clone())
            .with_reconnection_strategy(Arc::clone(&self.reconnection_strategy))
            .with_idle_timeout(self.idle_timeout)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            endpoint: DEFAULT_AMQP_ENDPOINT.to_string(),
            name: format!("msgbus-{}", &suffix[..8]),
            operation_timeout: Duration::from_secs(2),
            reconnection_strategy: Arc::new(
                ExponentialBackoff::builder()
                    .initial_delay(Duration::from_secs(1))
                    .max_delay(Duration::from_secs(60))
                    .multiplier(5.0)
                    .jitter(false)
                    .max_attempts(Some(10))
                    .build(),
            ),
            idle_timeout: Duration::from_secs(5),
            dispatch_workers: 2,
            dispatch_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("name", &self.name)
            .field("operation_timeout", &self.operation_timeout)
            .field("reconnection_strategy", &self.reconnection_strategy.name())
            .field("idle_timeout", &self.idle_timeout)
            .field("dispatch_workers", &self.dispatch_workers)
            .field("dispatch_queue_capacity", &self.dispatch_queue_capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnection::NoReconnect;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_AMQP_ENDPOINT);
        assert!(config.name.starts_with("msgbus-"));
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.dispatch_workers, 2);
        assert_eq!(config.dispatch_queue_capacity, 1024);
        assert_eq!(config.reconnection_strategy.name(), "ExponentialBackoff");
        assert_eq!(config.reconnection_strategy.next_delay(1), Duration::from_secs(5));
    }

    #[test]
    fn test_default_names_are_unique() {
        assert_ne!(ClientConfig::default().name, ClientConfig::default().name);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_ENDPOINT, "tcp://broker:1883"),
            (ENV_CLIENT_NAME, "agent"),
            (ENV_TIMEOUT_MS, "750"),
        ]
        .into_iter()
        .collect();

        let config = ClientConfig::default().with_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.endpoint, "tcp://broker:1883");
        assert_eq!(config.name, "agent");
        assert_eq!(config.operation_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_bad_timeout_override_ignored() {
        let config = ClientConfig::default()
            .with_overrides(|key| (key == ENV_TIMEOUT_MS).then(|| "soon".to_string()));
        assert_eq!(config.operation_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_connect_options_carry_strategy() {
        let config = ClientConfig::new("c1")
            .with_reconnection_strategy(Arc::new(NoReconnect::new()))
            .with_idle_timeout(Duration::from_secs(30));
        let options = config.connect_options();
        assert_eq!(options.client_id, "c1");
        assert_eq!(options.idle_timeout, Duration::from_secs(30));
        assert_eq!(options.reconnection_strategy.name(), "NoReconnect");
    }

    #[test]
    fn test_debug_output() {
        let debug = format!("{:?}", ClientConfig::new("dbg"));
        assert!(debug.contains("dbg"));
        assert!(debug.contains("ExponentialBackoff"));
    }
}
