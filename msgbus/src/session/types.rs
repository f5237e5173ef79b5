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

use crate::reconnection::{ExponentialBackoff, ReconnectionStrategy};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next identifier.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw value.
    pub const fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection-{}", self.0)
    }
}

/// Identifier of a receiver link, unique within its connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(u64);

impl ReceiverId {
    /// Wraps a raw value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "receiver-{}", self.0)
    }
}

/// Handle to an open receiver link.
///
/// Handed to [`SessionHandler::on_receiver_open`] and needed later to close
/// the receiver again.
///
/// [`SessionHandler::on_receiver_open`]: super::SessionHandler::on_receiver_open
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiverLink {
    id: ReceiverId,
    address: String,
}

impl ReceiverLink {
    /// Creates a handle for the receiver `id` attached to `address`.
    pub fn new(id: ReceiverId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }

    /// Returns the receiver identifier.
    pub fn id(&self) -> ReceiverId {
        self.id
    }

    /// Returns the address the receiver is attached to.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for ReceiverLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.address)
    }
}

/// Parameters a transport needs to open and maintain a connection.
#[derive(Clone)]
pub struct ConnectOptions {
    /// Client identifier presented to the broker.
    pub client_id: String,
    /// Strategy consulted on every failed or lost connection.
    pub reconnection_strategy: Arc<dyn ReconnectionStrategy>,
    /// Idle period after which the broker may consider the client gone.
    pub idle_timeout: Duration,
}

impl ConnectOptions {
    /// Creates options for `client_id` with the default exponential backoff.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            reconnection_strategy: Arc::new(ExponentialBackoff::default()),
            idle_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the reconnection strategy.
    pub fn with_reconnection_strategy(mut self, strategy: Arc<dyn ReconnectionStrategy>) -> Self {
        self.reconnection_strategy = strategy;
        self
    }

    /// Sets the idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("client_id", &self.client_id)
            .field("reconnection_strategy", &self.reconnection_strategy.name())
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconnection::NoReconnect;

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn test_receiver_link_display() {
        let link = ReceiverLink::new(ReceiverId::new(4), "/queueTest");
        assert_eq!(link.to_string(), "receiver-4@/queueTest");
        assert_eq!(link.address(), "/queueTest");
    }

    #[test]
    fn test_connect_options_debug_names_strategy() {
        let options =
            ConnectOptions::new("client-a").with_reconnection_strategy(Arc::new(NoReconnect::new()));
        let debug = format!("{:?}", options);
        assert!(debug.contains("client-a"));
        assert!(debug.contains("NoReconnect"));
    }
}
