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

//! Single-slot subscription registry.
//!
//! Each client adapter owns one registry holding at most one subscription:
//! a key (topic, queue address or correlation id) and the listener that
//! receives messages routed to that key. Registering again replaces the
//! previous subscription.
//!
//! # Routing
//!
//! An inbound message carrying a correlation id but no reply-to address is a
//! reply and is routed on its correlation id. Everything else is routed on its
//! destination address. The key must match the subscription exactly.

use crate::message::Message;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback receiving routed messages on a dispatch worker.
pub type MessageListener = Arc<dyn Fn(Message) + Send + Sync + 'static>;

/// An active subscription.
#[derive(Clone)]
pub struct Subscription {
    key: String,
    listener: MessageListener,
}

impl Subscription {
    /// The key messages must route to.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The listener receiving matching messages.
    pub fn listener(&self) -> &MessageListener {
        &self.listener
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Outcome of routing an inbound message.
pub enum Route {
    /// The routing key matched the active subscription.
    Matched {
        /// The routing key
        key: String,
        /// The subscription's listener
        listener: MessageListener,
    },
    /// No subscription is registered for the routing key.
    Unmatched {
        /// The routing key that found no listener
        key: String,
    },
}

/// Returns the key an inbound message is routed on.
///
/// ```rust
/// use msgbus::message::{Message, CORRELATION_ID, REPLY_TO, TO};
/// use msgbus::registry::routing_key;
///
/// let direct = Message::new("").with(TO, "/topicTest");
/// assert_eq!(routing_key(&direct), "/topicTest");
///
/// let reply = Message::new("").with(TO, "/replies").with(CORRELATION_ID, "42");
/// assert_eq!(routing_key(&reply), "42");
///
/// let request = reply.clone().with(REPLY_TO, "/replies");
/// assert_eq!(routing_key(&request), "/replies");
/// ```
pub fn routing_key(message: &Message) -> &str {
    match (message.correlation_id(), message.reply_to()) {
        (Some(correlation_id), None) => correlation_id,
        _ => message.to().unwrap_or_default(),
    }
}

/// Thread-safe holder of at most one [`Subscription`].
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    slot: RwLock<Option<Subscription>>,
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the active subscription.
    ///
    /// Returns `false`, leaving the registry unchanged, if `key` is empty.
    pub fn set_subscription(&self, key: &str, listener: MessageListener) -> bool {
        if key.is_empty() {
            warn!("refusing subscription with an empty key");
            return false;
        }

        let previous = self.slot.write().replace(Subscription {
            key: key.to_string(),
            listener,
        });
        if let Some(previous) = previous {
            debug!(previous = %previous.key, key = %key, "subscription replaced");
        }
        true
    }

    /// Removes the active subscription, returning it.
    pub fn clear(&self) -> Option<Subscription> {
        self.slot.write().take()
    }

    /// Key of the active subscription.
    pub fn current_key(&self) -> Option<String> {
        self.slot.read().as_ref().map(|s| s.key.clone())
    }

    /// Returns `true` if no subscription is registered.
    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }

    /// Listener registered under exactly `key`.
    pub fn lookup(&self, key: &str) -> Option<MessageListener> {
        self.slot
            .read()
            .as_ref()
            .filter(|s| s.key == key)
            .map(|s| Arc::clone(&s.listener))
    }

    /// Resolves the listener for an inbound message.
    pub fn route(&self, message: &Message) -> Route {
        let key = routing_key(message);
        match self.lookup(key) {
            Some(listener) => Route::Matched {
                key: key.to_string(),
                listener,
            },
            None => Route::Unmatched {
                key: key.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CORRELATION_ID, REPLY_TO, TO};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener(counter: &Arc<AtomicUsize>) -> MessageListener {
        let counter = Arc::clone(counter);
        Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    fn invoke(route: Route, message: Message) -> Option<String> {
        match route {
            Route::Matched { key, listener } => {
                listener(message);
                Some(key)
            }
            Route::Unmatched { .. } => None,
        }
    }

    #[test]
    fn test_empty_key_rejected() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.set_subscription("", Arc::new(|_| {})));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_second_subscription_replaces_first() {
        let registry = SubscriptionRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        assert!(registry.set_subscription("/a", counting_listener(&first)));
        assert!(registry.set_subscription("/b", counting_listener(&second)));
        assert_eq!(registry.current_key().as_deref(), Some("/b"));

        let to_a = Message::new("").with(TO, "/a");
        let to_b = Message::new("").with(TO, "/b");
        assert!(invoke(registry.route(&to_a), to_a).is_none());
        assert_eq!(invoke(registry.route(&to_b), to_b).as_deref(), Some("/b"));

        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reply_routed_by_correlation_id() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        registry.set_subscription("corr-1", counting_listener(&hits));

        let reply = Message::new("").with(TO, "/replies").with(CORRELATION_ID, "corr-1");
        assert_eq!(invoke(registry.route(&reply), reply).as_deref(), Some("corr-1"));

        let other = Message::new("").with(TO, "/replies").with(CORRELATION_ID, "corr-2");
        assert!(invoke(registry.route(&other), other).is_none());

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_request_routed_by_address() {
        let message = Message::new("")
            .with(TO, "/queueTest")
            .with(CORRELATION_ID, "c")
            .with(REPLY_TO, "/r");
        assert_eq!(routing_key(&message), "/queueTest");
    }

    #[test]
    fn test_prefix_does_not_match() {
        let registry = SubscriptionRegistry::new();
        registry.set_subscription("/topic", Arc::new(|_| {}));

        let message = Message::new("").with(TO, "/topicTest");
        assert!(matches!(registry.route(&message), Route::Unmatched { key } if key == "/topicTest"));
    }

    #[test]
    fn test_clear_returns_subscription() {
        let registry = SubscriptionRegistry::new();
        registry.set_subscription("/a", Arc::new(|_| {}));

        let removed = registry.clear().unwrap();
        assert_eq!(removed.key(), "/a");
        assert!(registry.is_empty());
        assert!(registry.clear().is_none());
    }
}
