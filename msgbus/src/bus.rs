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

//! Publish/subscribe and request/reply facade.
//!
//! A [`ClientAdapter`] holds a single subscription. [`MessageBus`] lifts that
//! limit by owning one publisher adapter plus one adapter per subscription
//! key, all sharing one dispatch pool.

use crate::client::{ClientAdapter, ClientConfig, DeliveryState};
use crate::connection::ConnectionState;
use crate::dispatch::DispatchPool;
use crate::error::MsgBusError;
use crate::message::{CorrelationId, FROM, Message, TIMEOUT};
use crate::registry::MessageListener;
use crate::session::Transport;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How often unanswered reply slots are checked for expiry.
const REAP_INTERVAL: Duration = Duration::from_millis(100);

struct Subscriber {
    adapter: ClientAdapter,
    listener: MessageListener,
    /// Set for reply slots; the slot is dropped once this passes.
    expires: Option<Instant>,
}

/// Subscriptions by slot: topic or queue for subscriptions, correlation id
/// for pending replies.
struct Subscriptions {
    entries: Mutex<HashMap<String, Subscriber>>,
    closed: AtomicBool,
}

impl Subscriptions {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    fn take_expired(&self, now: Instant) -> Vec<(String, Subscriber)> {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, subscriber)| subscriber.expires.is_some_and(|expires| expires <= now))
            .map(|(slot, _)| slot.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|slot| entries.remove_entry(&slot))
            .collect()
    }
}

/// Drops reply slots whose window passed. Exits once the bus is gone or
/// closed.
fn spawn_reaper(client: &str, subscriptions: Weak<Subscriptions>) -> Result<(), MsgBusError> {
    let name = client.to_string();
    thread::Builder::new()
        .name(format!("msgbus-reaper-{name}"))
        .spawn(move || {
            loop {
                thread::sleep(REAP_INTERVAL);
                let Some(subscriptions) = subscriptions.upgrade() else {
                    break;
                };
                if subscriptions.closed.load(Ordering::Acquire) {
                    break;
                }
                // adapters close outside the table lock
                for (slot, expired) in subscriptions.take_expired(Instant::now()) {
                    debug!(client = %name, slot = %slot, "reply window expired");
                    drop(expired);
                }
            }
            trace!(client = %name, "reaper stopped");
        })
        .map(|_| ())
        .map_err(|source| MsgBusError::Spawn {
            what: format!("reaper of {client}"),
            source,
        })
}

/// Message bus client.
///
/// Every subscription and every pending reply gets its own
/// [`ClientAdapter`]. A reply slot opened by
/// [`send_request_with_listener`](Self::send_request_with_listener) is
/// released after its first reply, or once its reply window passes.
///
/// # Examples
///
/// ```rust
/// use msgbus::bus::MessageBus;
/// use msgbus::client::{ClientConfig, DEFAULT_MEMORY_ENDPOINT};
/// use msgbus::message::Message;
/// use msgbus::session::{MemoryBroker, MemoryTransport};
/// use std::sync::Arc;
///
/// let transport = Arc::new(MemoryTransport::new(MemoryBroker::new()));
/// let config = ClientConfig::new("docs").with_endpoint(DEFAULT_MEMORY_ENDPOINT);
/// let bus = MessageBus::new(transport, config).unwrap();
///
/// assert!(bus.connect().is_connected());
/// assert_eq!(bus.identify(), "Memory");
/// assert!(bus.publish("/news", Message::new("hello")).is_accepted());
/// ```
pub struct MessageBus {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    pool: DispatchPool,
    publisher: ClientAdapter,
    subscriptions: Arc<Subscriptions>,
    next_adapter: AtomicU64,
}

impl MessageBus {
    /// Creates a bus; nothing is connected until [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`MsgBusError::Spawn`] if the dispatch or reaper threads
    /// cannot start.
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self, MsgBusError> {
        let pool = DispatchPool::with_capacity(config.dispatch_workers, config.dispatch_queue_capacity)?;
        let subscriptions = Subscriptions::new();
        spawn_reaper(&config.name, Arc::downgrade(&subscriptions))?;
        let publisher_config = config.clone().with_name(format!("{}-pub", config.name));
        let publisher = ClientAdapter::with_pool(Arc::clone(&transport), publisher_config, pool.clone());
        Ok(Self {
            config,
            transport,
            pool,
            publisher,
            subscriptions,
            next_adapter: AtomicU64::new(1),
        })
    }

    /// Name of the underlying transport.
    pub fn identify(&self) -> &str {
        self.transport.name()
    }

    /// The bus client name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Connects the publisher and reports the resolved state.
    pub fn connect(&self) -> ConnectionState {
        let state = self.publisher.connect();
        info!(client = %self.config.name, endpoint = %self.config.endpoint, state = %state, "message bus connect");
        state
    }

    /// Publishes `message` on `topic`.
    pub fn publish(&self, topic: &str, message: Message) -> DeliveryState {
        self.publisher.send(self.addressed(topic, message))
    }

    /// Delivers messages published on `topic` to `listener`.
    ///
    /// Replaces any earlier subscription to the same topic.
    pub fn subscribe(&self, topic: &str, listener: MessageListener) -> DeliveryState {
        self.listen(topic, topic, None, listener, None)
    }

    /// Ends the subscription to `topic`.
    ///
    /// With `listener` given, only a subscription made with that same
    /// listener is ended.
    pub fn unsubscribe(&self, topic: &str, listener: Option<&MessageListener>) -> DeliveryState {
        let removed = {
            let mut entries = self.subscriptions.entries.lock();
            let matches = entries.get(topic).is_some_and(|subscriber| {
                listener.is_none_or(|listener| Arc::ptr_eq(listener, &subscriber.listener))
            });
            if matches { entries.remove(topic) } else { None }
        };

        match removed {
            Some(subscriber) => subscriber.adapter.unreceive(),
            None => {
                warn!(client = %self.config.name, topic = %topic, "no matching subscription");
                DeliveryState::Rejected
            }
        }
    }

    /// Sends `message` to `queue` without waiting for a reply.
    pub fn send_request(&self, queue: &str, message: Message) -> DeliveryState {
        self.publisher.send(self.addressed(queue, message))
    }

    /// Sends `message` to `queue`; the reply is delivered to `listener`.
    ///
    /// A correlation id and reply address are generated when missing. Only
    /// the first reply is delivered. The reply slot is released after it, or
    /// when no reply arrived within the message's `TIMEOUT` (seconds) or,
    /// without one, the operation timeout.
    pub fn send_request_with_listener(
        &self,
        queue: &str,
        mut message: Message,
        listener: MessageListener,
    ) -> DeliveryState {
        let correlation_id = match message.correlation_id() {
            Some(id) => id.to_string(),
            None => {
                let id = CorrelationId::new().to_string();
                message.set_correlation_id(id.as_str());
                id
            }
        };
        let reply_to = match message.reply_to() {
            Some(address) => address.to_string(),
            None => {
                let address = format!("/replies/{}", self.config.name);
                message.set_reply_to(address.as_str());
                address
            }
        };
        let window = message
            .get(TIMEOUT)
            .and_then(|seconds| seconds.trim().parse::<u64>().ok())
            .map_or(self.config.operation_timeout, Duration::from_secs);

        let once = self.first_reply_only(&correlation_id, listener);
        let expires = Instant::now() + window;
        let listening = self.listen(&correlation_id, &reply_to, Some(&correlation_id), once, Some(expires));
        if !listening.is_accepted() {
            return listening;
        }

        let sent = self.send_request(queue, message);
        if !sent.is_accepted() {
            let abandoned = self.subscriptions.entries.lock().remove(&correlation_id);
            drop(abandoned);
        }
        sent
    }

    /// Sends a reply to `queue`.
    pub fn send_reply(&self, queue: &str, message: Message) -> DeliveryState {
        self.publisher.send(self.addressed(queue, message))
    }

    /// Delivers requests arriving on `queue` to `listener`.
    pub fn receive(&self, queue: &str, listener: MessageListener) -> DeliveryState {
        self.listen(queue, queue, None, listener, None)
    }

    /// Sends `message` to `queue` and waits up to `timeout_secs` seconds for
    /// the reply.
    pub fn request(&self, queue: &str, message: Message, timeout_secs: u64) -> Option<Message> {
        let requester = self.adapter("req");
        if !requester.connect().is_connected() {
            warn!(client = %self.config.name, queue = %queue, "request not sent, not connected");
            return None;
        }
        requester.request(self.addressed(queue, message), Duration::from_secs(timeout_secs))
    }

    /// Closes every subscriber and the publisher.
    pub fn close(&self) {
        self.subscriptions.closed.store(true, Ordering::Release);
        let subscribers: Vec<Subscriber> = self
            .subscriptions
            .entries
            .lock()
            .drain()
            .map(|(_, subscriber)| subscriber)
            .collect();
        for subscriber in subscribers {
            subscriber.adapter.close();
        }
        self.publisher.close();
        debug!(client = %self.config.name, "message bus closed");
    }

    /// Number of active subscriptions and pending reply slots.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.entries.lock().len()
    }

    fn addressed(&self, address: &str, mut message: Message) -> Message {
        message.set_to(address);
        if message.from().is_none() {
            message = message.with(FROM, self.config.name.as_str());
        }
        message
    }

    fn adapter(&self, role: &str) -> ClientAdapter {
        let index = self.next_adapter.fetch_add(1, Ordering::Relaxed);
        let config = self
            .config
            .clone()
            .with_name(format!("{}-{role}-{index}", self.config.name));
        ClientAdapter::with_pool(Arc::clone(&self.transport), config, self.pool.clone())
    }

    /// Wraps `listener` so that the first reply releases the slot and later
    /// ones are dropped.
    ///
    /// Runs on a dispatch worker, so closing the slot's adapter there does
    /// not hold up the transport driver.
    fn first_reply_only(&self, slot: &str, listener: MessageListener) -> MessageListener {
        let subscriptions = Arc::downgrade(&self.subscriptions);
        let slot = slot.to_string();
        let client = self.config.name.clone();
        Arc::new(move |reply: Message| {
            let finished = subscriptions
                .upgrade()
                .and_then(|subscriptions| subscriptions.entries.lock().remove(&slot));
            let Some(finished) = finished else {
                debug!(client = %client, slot = %slot, "reply after slot was released, dropped");
                return;
            };
            listener(reply);
            drop(finished);
        })
    }

    /// Opens a dedicated adapter receiving on `address` and files it under
    /// `slot`.
    fn listen(
        &self,
        slot: &str,
        address: &str,
        filter: Option<&str>,
        listener: MessageListener,
        expires: Option<Instant>,
    ) -> DeliveryState {
        let adapter = self.adapter("sub");
        if !adapter.connect().is_connected() {
            return DeliveryState::Rejected;
        }
        let state = adapter.receive(address, filter, Arc::clone(&listener));
        if !state.is_accepted() {
            return state;
        }

        let subscriber = Subscriber {
            adapter,
            listener,
            expires,
        };
        let replaced = self.subscriptions.entries.lock().insert(slot.to_string(), subscriber);
        if let Some(previous) = replaced {
            debug!(client = %self.config.name, slot = %slot, "subscription replaced");
            drop(previous);
        }
        state
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        self.subscriptions.closed.store(true, Ordering::Release);
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("name", &self.config.name)
            .field("transport", &self.transport.name())
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}
