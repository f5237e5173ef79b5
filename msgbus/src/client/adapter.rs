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

//! Blocking client over a callback-driven transport session.
//!
//! The transport reports progress through [`SessionHandler`] callbacks on its
//! driver thread. A [`ClientAdapter`] turns each exchange into a blocking call:
//! it resets the completion signal of the phase involved, submits a work unit
//! to the connection's queue and waits on the signal for at most the
//! configured operation timeout.
//!
//! ```text
//!  caller thread                      driver thread
//!  ─────────────                      ─────────────
//!  send(msg)
//!   ├─ reset send signal
//!   ├─ store outgoing message
//!   ├─ enqueue open_sender ─────────> open_sender(address)
//!   │                                  └─ on_sender_open(sender)
//!   │                                      ├─ sender.send(outgoing)
//!   └─ wait(send signal) <─────────────────└─ fulfill
//! ```

use super::{ClientConfig, DeliveryState};
use crate::connection::{ConnectionMonitor, ConnectionState};
use crate::dispatch::DispatchPool;
use crate::error::MsgBusError;
use crate::message::{CorrelationId, Message};
use crate::registry::{MessageListener, Route, SubscriptionRegistry};
use crate::session::{
    Connection, Delivery, ReceiverId, ReceiverLink, SenderLink, SessionError, SessionHandler,
    Transport, WorkQueue,
};
use crate::signal::{CompletionSignal, SignalError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Outcome of a link exchange; `Err` carries the transport's reason.
type LinkSignal = CompletionSignal<Result<(), String>>;

/// Bookkeeping shared between caller threads and driver callbacks.
struct LinkState {
    send: Arc<LinkSignal>,
    receive: Arc<LinkSignal>,
    outgoing: Option<Message>,
    pending_open: Option<String>,
    pending_close: Option<ReceiverId>,
    receiver: Option<ReceiverLink>,
}

impl LinkState {
    fn new() -> Self {
        Self {
            send: Arc::new(CompletionSignal::new()),
            receive: Arc::new(CompletionSignal::new()),
            outgoing: None,
            pending_open: None,
            pending_close: None,
            receiver: None,
        }
    }
}

struct AdapterInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    monitor: ConnectionMonitor,
    registry: SubscriptionRegistry,
    pool: DispatchPool,
    link: Mutex<LinkState>,
    connection: Mutex<Option<Connection>>,
    operation: Mutex<()>,
}

/// Blocking messaging client bound to one broker connection.
///
/// An adapter holds at most one receiver and one subscription at a time.
/// Operations on one adapter are serialized; use several adapters (or the
/// [`MessageBus`](crate::bus::MessageBus) facade) for concurrent
/// subscriptions.
///
/// Dropping the adapter closes its receiver and connection.
///
/// # Examples
///
/// ```rust
/// use msgbus::client::{ClientAdapter, ClientConfig, DEFAULT_MEMORY_ENDPOINT};
/// use msgbus::connection::ConnectionState;
/// use msgbus::message::Message;
/// use msgbus::session::{MemoryBroker, MemoryTransport};
/// use std::sync::Arc;
///
/// let transport = Arc::new(MemoryTransport::new(MemoryBroker::new()));
/// let config = ClientConfig::new("doc").with_endpoint(DEFAULT_MEMORY_ENDPOINT);
/// let adapter = ClientAdapter::new(transport, config).unwrap();
///
/// assert_eq!(adapter.connect(), ConnectionState::Connected);
/// let message = Message::build_message("doc", "/news", "greeting", "hello");
/// assert!(adapter.send(message).is_accepted());
/// ```
pub struct ClientAdapter {
    inner: Arc<AdapterInner>,
}

impl ClientAdapter {
    /// Creates an adapter with its own dispatch pool.
    ///
    /// # Errors
    ///
    /// Returns [`MsgBusError::Spawn`] if the dispatch threads cannot start.
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Result<Self, MsgBusError> {
        let pool = DispatchPool::with_capacity(config.dispatch_workers, config.dispatch_queue_capacity)?;
        Ok(Self::with_pool(transport, config, pool))
    }

    /// Creates an adapter sharing an existing dispatch pool.
    pub fn with_pool(transport: Arc<dyn Transport>, config: ClientConfig, pool: DispatchPool) -> Self {
        Self {
            inner: Arc::new(AdapterInner {
                config,
                transport,
                monitor: ConnectionMonitor::new(),
                registry: SubscriptionRegistry::new(),
                pool,
                link: Mutex::new(LinkState::new()),
                connection: Mutex::new(None),
                operation: Mutex::new(()),
            }),
        }
    }

    /// The client name.
    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    /// The adapter's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Connection state as last reported, without waiting.
    pub fn state(&self) -> ConnectionState {
        self.inner.monitor.state()
    }

    /// Opens the broker connection unless one is already running, then
    /// waits up to the operation timeout for it to resolve.
    pub fn connect(&self) -> ConnectionState {
        {
            let mut connection = self.inner.connection.lock();
            if !connection.as_ref().is_some_and(Connection::is_active) {
                self.open_connection(&mut connection);
            }
        }
        self.connected()
    }

    /// Resolves the connection state, waiting up to the operation timeout if
    /// it is not yet known.
    pub fn connected(&self) -> ConnectionState {
        self.inner.monitor.connected(self.inner.config.operation_timeout)
    }

    /// Sends `message` to the address in its `TO` metadata.
    ///
    /// `Accepted` once the transport opened a sender for the address and
    /// handed it the message within the operation timeout.
    pub fn send(&self, message: Message) -> DeliveryState {
        let _operation = self.inner.operation.lock();
        let result = self.try_send(message);
        self.outcome("send", result)
    }

    /// Opens a receiver on `address` and routes its messages to `listener`.
    ///
    /// The subscription is keyed by `filter` when given and non-empty,
    /// otherwise by `address`. A receiver already open on this adapter is
    /// closed first.
    pub fn receive(&self, address: &str, filter: Option<&str>, listener: MessageListener) -> DeliveryState {
        let _operation = self.inner.operation.lock();
        let result = self.try_receive(address, filter, listener);
        self.outcome("receive", result)
    }

    /// Closes the active receiver and clears the subscription.
    ///
    /// The subscription is cleared even if the close is not confirmed.
    /// `Rejected` if there was no receiver.
    pub fn unreceive(&self) -> DeliveryState {
        let _operation = self.inner.operation.lock();
        let result = self.try_unreceive();
        self.outcome("unreceive", result)
    }

    /// Sends `message` and waits up to `timeout` for exactly one reply.
    ///
    /// A correlation id and reply address are generated when the message has
    /// none. The reply is matched on the correlation id. Returns `None` if the
    /// request could not be sent or no reply arrived in time.
    ///
    /// The whole exchange holds the adapter's operation lock, so concurrent
    /// requests on one adapter run one after the other. A listener of this
    /// adapter calling back into it waits until the request completes.
    pub fn request(&self, mut message: Message, timeout: Duration) -> Option<Message> {
        let deadline = Instant::now() + timeout;

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
                let address = format!("/replies/{}", self.name());
                message.set_reply_to(address.as_str());
                address
            }
        };

        let reply: Arc<CompletionSignal<Message>> = Arc::new(CompletionSignal::new());
        let listener: MessageListener = {
            let reply = Arc::clone(&reply);
            Arc::new(move |message: Message| {
                if let Err(error) = reply.fulfill(message) {
                    debug!(error = %error, "extra reply dropped");
                }
            })
        };

        let _operation = self.inner.operation.lock();
        let listening = self.try_receive(&reply_to, Some(&correlation_id), listener);
        let result = if !self.outcome("receive", listening).is_accepted() {
            warn!(client = %self.name(), reply_to = %reply_to, "could not listen for replies");
            None
        } else if self.outcome("send", self.try_send(message)).is_accepted() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match reply.wait_for(remaining) {
                Ok(reply) => Some(reply),
                Err(error) => {
                    warn!(
                        client = %self.name(),
                        correlation_id = %correlation_id,
                        error = %error,
                        "no reply received"
                    );
                    None
                }
            }
        } else {
            None
        };

        if let Err(error) = self.try_unreceive() {
            debug!(client = %self.name(), reply_to = %reply_to, error = %error, "reply receiver not closed");
        }
        result
    }

    /// Closes the receiver, then the connection.
    pub fn close(&self) {
        let _operation = self.inner.operation.lock();
        let has_receiver = self.inner.link.lock().receiver.is_some();
        if has_receiver && self.state().is_connected() {
            let result = self.try_unreceive();
            self.outcome("unreceive", result);
        } else {
            self.inner.registry.clear();
            self.inner.link.lock().receiver = None;
        }

        if let Some(connection) = self.inner.connection.lock().take() {
            if let Err(error) = connection.close() {
                debug!(client = %self.name(), error = %error, "connection already stopped");
            }
            self.inner.monitor.on_closed();
            info!(client = %self.name(), connection = %connection.id(), "connection closed");
        }
    }

    /// Address of the open receiver.
    pub fn receiver_address(&self) -> Option<String> {
        self.inner
            .link
            .lock()
            .receiver
            .as_ref()
            .map(|receiver| receiver.address().to_string())
    }

    /// Key of the active subscription.
    pub fn subscription_key(&self) -> Option<String> {
        self.inner.registry.current_key()
    }

    fn open_connection(&self, slot: &mut Option<Connection>) {
        let inner = &self.inner;
        if slot.take().is_some() {
            // receivers died with the previous connection
            let mut link = inner.link.lock();
            link.receiver = None;
            link.pending_open = None;
            link.pending_close = None;
        }

        inner.monitor.begin_connect();
        let handler: Arc<dyn SessionHandler> = Arc::new(SessionEvents {
            inner: Arc::downgrade(inner),
        });
        let options = inner.config.connect_options();

        match inner.transport.connect(&inner.config.endpoint, &options, handler) {
            Ok(connection) => {
                debug!(
                    client = %inner.config.name,
                    transport = inner.transport.name(),
                    endpoint = %inner.config.endpoint,
                    connection = %connection.id(),
                    "connecting"
                );
                *slot = Some(connection);
            }
            Err(error) => {
                error!(
                    client = %inner.config.name,
                    endpoint = %inner.config.endpoint,
                    error = %error,
                    "connect failed"
                );
                inner.monitor.on_connect_failed();
            }
        }
    }

    fn ensure_connected(&self) -> Result<WorkQueue, MsgBusError> {
        let live = self
            .inner
            .connection
            .lock()
            .as_ref()
            .is_some_and(Connection::is_active);
        if !live {
            return Err(MsgBusError::NotConnected { state: self.state() });
        }

        let state = self.connected();
        if !state.is_connected() {
            return Err(MsgBusError::NotConnected { state });
        }

        self.inner
            .connection
            .lock()
            .as_ref()
            .filter(|connection| connection.is_active())
            .map(|connection| connection.work_queue().clone())
            .ok_or(MsgBusError::NotConnected {
                state: ConnectionState::Lost,
            })
    }

    fn try_send(&self, message: Message) -> Result<(), MsgBusError> {
        let address = message
            .to()
            .map(str::to_string)
            .ok_or_else(|| MsgBusError::invalid_argument("message has no destination address"))?;
        let queue = self.ensure_connected()?;

        let signal = Arc::new(CompletionSignal::new());
        {
            let mut link = self.inner.link.lock();
            link.send = Arc::clone(&signal);
            link.outgoing = Some(message);
        }

        let failed = Arc::clone(&signal);
        queue.add(Box::new(move |session| {
            if let Err(error) = session.open_sender(&address) {
                let _ = failed.fulfill(Err(error.to_string()));
            }
        }))?;

        self.await_link("send", &signal)
    }

    fn try_receive(&self, address: &str, filter: Option<&str>, listener: MessageListener) -> Result<(), MsgBusError> {
        if address.is_empty() {
            return Err(MsgBusError::invalid_argument("receiver address is empty"));
        }
        let queue = self.ensure_connected()?;

        let previous = self.inner.link.lock().receiver.clone();
        if let Some(previous) = previous {
            debug!(client = %self.name(), receiver = %previous, "replacing receiver");
            if let Err(error) = self.close_receiver(&queue, previous) {
                warn!(client = %self.name(), error = %error, "previous receiver not closed");
            }
        }

        let key = filter.filter(|filter| !filter.is_empty()).unwrap_or(address);
        let signal = Arc::new(CompletionSignal::new());
        {
            let mut link = self.inner.link.lock();
            link.receive = Arc::clone(&signal);
            link.pending_open = Some(address.to_string());
        }
        self.inner.registry.set_subscription(key, listener);

        let target = address.to_string();
        let failed = Arc::clone(&signal);
        queue.add(Box::new(move |session| {
            if let Err(error) = session.open_receiver(&target) {
                let _ = failed.fulfill(Err(error.to_string()));
            }
        }))?;

        self.await_link("receive", &signal)
    }

    fn try_unreceive(&self) -> Result<(), MsgBusError> {
        let receiver = self.inner.link.lock().receiver.clone();
        let result = match receiver {
            Some(receiver) => self
                .ensure_connected()
                .and_then(|queue| self.close_receiver(&queue, receiver)),
            None => Err(MsgBusError::NoActiveReceiver),
        };

        if let Some(subscription) = self.inner.registry.clear() {
            trace!(client = %self.name(), key = %subscription.key(), "subscription cleared");
        }
        self.inner.link.lock().receiver = None;
        result
    }

    fn close_receiver(&self, queue: &WorkQueue, receiver: ReceiverLink) -> Result<(), MsgBusError> {
        let signal = Arc::new(CompletionSignal::new());
        {
            let mut link = self.inner.link.lock();
            link.receive = Arc::clone(&signal);
            link.pending_close = Some(receiver.id());
        }

        let id = receiver.id();
        let failed = Arc::clone(&signal);
        queue.add(Box::new(move |session| {
            if let Err(error) = session.close_receiver(&receiver) {
                let _ = failed.fulfill(Err(error.to_string()));
            }
        }))?;

        let result = self.await_link("unreceive", &signal);
        let mut link = self.inner.link.lock();
        link.pending_close = None;
        if link.receiver.as_ref().is_some_and(|r| r.id() == id) {
            link.receiver = None;
        }
        result
    }

    fn await_link(&self, operation: &str, signal: &LinkSignal) -> Result<(), MsgBusError> {
        let timeout = self.inner.config.operation_timeout;
        match signal.wait_for(timeout) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(SessionError::Protocol { reason }.into()),
            Err(SignalError::TimedOut { duration }) => Err(MsgBusError::timeout(operation, duration)),
            Err(error) => Err(error.into()),
        }
    }

    fn outcome(&self, operation: &str, result: Result<(), MsgBusError>) -> DeliveryState {
        match result {
            Ok(()) => {
                trace!(client = %self.name(), operation, "accepted");
                DeliveryState::Accepted
            }
            Err(error @ MsgBusError::NotConnected { .. }) => {
                warn!(client = %self.name(), operation, error = %error, "rejected");
                DeliveryState::Rejected
            }
            Err(error @ MsgBusError::NoActiveReceiver) => {
                debug!(client = %self.name(), operation, error = %error, "rejected");
                DeliveryState::Rejected
            }
            Err(error) if error.is_timeout() => {
                error!(client = %self.name(), operation, error = %error, "not confirmed in time");
                DeliveryState::Rejected
            }
            Err(error) => {
                error!(client = %self.name(), operation, error = %error, "failed");
                DeliveryState::Rejected
            }
        }
    }
}

impl Drop for ClientAdapter {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for ClientAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAdapter")
            .field("name", &self.inner.config.name)
            .field("endpoint", &self.inner.config.endpoint)
            .field("state", &self.state())
            .field("subscription", &self.subscription_key())
            .finish()
    }
}

impl AdapterInner {
    /// Fresh connect, send and receive signals after a reconnect.
    fn reset_signals(&self) {
        self.monitor.reset_signal();
        let mut link = self.link.lock();
        link.send = Arc::new(CompletionSignal::new());
        link.receive = Arc::new(CompletionSignal::new());
    }

    fn enqueue_close(&self, receiver: ReceiverLink) {
        let queue = self
            .connection
            .lock()
            .as_ref()
            .map(|connection| connection.work_queue().clone());
        let Some(queue) = queue else {
            return;
        };
        let submitted = queue.add(Box::new(move |session| {
            if let Err(error) = session.close_receiver(&receiver) {
                debug!(receiver = %receiver, error = %error, "stray receiver not closed");
            }
        }));
        if let Err(error) = submitted {
            debug!(client = %self.config.name, error = %error, "could not close stray receiver");
        }
    }
}

/// [`SessionHandler`] feeding transport callbacks into an adapter.
///
/// Holds the adapter weakly; callbacks arriving after the adapter is gone
/// are ignored.
struct SessionEvents {
    inner: Weak<AdapterInner>,
}

impl SessionHandler for SessionEvents {
    fn on_connection_open(&self, reconnected: bool) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        if reconnected {
            inner.reset_signals();
        }
        inner.monitor.on_open();
        info!(client = %inner.config.name, reconnected, "connection open");
    }

    fn on_sender_open(&self, sender: &mut dyn SenderLink) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let (message, signal) = {
            let mut link = inner.link.lock();
            let Some(message) = link
                .outgoing
                .take_if(|message| message.to() == Some(sender.address()))
            else {
                warn!(client = %inner.config.name, address = %sender.address(), "sender opened with nothing to send");
                return;
            };
            (message, Arc::clone(&link.send))
        };

        let outcome = sender.send(&message).map_err(|error| {
            warn!(client = %inner.config.name, address = %sender.address(), error = %error, "send failed");
            error.to_string()
        });
        if let Err(error) = signal.fulfill(outcome) {
            debug!(client = %inner.config.name, error = %error, "late send confirmation");
        }
    }

    fn on_receiver_open(&self, receiver: ReceiverLink) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let signal = {
            let mut link = inner.link.lock();
            if link.pending_open.as_deref() == Some(receiver.address()) {
                link.pending_open = None;
                link.receiver = Some(receiver.clone());
                Some(Arc::clone(&link.receive))
            } else {
                None
            }
        };

        match signal {
            Some(signal) => {
                debug!(client = %inner.config.name, receiver = %receiver, "receiver open");
                if let Err(error) = signal.fulfill(Ok(())) {
                    debug!(client = %inner.config.name, error = %error, "late receiver confirmation");
                }
            }
            None => {
                warn!(client = %inner.config.name, receiver = %receiver, "unexpected receiver, closing it");
                inner.enqueue_close(receiver);
            }
        }
    }

    fn on_receiver_close(&self, receiver: ReceiverLink) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let signal = {
            let link = inner.link.lock();
            (link.pending_close == Some(receiver.id())).then(|| Arc::clone(&link.receive))
        };
        match signal {
            Some(signal) => {
                debug!(client = %inner.config.name, receiver = %receiver, "receiver closed");
                let _ = signal.fulfill(Ok(()));
            }
            None => trace!(client = %inner.config.name, receiver = %receiver, "receiver closed"),
        }
    }

    fn on_message(&self, delivery: &mut dyn Delivery, message: Message) {
        delivery.accept();
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        match inner.registry.route(&message) {
            Route::Matched { key, listener } => {
                trace!(client = %inner.config.name, key = %key, "message routed");
                inner.pool.submit(&key, listener, message);
            }
            Route::Unmatched { key } => {
                warn!(client = %inner.config.name, key = %key, "no subscription for message, dropped");
            }
        }
    }

    fn on_transport_error(&self, error: &SessionError) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        warn!(client = %inner.config.name, error = %error, "transport error");
        inner.monitor.on_lost();
    }

    fn on_error(&self, error: &SessionError) {
        let name = self
            .inner
            .upgrade()
            .map(|inner| inner.config.name.clone())
            .unwrap_or_default();
        error!(client = %name, error = %error, "session error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DEFAULT_MEMORY_ENDPOINT;
    use crate::reconnection::{FixedDelay, NoReconnect};
    use crate::session::{MemoryBroker, MemoryTransport};

    fn adapter(broker: &Arc<MemoryBroker>, name: &str) -> ClientAdapter {
        let config = ClientConfig::new(name)
            .with_endpoint(DEFAULT_MEMORY_ENDPOINT)
            .with_operation_timeout(Duration::from_millis(300))
            .with_reconnection_strategy(Arc::new(NoReconnect::new()));
        ClientAdapter::new(Arc::new(MemoryTransport::new(Arc::clone(broker))), config).unwrap()
    }

    fn collector() -> (MessageListener, Arc<CompletionSignal<Message>>) {
        let signal = Arc::new(CompletionSignal::new());
        let inner = Arc::clone(&signal);
        let listener: MessageListener = Arc::new(move |message| {
            let _ = inner.fulfill(message);
        });
        (listener, signal)
    }

    #[test]
    fn test_operations_rejected_before_connect() {
        let broker = MemoryBroker::new();
        let client = adapter(&broker, "idle");
        let started = Instant::now();

        let message = Message::build_message("idle", "/t", "s", "x");
        assert_eq!(client.send(message), DeliveryState::Rejected);
        assert_eq!(client.receive("/t", None, Arc::new(|_| {})), DeliveryState::Rejected);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(broker.connection_count(), 0);
    }

    #[test]
    fn test_invalid_endpoint_fails_fast() {
        let broker = MemoryBroker::new();
        let config = ClientConfig::new("bad").with_endpoint("localhost");
        let client = ClientAdapter::new(Arc::new(MemoryTransport::new(broker)), config).unwrap();

        let started = Instant::now();
        assert_eq!(client.connect(), ConnectionState::ConnectFailed);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_send_without_address_rejected() {
        let broker = MemoryBroker::new();
        let client = adapter(&broker, "noaddr");
        assert_eq!(client.connect(), ConnectionState::Connected);
        assert_eq!(client.send(Message::new("orphan")), DeliveryState::Rejected);
    }

    #[test]
    fn test_send_and_receive() {
        let broker = MemoryBroker::new();
        let consumer = adapter(&broker, "consumer");
        let producer = adapter(&broker, "producer");
        assert!(consumer.connect().is_connected());
        assert!(producer.connect().is_connected());

        let (listener, received) = collector();
        assert!(consumer.receive("/orders", None, listener).is_accepted());
        assert_eq!(consumer.receiver_address().as_deref(), Some("/orders"));
        assert_eq!(consumer.subscription_key().as_deref(), Some("/orders"));

        let message = Message::build_message("producer", "/orders", "new", "order-1");
        assert!(producer.send(message).is_accepted());

        let message = received.wait_for(Duration::from_secs(5)).unwrap();
        assert_eq!(message.body_str(), Some("order-1"));
    }

    #[test]
    fn test_second_receive_replaces_first() {
        let broker = MemoryBroker::new();
        let client = adapter(&broker, "switcher");
        client.connect();

        assert!(client.receive("/a", None, Arc::new(|_| {})).is_accepted());
        assert!(client.receive("/b", None, Arc::new(|_| {})).is_accepted());

        assert_eq!(broker.receiver_count("/a"), 0);
        assert_eq!(broker.receiver_count("/b"), 1);
        assert_eq!(client.subscription_key().as_deref(), Some("/b"));
    }

    #[test]
    fn test_unreceive_without_receiver_rejected() {
        let broker = MemoryBroker::new();
        let client = adapter(&broker, "none");
        client.connect();
        assert_eq!(client.unreceive(), DeliveryState::Rejected);
    }

    #[test]
    fn test_unreceive_clears_subscription_even_when_unconfirmed() {
        let broker = MemoryBroker::new();
        let client = adapter(&broker, "quiet");
        client.connect();
        assert!(client.receive("/q", None, Arc::new(|_| {})).is_accepted());

        broker.suppress_link_events(true);
        assert_eq!(client.unreceive(), DeliveryState::Rejected);
        assert!(client.subscription_key().is_none());
        assert!(client.receiver_address().is_none());
    }

    #[test]
    fn test_send_times_out_without_sender_event() {
        let broker = MemoryBroker::new();
        let client = adapter(&broker, "slow");
        client.connect();
        broker.suppress_link_events(true);

        let started = Instant::now();
        let message = Message::build_message("slow", "/t", "s", "x");
        assert_eq!(client.send(message), DeliveryState::Rejected);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_close_releases_receiver_and_connection() {
        let broker = MemoryBroker::new();
        let client = adapter(&broker, "closer");
        client.connect();
        client.receive("/c", None, Arc::new(|_| {}));
        assert_eq!(broker.receiver_count("/c"), 1);

        client.close();
        assert_eq!(broker.receiver_count("/c"), 0);
        assert_eq!(client.state(), ConnectionState::Unknown);

        let message = Message::build_message("closer", "/c", "s", "x");
        assert_eq!(client.send(message), DeliveryState::Rejected);
    }

    #[test]
    fn test_concurrent_requests_on_one_adapter() {
        let broker = MemoryBroker::new();
        let server = adapter(&broker, "server");
        let answers = Arc::new(adapter(&broker, "answers"));
        assert!(server.connect().is_connected());
        assert!(answers.connect().is_connected());

        let outbound = Arc::clone(&answers);
        let echo: MessageListener = Arc::new(move |request: Message| {
            let body = format!("{}OK", request.body_str().unwrap_or_default());
            outbound.send(request.build_reply(body));
        });
        assert!(server.receive("/q", None, echo).is_accepted());

        let client = adapter(&broker, "client");
        assert!(client.connect().is_connected());
        let replies: Vec<Option<String>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|index| {
                    let client = &client;
                    scope.spawn(move || {
                        let body = format!("Q{index}");
                        let request = Message::build_request("client", "/q", "q", "/replies/client", body);
                        client
                            .request(request, Duration::from_secs(2))
                            .and_then(|reply| reply.body_str().map(str::to_string))
                    })
                })
                .collect();
            handles.into_iter().map(|handle| handle.join().unwrap()).collect()
        });

        assert_eq!(replies, vec![Some("Q0OK".to_string()), Some("Q1OK".to_string())]);
        assert!(client.subscription_key().is_none());
        assert_eq!(broker.receiver_count("/replies/client"), 0);
    }

    #[test]
    fn test_connected_waits_through_transport_errors() {
        let broker = MemoryBroker::new();
        let config = ClientConfig::new("outage")
            .with_endpoint(DEFAULT_MEMORY_ENDPOINT)
            .with_operation_timeout(Duration::from_secs(3))
            .with_reconnection_strategy(Arc::new(FixedDelay::new(Duration::from_millis(20))));
        let client = ClientAdapter::new(Arc::new(MemoryTransport::new(Arc::clone(&broker))), config).unwrap();
        assert!(client.connect().is_connected());

        broker.set_online(false);
        let started = Instant::now();
        while client.state() != ConnectionState::Lost && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(client.state(), ConnectionState::Lost);

        let resolved: Arc<CompletionSignal<(ConnectionState, Instant)>> = Arc::new(CompletionSignal::new());
        std::thread::scope(|scope| {
            let signal = Arc::clone(&resolved);
            let client = &client;
            scope.spawn(move || {
                let state = client.connected();
                let _ = signal.fulfill((state, Instant::now()));
            });

            // failed retries keep reporting transport errors meanwhile
            std::thread::sleep(Duration::from_millis(250));
            assert!(resolved.is_pending());
            assert_eq!(client.state(), ConnectionState::Lost);

            let reopened = Instant::now();
            broker.set_online(true);
            let (state, at) = resolved.wait_for(Duration::from_secs(5)).unwrap();
            assert_eq!(state, ConnectionState::Connected);
            assert!(at >= reopened);
        });
    }

    #[test]
    fn test_reconnect_after_close() {
        let broker = MemoryBroker::new();
        let client = adapter(&broker, "again");
        assert!(client.connect().is_connected());
        client.close();
        assert!(client.connect().is_connected());
    }
}
