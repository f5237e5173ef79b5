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

//! In-process broker for tests, examples and benchmarks.
//!
//! [`MemoryBroker`] stands in for a real broker: connections attach to it,
//! receivers subscribe to addresses, and every message sent to an address is
//! copied to each receiver attached to that address. Each connection gets its
//! own driver thread that runs submitted work and delivers lifecycle callbacks,
//! just like a networked protocol engine would.
//!
//! The broker can also misbehave on demand, which is what makes timeout, loss
//! and reconnection paths testable without a network:
//!
//! - [`sever_all`](MemoryBroker::sever_all) drops every connection
//! - [`set_online`](MemoryBroker::set_online) refuses (re)connections while offline
//! - [`set_link_delay`](MemoryBroker::set_link_delay) slows link confirmations
//! - [`suppress_link_events`](MemoryBroker::suppress_link_events) withholds them
//!
//! Receivers survive a severed connection and are active again once it is
//! re-established.
//!
//! # Examples
//!
//! ```rust
//! use msgbus::session::{MemoryBroker, MemoryTransport, Transport};
//!
//! let broker = MemoryBroker::new();
//! let transport = MemoryTransport::new(broker.clone());
//! assert_eq!(transport.name(), "Memory");
//! assert_eq!(broker.connection_count(), 0);
//! ```

use super::{
    ConnectOptions, Connection, ConnectionId, Delivery, DriverFlags, ProtocolSession,
    ReceiverId, ReceiverLink, SenderLink, SessionError, SessionHandler, Transport, WorkQueue,
    WorkSink, WorkUnit,
};
use crate::message::Message;
use crate::reconnection::ReconnectionStrategy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

enum Command {
    Work(WorkUnit),
    Deliver(Message),
    Sever(String),
}

struct SessionEntry {
    commands: mpsc::UnboundedSender<Command>,
    attached: bool,
    receivers: Vec<ReceiverLink>,
}

#[derive(Default)]
struct BrokerState {
    offline: bool,
    link_delay: Duration,
    suppress_link_events: bool,
    sessions: HashMap<ConnectionId, SessionEntry>,
}

/// An in-process message broker.
#[derive(Default)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
}

impl MemoryBroker {
    /// Creates an online broker with no connections.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Number of connections currently attached.
    pub fn connection_count(&self) -> usize {
        self.state
            .lock()
            .sessions
            .values()
            .filter(|entry| entry.attached)
            .count()
    }

    /// Number of receivers attached to `address` across all connections.
    pub fn receiver_count(&self, address: &str) -> usize {
        self.state
            .lock()
            .sessions
            .values()
            .flat_map(|entry| entry.receivers.iter())
            .filter(|receiver| receiver.address() == address)
            .count()
    }

    /// Drops every attached connection.
    ///
    /// Each driver reports the loss and then reconnects according to its
    /// reconnection strategy.
    pub fn sever_all(&self) {
        let mut state = self.state.lock();
        let mut severed = 0usize;
        for entry in state.sessions.values_mut().filter(|entry| entry.attached) {
            entry.attached = false;
            let _ = entry.commands.send(Command::Sever("connection severed by broker".into()));
            severed += 1;
        }
        info!(connections = severed, "memory broker severed all connections");
    }

    /// Takes the broker up or down.
    ///
    /// Going offline severs every connection; while offline, connection
    /// attempts fail.
    pub fn set_online(&self, online: bool) {
        self.state.lock().offline = !online;
        if !online {
            self.sever_all();
        }
        info!(online, "memory broker availability changed");
    }

    /// Delays every sender/receiver open and close by `delay`.
    pub fn set_link_delay(&self, delay: Duration) {
        self.state.lock().link_delay = delay;
    }

    /// Withholds sender/receiver open and close callbacks while `suppress` is set.
    ///
    /// Links still open; the client just never hears about it.
    pub fn suppress_link_events(&self, suppress: bool) {
        self.state.lock().suppress_link_events = suppress;
    }

    fn register(&self, id: ConnectionId, commands: mpsc::UnboundedSender<Command>) {
        self.state.lock().sessions.insert(
            id,
            SessionEntry {
                commands,
                attached: false,
                receivers: Vec::new(),
            },
        );
    }

    fn unregister(&self, id: ConnectionId) {
        self.state.lock().sessions.remove(&id);
    }

    fn attach(&self, id: ConnectionId) -> bool {
        let mut state = self.state.lock();
        if state.offline {
            return false;
        }
        match state.sessions.get_mut(&id) {
            Some(entry) => {
                entry.attached = true;
                true
            }
            None => false,
        }
    }

    fn is_attached(&self, id: ConnectionId) -> bool {
        self.state
            .lock()
            .sessions
            .get(&id)
            .is_some_and(|entry| entry.attached)
    }

    fn link_behaviour(&self) -> (Duration, bool) {
        let state = self.state.lock();
        (state.link_delay, state.suppress_link_events)
    }

    fn add_receiver(&self, id: ConnectionId, receiver: ReceiverLink) {
        if let Some(entry) = self.state.lock().sessions.get_mut(&id) {
            entry.receivers.push(receiver);
        }
    }

    fn remove_receiver(&self, id: ConnectionId, receiver: ReceiverId) -> bool {
        let mut state = self.state.lock();
        match state.sessions.get_mut(&id) {
            Some(entry) => {
                let before = entry.receivers.len();
                entry.receivers.retain(|link| link.id() != receiver);
                entry.receivers.len() != before
            }
            None => false,
        }
    }

    /// Copies `message` to every attached receiver of its address.
    fn route(&self, message: &Message) -> usize {
        let Some(address) = message.to() else {
            return 0;
        };
        let state = self.state.lock();
        let mut delivered = 0usize;
        for entry in state.sessions.values().filter(|entry| entry.attached) {
            for _ in entry.receivers.iter().filter(|r| r.address() == address) {
                if entry.commands.send(Command::Deliver(message.clone())).is_ok() {
                    delivered += 1;
                }
            }
        }
        trace!(address = %address, delivered, "memory broker routed message");
        delivered
    }
}

/// [`Transport`] backed by a [`MemoryBroker`].
///
/// Accepts any endpoint of the form `scheme://authority`, so configuration
/// written for a networked broker can be pointed at the in-process one.
pub struct MemoryTransport {
    broker: Arc<MemoryBroker>,
}

impl MemoryTransport {
    /// Creates a transport connecting to `broker`.
    pub fn new(broker: Arc<MemoryBroker>) -> Self {
        Self { broker }
    }

    /// The broker this transport connects to.
    pub fn broker(&self) -> &Arc<MemoryBroker> {
        &self.broker
    }
}

impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "Memory"
    }

    fn connect(
        &self,
        endpoint: &str,
        options: &ConnectOptions,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Connection, SessionError> {
        match endpoint.split_once("://") {
            Some((scheme, authority)) if !scheme.is_empty() && !authority.is_empty() => {}
            _ => {
                return Err(SessionError::invalid_endpoint(
                    endpoint,
                    "expected scheme://authority",
                ));
            }
        }

        let id = ConnectionId::next();
        let (commands, receiver) = mpsc::unbounded_channel();
        let flags = DriverFlags::new();
        self.broker.register(id, commands.clone());

        let driver = MemoryDriver {
            id,
            endpoint: endpoint.to_string(),
            broker: Arc::clone(&self.broker),
            handler,
            strategy: Arc::clone(&options.reconnection_strategy),
            flags: Arc::clone(&flags),
            ever_connected: false,
            closed: false,
            next_receiver: 1,
        };

        thread::Builder::new()
            .name(format!("msgbus-memory-{}", id.as_u64()))
            .spawn(move || driver.run(receiver))
            .map_err(|error| {
                self.broker.unregister(id);
                SessionError::connection_failed(endpoint, error.to_string())
            })?;

        debug!(connection = %id, endpoint = %endpoint, client = %options.client_id, "memory connection started");
        let sink = MemorySink {
            connection: id,
            commands,
        };
        Ok(Connection::new(id, WorkQueue::new(id, Arc::new(sink)), flags))
    }
}

struct MemorySink {
    connection: ConnectionId,
    commands: mpsc::UnboundedSender<Command>,
}

impl WorkSink for MemorySink {
    fn submit(&self, work: WorkUnit) -> Result<(), SessionError> {
        self.commands
            .send(Command::Work(work))
            .map_err(|_| SessionError::QueueClosed {
                connection: self.connection,
            })
    }
}

struct MemoryDriver {
    id: ConnectionId,
    endpoint: String,
    broker: Arc<MemoryBroker>,
    handler: Arc<dyn SessionHandler>,
    strategy: Arc<dyn ReconnectionStrategy>,
    flags: Arc<DriverFlags>,
    ever_connected: bool,
    closed: bool,
    next_receiver: u64,
}

impl MemoryDriver {
    fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut running = self.try_attach()
            || self.reconnect(SessionError::connection_failed(
                &self.endpoint,
                "memory broker is offline",
            ));

        while running && !self.closed {
            let Some(command) = commands.blocking_recv() else {
                break;
            };
            match command {
                Command::Work(work) => work(&mut self),
                Command::Deliver(message) => self.deliver(message),
                Command::Sever(reason) => {
                    running = self.reconnect(SessionError::connection_lost(reason));
                }
            }
        }

        self.broker.unregister(self.id);
        self.flags.mark_inactive();
        debug!(connection = %self.id, "memory driver stopped");
    }

    fn try_attach(&mut self) -> bool {
        if self.flags.is_closing() || !self.broker.attach(self.id) {
            return false;
        }
        self.strategy.on_connected();
        let reconnected = self.ever_connected;
        self.ever_connected = true;
        debug!(connection = %self.id, reconnected, "memory connection open");
        self.handler.on_connection_open(reconnected);
        true
    }

    /// Reports `cause` and retries until attached, closed, or the strategy
    /// gives up.
    fn reconnect(&mut self, cause: SessionError) -> bool {
        let mut error = cause;
        let mut attempt = 0u32;
        loop {
            self.strategy.on_disconnected(&error);
            self.handler.on_transport_error(&error);

            if !self.strategy.should_reconnect(attempt, &error) {
                warn!(
                    connection = %self.id,
                    strategy = self.strategy.name(),
                    attempt,
                    "giving up on memory connection"
                );
                return false;
            }
            let delay = self.strategy.next_delay(attempt);
            debug!(connection = %self.id, attempt, ?delay, "reconnecting");
            if !self.flags.sleep_unless_closing(delay) {
                return false;
            }
            if self.try_attach() {
                return true;
            }
            if self.flags.is_closing() {
                return false;
            }
            error = SessionError::connection_failed(&self.endpoint, "memory broker is offline");
            attempt = attempt.saturating_add(1);
        }
    }

    fn deliver(&mut self, message: Message) {
        if self.closed {
            return;
        }
        let mut delivery = MemoryDelivery::default();
        self.handler.on_message(&mut delivery, message);
        if !delivery.is_settled() {
            debug!(connection = %self.id, "delivery left unsettled");
        }
    }

    fn ensure_attached(&self, address: &str) -> Result<(), SessionError> {
        if self.broker.is_attached(self.id) {
            Ok(())
        } else {
            Err(SessionError::link(address, "connection is not attached"))
        }
    }

    /// Applies the broker's link delay; returns whether to report the event.
    fn link_event(&self) -> bool {
        let (delay, suppress) = self.broker.link_behaviour();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        !suppress
    }
}

impl ProtocolSession for MemoryDriver {
    fn open_sender(&mut self, address: &str) -> Result<(), SessionError> {
        self.ensure_attached(address)?;
        if !self.link_event() {
            return Ok(());
        }
        let mut sender = MemorySender {
            address: address.to_string(),
            broker: &self.broker,
        };
        self.handler.on_sender_open(&mut sender);
        Ok(())
    }

    fn open_receiver(&mut self, address: &str) -> Result<(), SessionError> {
        self.ensure_attached(address)?;
        let link = ReceiverLink::new(ReceiverId::new(self.next_receiver), address);
        self.next_receiver += 1;
        self.broker.add_receiver(self.id, link.clone());
        if self.link_event() {
            self.handler.on_receiver_open(link);
        }
        Ok(())
    }

    fn close_receiver(&mut self, receiver: &ReceiverLink) -> Result<(), SessionError> {
        if !self.broker.remove_receiver(self.id, receiver.id()) {
            return Err(SessionError::link(receiver.address(), "unknown receiver"));
        }
        if self.link_event() {
            self.handler.on_receiver_close(receiver.clone());
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        self.broker.unregister(self.id);
        Ok(())
    }
}

struct MemorySender<'a> {
    address: String,
    broker: &'a MemoryBroker,
}

impl SenderLink for MemorySender<'_> {
    fn address(&self) -> &str {
        &self.address
    }

    fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        let mut outgoing = message.clone();
        outgoing.set_to(self.address.as_str());
        self.broker.route(&outgoing);
        Ok(())
    }
}

#[derive(Default)]
struct MemoryDelivery {
    settled: bool,
}

impl Delivery for MemoryDelivery {
    fn accept(&mut self) {
        self.settled = true;
    }

    fn is_settled(&self) -> bool {
        self.settled
    }
}
