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

//! MQTT 3.1.1 session over `rumqttc`.
//!
//! Link semantics map onto MQTT packets as follows:
//!
//! | Session operation | MQTT                         | Completion callback  |
//! |-------------------|------------------------------|----------------------|
//! | open sender       | (none, topics need no setup) | `on_sender_open`     |
//! | send              | PUBLISH, QoS 1               |                      |
//! | open receiver     | SUBSCRIBE, QoS 1             | `on_receiver_open` on SUBACK   |
//! | close receiver    | UNSUBSCRIBE                  | `on_receiver_close` on UNSUBACK |
//!
//! Messages travel as a JSON envelope holding the metadata and body, so
//! correlation ids and reply addresses survive the trip.
//!
//! Two threads serve each connection: one drives the `rumqttc` event loop
//! (which also reconnects, paced by the reconnection strategy) and one runs
//! submitted work.

use super::envelope::{decode, encode};
use super::{
    ChannelSink, ConnectOptions, Connection, ConnectionId, Delivery, DriverFlags,
    ProtocolSession, ReceiverId, ReceiverLink, SenderLink, SessionError, SessionHandler,
    Transport, WorkQueue, WorkUnit,
};
use crate::message::Message;
use crate::reconnection::ReconnectionStrategy;
use parking_lot::Mutex;
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

const DEFAULT_PORT: u16 = 1883;
const REQUEST_CAPACITY: usize = 64;
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(5);

/// [`Transport`] speaking MQTT 3.1.1.
///
/// Endpoints look like `tcp://host:port` or `mqtt://host:port`; the port
/// defaults to 1883.
#[derive(Debug, Default)]
pub struct MqttTransport;

impl MqttTransport {
    /// Creates the transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for MqttTransport {
    fn name(&self) -> &str {
        "MQTT"
    }

    fn connect(
        &self,
        endpoint: &str,
        options: &ConnectOptions,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Connection, SessionError> {
        let (host, port) = parse_endpoint(endpoint)?;

        let mut mqtt_options = MqttOptions::new(options.client_id.clone(), host, port);
        mqtt_options.set_keep_alive(options.idle_timeout.max(MIN_KEEP_ALIVE));
        // subscriptions must outlive a reconnect
        mqtt_options.set_clean_session(false);

        let (client, event_loop) = Client::new(mqtt_options, REQUEST_CAPACITY);
        let id = ConnectionId::next();
        let flags = DriverFlags::new();
        let shared = Arc::new(Shared {
            client: Mutex::new(client),
            pending_subscribes: Mutex::new(VecDeque::new()),
            pending_unsubscribes: Mutex::new(VecDeque::new()),
            next_receiver: AtomicU64::new(1),
        });
        let (sink, work) = ChannelSink::channel(id);

        let events = EventDriver {
            id,
            endpoint: endpoint.to_string(),
            shared: Arc::clone(&shared),
            handler: Arc::clone(&handler),
            strategy: Arc::clone(&options.reconnection_strategy),
            flags: Arc::clone(&flags),
        };
        thread::Builder::new()
            .name(format!("msgbus-mqtt-events-{}", id.as_u64()))
            .spawn(move || events.run(event_loop))
            .map_err(|error| SessionError::connection_failed(endpoint, error.to_string()))?;

        let session = MqttSession {
            id,
            shared,
            handler,
            closed: false,
        };
        thread::Builder::new()
            .name(format!("msgbus-mqtt-work-{}", id.as_u64()))
            .spawn(move || session.run(work))
            .map_err(|error| SessionError::connection_failed(endpoint, error.to_string()))?;

        debug!(connection = %id, endpoint = %endpoint, client = %options.client_id, "mqtt connection started");
        Ok(Connection::new(id, WorkQueue::new(id, Arc::new(sink)), flags))
    }
}

/// Splits `tcp://host:port` into host and port.
fn parse_endpoint(endpoint: &str) -> Result<(String, u16), SessionError> {
    let authority = ["tcp://", "mqtt://"]
        .iter()
        .find_map(|scheme| endpoint.strip_prefix(scheme))
        .ok_or_else(|| SessionError::invalid_endpoint(endpoint, "expected tcp:// or mqtt:// scheme"))?;

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| SessionError::invalid_endpoint(endpoint, "invalid port"))?;
            (host, port)
        }
        None => (authority, DEFAULT_PORT),
    };

    if host.is_empty() {
        return Err(SessionError::invalid_endpoint(endpoint, "missing host"));
    }
    Ok((host.to_string(), port))
}

struct Shared {
    client: Mutex<Client>,
    // SUBACK/UNSUBACK arrive in request order
    pending_subscribes: Mutex<VecDeque<ReceiverLink>>,
    pending_unsubscribes: Mutex<VecDeque<ReceiverLink>>,
    next_receiver: AtomicU64,
}

struct EventDriver {
    id: ConnectionId,
    endpoint: String,
    shared: Arc<Shared>,
    handler: Arc<dyn SessionHandler>,
    strategy: Arc<dyn ReconnectionStrategy>,
    flags: Arc<DriverFlags>,
}

impl EventDriver {
    fn run(self, mut event_loop: rumqttc::Connection) {
        let mut attempt = 0u32;
        let mut ever_connected = false;

        for notification in event_loop.iter() {
            if self.flags.is_closing() {
                break;
            }
            match notification {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    attempt = 0;
                    self.strategy.on_connected();
                    info!(connection = %self.id, endpoint = %self.endpoint, reconnected = ever_connected, "mqtt connection open");
                    self.handler.on_connection_open(ever_connected);
                    ever_connected = true;
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let mut delivery = MqttDelivery::default();
                    match decode(&publish.topic, &publish.payload) {
                        Ok(message) => self.handler.on_message(&mut delivery, message),
                        Err(error) => self.handler.on_error(&error),
                    }
                }
                Ok(Event::Incoming(Packet::SubAck(_))) => {
                    let link = self.shared.pending_subscribes.lock().pop_front();
                    match link {
                        Some(link) => self.handler.on_receiver_open(link),
                        None => trace!(connection = %self.id, "SUBACK without pending subscribe"),
                    }
                }
                Ok(Event::Incoming(Packet::UnsubAck(_))) => {
                    let link = self.shared.pending_unsubscribes.lock().pop_front();
                    match link {
                        Some(link) => self.handler.on_receiver_close(link),
                        None => trace!(connection = %self.id, "UNSUBACK without pending unsubscribe"),
                    }
                }
                Ok(event) => trace!(connection = %self.id, ?event, "mqtt event"),
                Err(error) => {
                    let error = if ever_connected {
                        SessionError::connection_lost(error.to_string())
                    } else {
                        SessionError::connection_failed(&self.endpoint, error.to_string())
                    };
                    self.strategy.on_disconnected(&error);
                    self.handler.on_transport_error(&error);

                    if !self.strategy.should_reconnect(attempt, &error) {
                        warn!(connection = %self.id, strategy = self.strategy.name(), attempt, "giving up on mqtt connection");
                        break;
                    }
                    let delay = self.strategy.next_delay(attempt);
                    debug!(connection = %self.id, attempt, ?delay, "reconnecting");
                    if !self.flags.sleep_unless_closing(delay) {
                        break;
                    }
                    attempt = attempt.saturating_add(1);
                }
            }
        }

        self.flags.mark_inactive();
        debug!(connection = %self.id, "mqtt event driver stopped");
    }
}

struct MqttSession {
    id: ConnectionId,
    shared: Arc<Shared>,
    handler: Arc<dyn SessionHandler>,
    closed: bool,
}

impl MqttSession {
    fn run(mut self, mut work: mpsc::UnboundedReceiver<WorkUnit>) {
        while !self.closed {
            let Some(unit) = work.blocking_recv() else {
                break;
            };
            unit(&mut self);
        }
        debug!(connection = %self.id, "mqtt work driver stopped");
    }
}

impl ProtocolSession for MqttSession {
    fn open_sender(&mut self, address: &str) -> Result<(), SessionError> {
        let mut sender = MqttSender {
            address: address.to_string(),
            shared: &self.shared,
        };
        self.handler.on_sender_open(&mut sender);
        Ok(())
    }

    fn open_receiver(&mut self, address: &str) -> Result<(), SessionError> {
        let id = ReceiverId::new(self.shared.next_receiver.fetch_add(1, Ordering::Relaxed));
        let link = ReceiverLink::new(id, address);
        let client = self.shared.client.lock();
        self.shared.pending_subscribes.lock().push_back(link);
        if let Err(error) = client.subscribe(address, QoS::AtLeastOnce) {
            self.shared.pending_subscribes.lock().pop_back();
            return Err(SessionError::link(address, error.to_string()));
        }
        Ok(())
    }

    fn close_receiver(&mut self, receiver: &ReceiverLink) -> Result<(), SessionError> {
        let client = self.shared.client.lock();
        self.shared.pending_unsubscribes.lock().push_back(receiver.clone());
        if let Err(error) = client.unsubscribe(receiver.address()) {
            self.shared.pending_unsubscribes.lock().pop_back();
            return Err(SessionError::link(receiver.address(), error.to_string()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        self.shared
            .client
            .lock()
            .disconnect()
            .map_err(|error| SessionError::Protocol {
                reason: error.to_string(),
            })
    }
}

struct MqttSender<'a> {
    address: String,
    shared: &'a Shared,
}

impl SenderLink for MqttSender<'_> {
    fn address(&self) -> &str {
        &self.address
    }

    fn send(&mut self, message: &Message) -> Result<(), SessionError> {
        let mut outgoing = message.clone();
        outgoing.set_to(self.address.as_str());
        let payload = encode(&outgoing)?;
        self.shared
            .client
            .lock()
            .publish(self.address.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|error| SessionError::link(&self.address, error.to_string()))
    }
}

/// QoS 1 acknowledgements are sent by `rumqttc` itself.
#[derive(Default)]
struct MqttDelivery {
    settled: bool,
}

impl Delivery for MqttDelivery {
    fn accept(&mut self) {
        self.settled = true;
    }

    fn is_settled(&self) -> bool {
        self.settled
    }
}
