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

//! Transport session capability.
//!
//! A broker protocol engine is modeled as three cooperating pieces:
//!
//! - [`Transport`] opens a [`Connection`] given an endpoint, a reconnection
//!   strategy and a [`SessionHandler`].
//! - The connection's driver thread owns the [`ProtocolSession`]. Callers
//!   never touch it directly; they submit [`WorkUnit`]s through the
//!   connection's [`WorkQueue`] and the driver runs them in order.
//! - The driver reports everything that happens (connection opened or lost,
//!   links opened or closed, messages arriving) to the [`SessionHandler`].
//!
//! # Backends
//!
//! - [`MemoryTransport`]: in-process broker with fault injection
//! - `MqttTransport` (feature `mqtt`): MQTT 3.1.1 through `rumqttc`
//! - `AmqpTransport` (feature `amqp`): AMQP 1.0 through `fe2o3-amqp`

#[cfg(feature = "amqp")]
mod amqp;
#[cfg(any(feature = "mqtt", feature = "amqp"))]
mod envelope;
mod error;
mod memory;
#[cfg(feature = "mqtt")]
mod mqtt;
mod traits;
mod types;
mod work_queue;

#[cfg(feature = "amqp")]
pub use amqp::AmqpTransport;
pub use error::SessionError;
pub use memory::{MemoryBroker, MemoryTransport};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;
pub use traits::{Delivery, ProtocolSession, SenderLink, SessionHandler, Transport, WorkUnit};
pub use types::{ConnectOptions, ConnectionId, ReceiverId, ReceiverLink};
pub use work_queue::{ChannelSink, Connection, DriverFlags, WorkQueue, WorkSink};
