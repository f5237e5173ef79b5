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

#![doc = include_str!("../../README.md")]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

//! # Architecture
//!
//! msgbus is organized in layers, bottom up:
//!
//! - **[`session`]**: the transport capability. A [`Transport`] opens a
//!   connection whose driver thread owns the protocol session and reports
//!   progress through [`SessionHandler`](session::SessionHandler) callbacks.
//!   Backends: in-process [`MemoryTransport`](session::MemoryTransport) and,
//!   with the `mqtt` feature, `MqttTransport`.
//! - **[`signal`]**: [`CompletionSignal`], the single-assignment cell that
//!   turns a callback into a bounded blocking wait.
//! - **[`connection`]**: the connection state machine.
//! - **[`registry`]** and **[`dispatch`]**: one subscription per adapter,
//!   routed by address or correlation id, with listeners run on a worker
//!   pool rather than on the driver thread.
//! - **[`client`]**: [`ClientAdapter`], which combines the above into blocking
//!   `send` / `receive` / `unreceive` / `request` calls.
//! - **[`bus`]**: [`MessageBus`], the publish/subscribe and request/reply
//!   facade owning one adapter per subscription.
//! - **[`reconnection`]**: policies the transports follow after a failure.
//!
//! # Error Handling
//!
//! - [`SessionError`](session::SessionError): connection and link failures
//! - [`SignalError`](signal::SignalError): completion bookkeeping
//! - [`MsgBusError`]: client-level rejections and timeouts
//!
//! The public client surface reports outcomes as
//! [`DeliveryState`](client::DeliveryState) or `Option`; errors are logged
//! through `tracing` on the way out.
//!
//! # Features
//!
//! - **`mqtt`**: MQTT 3.1.1 transport over `rumqttc`
//! - **`cli`**: the `msgbus-cli` binary (requires `mqtt`)
//!
//! # Safety
//!
//! msgbus is written in 100% safe Rust with `#![deny(unsafe_code)]`.

pub mod bus;
pub mod client;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod message;
pub mod reconnection;
pub mod registry;
pub mod session;
pub mod signal;

pub use bus::MessageBus;
pub use client::{ClientAdapter, ClientConfig, DeliveryState};
pub use connection::ConnectionState;
pub use error::MsgBusError;
pub use message::Message;
pub use registry::MessageListener;
pub use session::Transport;
pub use signal::CompletionSignal;
