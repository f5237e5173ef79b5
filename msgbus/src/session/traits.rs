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

use super::{ConnectOptions, Connection, ReceiverLink, SessionError};
use crate::message::Message;
use std::sync::Arc;
use tracing::error;

/// A unit of work executed on a connection's driver thread.
///
/// All mutation of a protocol session goes through work units submitted to
/// the connection's [`WorkQueue`](super::WorkQueue); the driver runs them one
/// at a time with exclusive access to the session.
pub type WorkUnit = Box<dyn FnOnce(&mut dyn ProtocolSession) + Send + 'static>;

/// A broker protocol engine able to open connections.
///
/// The transport is a capability: it accepts a connect request along with a
/// reconnection policy, reports connection and link lifecycle events to a
/// [`SessionHandler`], and accepts sender/receiver registration through work
/// submitted to the returned [`Connection`].
///
/// # Examples
///
/// ```rust
/// use msgbus::session::{ConnectOptions, MemoryBroker, MemoryTransport, Transport};
///
/// let broker = MemoryBroker::new();
/// let transport = MemoryTransport::new(broker);
/// assert_eq!(transport.name(), "Memory");
/// ```
pub trait Transport: Send + Sync {
    /// Protocol name reported by `identify()`.
    fn name(&self) -> &str;

    /// Starts connecting to `endpoint`.
    ///
    /// Returning `Ok` only means the connect request was accepted; the
    /// outcome arrives later through [`SessionHandler::on_connection_open`] or
    /// [`SessionHandler::on_transport_error`].
    ///
    /// # Errors
    ///
    /// Returns an error if the request is refused outright (malformed
    /// endpoint, driver thread could not be started).
    fn connect(
        &self,
        endpoint: &str,
        options: &ConnectOptions,
        handler: Arc<dyn SessionHandler>,
    ) -> Result<Connection, SessionError>;
}

/// Exclusive view of a protocol session, available inside a [`WorkUnit`].
///
/// Each call only starts the operation. Completion is reported through the
/// matching [`SessionHandler`] callback.
pub trait ProtocolSession {
    /// Opens a sender on `address`; completion: [`SessionHandler::on_sender_open`].
    fn open_sender(&mut self, address: &str) -> Result<(), SessionError>;

    /// Opens a receiver on `address`; completion: [`SessionHandler::on_receiver_open`].
    fn open_receiver(&mut self, address: &str) -> Result<(), SessionError>;

    /// Closes a receiver; completion: [`SessionHandler::on_receiver_close`].
    fn close_receiver(&mut self, receiver: &ReceiverLink) -> Result<(), SessionError>;

    /// Closes the connection. No callbacks are delivered afterwards.
    fn close(&mut self) -> Result<(), SessionError>;
}

/// An open sender link, lent to [`SessionHandler::on_sender_open`].
pub trait SenderLink {
    /// Address the sender is attached to.
    fn address(&self) -> &str;

    /// Transfers `message` on this link.
    fn send(&mut self, message: &Message) -> Result<(), SessionError>;
}

/// An inbound transfer awaiting settlement.
pub trait Delivery {
    /// Acknowledges the transfer to the broker.
    fn accept(&mut self);

    /// Returns `true` once the transfer has been settled.
    fn is_settled(&self) -> bool;
}

/// Receives lifecycle events from a transport.
///
/// Every callback runs on the connection's driver thread. Implementations
/// must not block: record the outcome, fulfill a signal, hand work to another
/// thread, and return. Nothing may unwind out of a callback.
pub trait SessionHandler: Send + Sync {
    /// The connection is open. `reconnected` is `true` for every open after
    /// the first one on the same connection.
    fn on_connection_open(&self, reconnected: bool);

    /// A sender requested through [`ProtocolSession::open_sender`] is ready.
    fn on_sender_open(&self, sender: &mut dyn SenderLink);

    /// A receiver requested through [`ProtocolSession::open_receiver`] is attached.
    fn on_receiver_open(&self, receiver: ReceiverLink);

    /// A receiver was detached.
    fn on_receiver_close(&self, receiver: ReceiverLink);

    /// A message arrived on one of the connection's receivers.
    fn on_message(&self, delivery: &mut dyn Delivery, message: Message);

    /// The connection failed or was lost. The transport may reconnect.
    fn on_transport_error(&self, error: &SessionError);

    /// A non-fatal protocol or link error.
    fn on_error(&self, error: &SessionError) {
        error!(error = %error, "session error");
    }
}
