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

//! Session layer error types.
//!
//! Session errors are the lowest level of the error hierarchy. They describe
//! failures of the broker connection itself or of one of its links, and they
//! are what transports hand to the [`SessionHandler`] error callbacks and to
//! the [`ReconnectionStrategy`].
//!
//! # Error Categories
//!
//! - **Connection errors**: failed to establish, or lost, the broker connection
//! - **Link errors**: a sender or receiver could not be opened or used
//! - **Configuration errors**: malformed endpoint, never recoverable
//! - **Encoding errors**: a message could not be put on or taken off the wire
//!
//! [`SessionHandler`]: super::SessionHandler
//! [`ReconnectionStrategy`]: crate::reconnection::ReconnectionStrategy

use super::ConnectionId;
use thiserror::Error;

/// Errors that can occur in a transport session.
///
/// # Examples
///
/// ```rust
/// use msgbus::session::SessionError;
///
/// let error = SessionError::connection_lost("broker restarted");
/// assert!(error.is_recoverable());
///
/// let error = SessionError::invalid_endpoint("localhost", "missing scheme");
/// assert!(!error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum SessionError {
    /// The endpoint could not be parsed or is not served by this transport.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The rejected endpoint
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// Failed to establish a connection to the broker.
    #[error("failed to connect to {endpoint}: {reason}")]
    ConnectionFailed {
        /// The endpoint that refused us
        endpoint: String,
        /// Description of the failure
        reason: String,
    },

    /// An established connection was lost.
    #[error("connection lost: {reason}")]
    ConnectionLost {
        /// Description of why the connection was lost
        reason: String,
    },

    /// The connection's work queue no longer accepts work.
    ///
    /// The driver thread has exited, either because the connection was closed
    /// or because the reconnection strategy gave up.
    #[error("work queue of connection {connection} is closed")]
    QueueClosed {
        /// The connection whose queue is gone
        connection: ConnectionId,
    },

    /// A sender or receiver link failed.
    #[error("link to '{address}' failed: {reason}")]
    Link {
        /// Address the link was attached to
        address: String,
        /// Description of the failure
        reason: String,
    },

    /// The broker reported a protocol level error.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Description reported by the broker or the protocol engine
        reason: String,
    },

    /// A message could not be encoded or decoded.
    #[error("message encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// The session was explicitly closed.
    #[error("session is closed")]
    Closed,
}

impl SessionError {
    /// Returns `true` if retrying the connection may succeed.
    ///
    /// Reconnection strategies give up immediately on errors that are not
    /// recoverable.
    pub fn is_recoverable(&self) -> bool {
        match self {
            SessionError::ConnectionFailed { .. }
            | SessionError::ConnectionLost { .. }
            | SessionError::Link { .. }
            | SessionError::Protocol { .. } => true,

            SessionError::InvalidEndpoint { .. }
            | SessionError::QueueClosed { .. }
            | SessionError::Encoding(_)
            | SessionError::Closed => false,
        }
    }

    /// Returns `true` if this error means the connection is unusable.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            SessionError::ConnectionFailed { .. }
                | SessionError::ConnectionLost { .. }
                | SessionError::QueueClosed { .. }
                | SessionError::Closed
        )
    }

    /// Creates a [`SessionError::InvalidEndpoint`].
    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`SessionError::ConnectionFailed`].
    pub fn connection_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::ConnectionFailed {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }

    /// Creates a [`SessionError::ConnectionLost`].
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        SessionError::ConnectionLost {
            reason: reason.into(),
        }
    }

    /// Creates a [`SessionError::Link`].
    pub fn link(address: impl Into<String>, reason: impl Into<String>) -> Self {
        SessionError::Link {
            address: address.into(),
            reason: reason.into(),
        }
    }
}
