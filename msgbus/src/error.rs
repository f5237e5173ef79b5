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

//! Top-level error types for msgbus.
//!
//! Errors are layered:
//!
//! 1. **Session layer**: broker connection and link failures ([`SessionError`])
//! 2. **Signal layer**: completion bookkeeping ([`SignalError`])
//! 3. **Client layer**: local rejections and expired waits ([`MsgBusError`])
//!
//! Client operations use [`MsgBusError`] internally. The public client
//! surface logs the error and reports a
//! [`DeliveryState`](crate::client::DeliveryState) or an empty `Option`
//! instead, so callers branch on outcomes rather than on error kinds.
//!
//! # Examples
//!
//! ```rust
//! use msgbus::MsgBusError;
//! use msgbus::session::SessionError;
//!
//! let error: MsgBusError = SessionError::connection_lost("broker restarted").into();
//! assert!(error.is_session_error());
//! assert!(error.is_recoverable());
//! ```

use crate::connection::ConnectionState;
use crate::session::SessionError;
use crate::signal::SignalError;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for msgbus operations.
#[derive(Debug, Error)]
pub enum MsgBusError {
    /// The operation was rejected locally because the client is not connected.
    ///
    /// The transport was not contacted.
    #[error("not connected (connection state: {state})")]
    NotConnected {
        /// State observed when the operation was attempted
        state: ConnectionState,
    },

    /// The transport accepted the work but did not confirm it in time.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// What was being waited for
        operation: String,
        /// How long the caller waited
        duration: Duration,
    },

    /// The caller supplied an unusable argument.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong
        reason: String,
    },

    /// There is no receiver to close.
    #[error("no active receiver")]
    NoActiveReceiver,

    /// A session-layer error occurred.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// A completion signal could not be resolved.
    #[error("signal error: {0}")]
    Signal(#[from] SignalError),

    /// A worker thread could not be started.
    #[error("failed to spawn {what}: {source}")]
    Spawn {
        /// The thread that failed to start
        what: String,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl MsgBusError {
    /// Creates a [`MsgBusError::InvalidArgument`].
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        MsgBusError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Creates a [`MsgBusError::Timeout`].
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        MsgBusError::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Returns `true` if retrying the operation later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            MsgBusError::NotConnected { .. } | MsgBusError::Timeout { .. } => true,
            MsgBusError::Session(error) => error.is_recoverable(),
            MsgBusError::Signal(error) => error.is_timeout(),
            MsgBusError::InvalidArgument { .. }
            | MsgBusError::NoActiveReceiver
            | MsgBusError::Spawn { .. } => false,
        }
    }

    /// Returns `true` if this error reports an expired wait.
    pub fn is_timeout(&self) -> bool {
        match self {
            MsgBusError::Timeout { .. } => true,
            MsgBusError::Signal(error) => error.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if this is a session-layer error.
    pub fn is_session_error(&self) -> bool {
        matches!(self, MsgBusError::Session(_))
    }
}
