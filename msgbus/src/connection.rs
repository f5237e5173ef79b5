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

//! Connection state tracking.
//!
//! The [`ConnectionMonitor`] records what the transport last reported about
//! the broker connection and lets caller threads block until that state is
//! resolved.
//!
//! ```text
//! Unknown ──connect()──> Connecting ──open──> Connected ──transport error──> Lost
//!                            │                    ^                           │
//!                            └──timeout/failure──>│ConnectFailed      reopen──┘
//! ```
//!
//! `Unknown`, `Connecting` and `Lost` are unresolved: a caller asking whether
//! the client is connected waits on the connect signal. `Connected` and
//! `ConnectFailed` are answered immediately.

use crate::signal::CompletionSignal;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Health of the broker connection as last reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No connection attempt has been made.
    Unknown,
    /// A connection attempt is in progress.
    Connecting,
    /// The transport reported the connection open.
    Connected,
    /// The attempt failed or did not complete in time.
    ConnectFailed,
    /// An open connection was lost; the transport may be reconnecting.
    Lost,
}

impl ConnectionState {
    /// Returns `true` for [`ConnectionState::Connected`].
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` while the state must be resolved by waiting.
    pub const fn needs_resolution(&self) -> bool {
        matches!(self, Self::Unknown | Self::Connecting | Self::Lost)
    }

    /// Stable name of the state.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::ConnectFailed => "ConnectFailed",
            Self::Lost => "Lost",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Owns a [`ConnectionState`] and the signal that resolves it.
///
/// State changes come from transport callbacks on the driver thread;
/// [`connected`](Self::connected) is called from any caller thread.
#[derive(Debug)]
pub struct ConnectionMonitor {
    state: Mutex<ConnectionState>,
    signal: Mutex<Arc<CompletionSignal<ConnectionState>>>,
}

impl ConnectionMonitor {
    /// Creates a monitor in the `Unknown` state.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Unknown),
            signal: Mutex::new(Arc::new(CompletionSignal::new())),
        }
    }

    /// Current state, without waiting.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Returns the connection state, waiting up to `timeout` if unresolved.
    ///
    /// An unresolved state that is still unresolved when the wait expires
    /// becomes `ConnectFailed`. Once resolved, repeated calls return the same
    /// answer until the transport reports a change.
    pub fn connected(&self, timeout: Duration) -> ConnectionState {
        let current = self.state();
        if !current.needs_resolution() {
            return current;
        }

        let signal = Arc::clone(&self.signal.lock());
        trace!(state = %current, ?timeout, "waiting for connection");
        match signal.wait_for(timeout) {
            Ok(_) => self.state(),
            Err(error) => {
                let mut state = self.state.lock();
                if state.needs_resolution() {
                    debug!(from = %*state, error = %error, "connection not resolved in time");
                    *state = ConnectionState::ConnectFailed;
                }
                *state
            }
        }
    }

    /// Marks a connect attempt as started.
    pub fn begin_connect(&self) {
        self.ensure_pending_signal();
        *self.state.lock() = ConnectionState::Connecting;
    }

    /// Records a connection-open event and wakes waiters.
    pub fn on_open(&self) {
        *self.state.lock() = ConnectionState::Connected;
        self.resolve(ConnectionState::Connected);
    }

    /// Records a failed connect attempt and wakes waiters.
    pub fn on_connect_failed(&self) {
        *self.state.lock() = ConnectionState::ConnectFailed;
        self.resolve(ConnectionState::ConnectFailed);
    }

    /// Records a lost connection.
    ///
    /// Blocked callers are not woken. New callers block on a fresh signal
    /// until the transport reopens the connection or their timeout expires.
    pub fn on_lost(&self) {
        self.ensure_pending_signal();
        *self.state.lock() = ConnectionState::Lost;
    }

    /// Returns to `Unknown` after the owner closed the connection.
    pub fn on_closed(&self) {
        self.ensure_pending_signal();
        *self.state.lock() = ConnectionState::Unknown;
    }

    /// Replaces the connect signal if it already carries an outcome.
    ///
    /// A pending signal carries no outcome and is kept so that callers
    /// already blocked on it observe the next open.
    pub fn reset_signal(&self) {
        self.ensure_pending_signal();
    }

    fn ensure_pending_signal(&self) {
        let mut signal = self.signal.lock();
        if !signal.is_pending() {
            *signal = Arc::new(CompletionSignal::new());
        }
    }

    fn resolve(&self, outcome: ConnectionState) {
        let signal = Arc::clone(&self.signal.lock());
        if let Err(error) = signal.fulfill(outcome) {
            trace!(outcome = %outcome, error = %error, "connect signal already resolved");
        }
    }
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new()
    }
}
