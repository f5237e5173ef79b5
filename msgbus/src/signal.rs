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

//! Single-assignment completion signals.
//!
//! A [`CompletionSignal`] is the meeting point between a transport driver
//! thread reporting an event and a caller thread blocked until that event
//! happens (or a deadline passes). It replaces callback-style completion with
//! call/return ergonomics while keeping the driver thread non-blocking: the
//! driver only ever calls [`CompletionSignal::fulfill`], which never waits.
//!
//! Signals are single use. Code that reuses a logical "slot" (the send phase
//! of a client, for instance) installs a fresh signal before each operation so
//! that a late fulfillment from an abandoned operation can never be observed
//! by the next one.
//!
//! # Example
//!
//! ```rust
//! use msgbus::signal::CompletionSignal;
//! use std::sync::Arc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let signal = Arc::new(CompletionSignal::<u32>::new());
//! let driver = Arc::clone(&signal);
//!
//! thread::spawn(move || {
//!     driver.fulfill(42).unwrap();
//! });
//!
//! assert_eq!(signal.wait_for(Duration::from_secs(5)).unwrap(), 42);
//! ```

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors reported by a [`CompletionSignal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignalError {
    /// The signal already holds a value; the new one was discarded.
    #[error("signal already fulfilled")]
    AlreadyFulfilled,

    /// The waiter gave up before the value arrived.
    ///
    /// This is the normal outcome of a late transport callback and is
    /// harmless: the waiter has already reported a timeout.
    #[error("signal abandoned by its waiter after a timeout")]
    Abandoned,

    /// No outcome was reported before the deadline.
    #[error("no outcome reported within {duration:?}")]
    TimedOut {
        /// How long the waiter was prepared to wait.
        duration: Duration,
    },
}

impl SignalError {
    /// Returns `true` if this error reports an expired wait.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

/// Observable state of a [`CompletionSignal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalState<T> {
    /// No outcome yet.
    Pending,
    /// An outcome was reported.
    Fulfilled(T),
    /// A waiter gave up before any outcome was reported.
    TimedOut,
}

impl<T> SignalState<T> {
    /// Returns `true` while no outcome has been recorded.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// A value-or-void result cell that one thread fulfills and another waits on.
///
/// Exactly one fulfillment is accepted. Fulfilling twice, or after the waiter
/// timed out, returns an error instead of panicking so that transport driver
/// threads can log and carry on.
///
/// # Thread Safety
///
/// The signal is `Sync`; share it through an `Arc` between the fulfilling
/// driver thread and any number of waiters.
pub struct CompletionSignal<T> {
    state: Mutex<SignalState<T>>,
    resolved: Condvar,
}

impl<T> CompletionSignal<T> {
    /// Creates a pending signal.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::Pending),
            resolved: Condvar::new(),
        }
    }

    /// Records the outcome and wakes every waiter.
    ///
    /// # Errors
    ///
    /// - [`SignalError::AlreadyFulfilled`] if a value was already recorded.
    /// - [`SignalError::Abandoned`] if a waiter timed out first.
    pub fn fulfill(&self, value: T) -> Result<(), SignalError> {
        let mut state = self.state.lock();
        if let SignalState::Fulfilled(_) = &*state {
            return Err(SignalError::AlreadyFulfilled);
        }
        if let SignalState::TimedOut = &*state {
            return Err(SignalError::Abandoned);
        }

        *state = SignalState::Fulfilled(value);
        drop(state);
        self.resolved.notify_all();
        Ok(())
    }

    /// Returns `true` while no outcome has been recorded.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state.lock().is_pending()
    }
}

impl<T: Clone> CompletionSignal<T> {
    /// Blocks until the signal is fulfilled or `timeout` elapses.
    ///
    /// A wait that expires marks the signal as timed out; later fulfillments
    /// are rejected with [`SignalError::Abandoned`]. The wait never returns
    /// early on a timeout: spurious wakeups are absorbed against a fixed
    /// deadline.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::TimedOut`] when no value arrived in time.
    pub fn wait_for(&self, timeout: Duration) -> Result<T, SignalError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            match &*state {
                SignalState::Fulfilled(value) => return Ok(value.clone()),
                SignalState::TimedOut => return Err(SignalError::TimedOut { duration: timeout }),
                SignalState::Pending => {}
            }

            if self.resolved.wait_until(&mut state, deadline).timed_out() {
                if let SignalState::Fulfilled(value) = &*state {
                    return Ok(value.clone());
                }
                *state = SignalState::TimedOut;
                return Err(SignalError::TimedOut { duration: timeout });
            }
        }
    }

    /// Returns the recorded value without waiting.
    #[must_use]
    pub fn try_get(&self) -> Option<T> {
        match &*self.state.lock() {
            SignalState::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns a snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> SignalState<T> {
        self.state.lock().clone()
    }
}

impl<T> Default for CompletionSignal<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for CompletionSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.state.lock() {
            SignalState::Pending => "pending",
            SignalState::Fulfilled(_) => "fulfilled",
            SignalState::TimedOut => "timed-out",
        };
        f.debug_struct("CompletionSignal")
            .field("state", &state)
            .finish()
    }
}
