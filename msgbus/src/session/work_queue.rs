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

//! Work submission into a connection's driver thread.

use super::{ConnectionId, SessionError, WorkUnit};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Lifecycle flags shared between a [`Connection`] handle and its driver.
#[derive(Debug)]
pub struct DriverFlags {
    active: AtomicBool,
    closing: AtomicBool,
}

impl DriverFlags {
    /// Creates flags for a running driver.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            active: AtomicBool::new(true),
            closing: AtomicBool::new(false),
        })
    }

    /// Returns `true` while the driver thread is running.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Called by the driver as it exits.
    pub fn mark_inactive(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Returns `true` once the owner asked the connection to close.
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Asks the driver to stop, including any reconnection in progress.
    pub fn request_close(&self) {
        self.closing.store(true, Ordering::Release);
    }

    /// Sleeps for `delay` unless a close is requested first.
    ///
    /// Returns `false` if the sleep was cut short by a close request.
    pub fn sleep_unless_closing(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            if self.is_closing() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return true;
            }
            thread::sleep(remaining.min(CLOSE_POLL_INTERVAL));
        }
    }
}

/// Destination of submitted work, implemented by each transport's driver.
pub trait WorkSink: Send + Sync {
    /// Hands `work` to the driver thread.
    fn submit(&self, work: WorkUnit) -> Result<(), SessionError>;
}

/// A [`WorkSink`] feeding an unbounded tokio channel.
///
/// Drivers drain the receiving half with `blocking_recv` on their own thread.
#[derive(Debug)]
pub struct ChannelSink {
    connection: ConnectionId,
    sender: mpsc::UnboundedSender<WorkUnit>,
}

impl ChannelSink {
    /// Creates a sink and the receiver the driver thread drains.
    pub fn channel(connection: ConnectionId) -> (Self, mpsc::UnboundedReceiver<WorkUnit>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { connection, sender }, receiver)
    }
}

impl WorkSink for ChannelSink {
    fn submit(&self, work: WorkUnit) -> Result<(), SessionError> {
        self.sender.send(work).map_err(|_| SessionError::QueueClosed {
            connection: self.connection,
        })
    }
}

/// Serialized work queue of one connection.
///
/// Cloning is cheap; every clone feeds the same driver thread. Work runs in
/// submission order.
#[derive(Clone)]
pub struct WorkQueue {
    connection: ConnectionId,
    sink: Arc<dyn WorkSink>,
}

impl WorkQueue {
    /// Wraps a transport's sink.
    pub fn new(connection: ConnectionId, sink: Arc<dyn WorkSink>) -> Self {
        Self { connection, sink }
    }

    /// Submits `work` for execution on the driver thread.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::QueueClosed`] once the driver has exited.
    pub fn add(&self, work: WorkUnit) -> Result<(), SessionError> {
        self.sink.submit(work)
    }

    /// The connection this queue feeds.
    pub fn connection(&self) -> ConnectionId {
        self.connection
    }
}

impl fmt::Debug for WorkQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkQueue")
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}

/// Caller-side handle of a broker connection.
///
/// The driver thread owns the protocol session; this handle only submits
/// work to it and observes whether it is still running.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    work_queue: WorkQueue,
    flags: Arc<DriverFlags>,
}

impl Connection {
    /// Creates a handle sharing `flags` with the driver.
    pub fn new(id: ConnectionId, work_queue: WorkQueue, flags: Arc<DriverFlags>) -> Self {
        Self {
            id,
            work_queue,
            flags,
        }
    }

    /// Returns the connection identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the connection's work queue.
    pub fn work_queue(&self) -> &WorkQueue {
        &self.work_queue
    }

    /// Returns `true` while the driver thread is running.
    pub fn is_active(&self) -> bool {
        self.flags.is_active()
    }

    /// Asks the driver to close the session and exit.
    ///
    /// A reconnection in progress is abandoned. Does not wait for the
    /// driver thread.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::QueueClosed`] if the driver already exited.
    pub fn close(&self) -> Result<(), SessionError> {
        debug!(connection = %self.id, "closing connection");
        self.flags.request_close();
        self.work_queue.add(Box::new(|session| {
            if let Err(error) = session.close() {
                debug!(error = %error, "session close reported an error");
            }
        }))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.is_active() && !self.flags.is_closing() {
            let _ = self.close();
        }
    }
}
