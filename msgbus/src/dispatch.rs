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

//! Listener dispatch off the transport driver thread.
//!
//! Listeners are user code and may block or panic; neither may stall a
//! connection's driver. The [`DispatchPool`] runs them on a small set of
//! worker threads instead. Each subscription key is pinned to one worker, so
//! messages for the same key are delivered in arrival order while different
//! keys proceed in parallel.
//!
//! Worker queues are bounded. When a listener falls so far behind that its
//! worker's queue is full, further messages for that worker are dropped and
//! logged rather than buffered without limit.

use crate::error::MsgBusError;
use crate::message::Message;
use crate::registry::MessageListener;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, trace, warn};

/// Default number of messages a worker may have queued.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

struct Job {
    key: String,
    listener: MessageListener,
    message: Message,
}

struct PoolInner {
    workers: Vec<mpsc::Sender<Job>>,
    capacity: usize,
    handles: Vec<JoinHandle<()>>,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        // closing the queues lets each worker drain and exit
        self.workers.clear();
        let current = thread::current().id();
        for handle in self.handles.drain(..) {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}

/// Fixed-size pool of threads running message listeners.
///
/// Cloning is cheap and shares the workers. The threads stop once the last
/// clone is dropped and their queues are drained.
#[derive(Clone)]
pub struct DispatchPool {
    inner: Arc<PoolInner>,
}

impl DispatchPool {
    /// Starts a pool with `workers` threads (at least one) and the default
    /// queue capacity.
    ///
    /// # Errors
    ///
    /// Returns [`MsgBusError::Spawn`] if a worker thread cannot be started.
    pub fn new(workers: usize) -> Result<Self, MsgBusError> {
        Self::with_capacity(workers, DEFAULT_QUEUE_CAPACITY)
    }

    /// Starts a pool whose workers each queue at most `capacity` messages
    /// (at least one).
    ///
    /// # Errors
    ///
    /// Returns [`MsgBusError::Spawn`] if a worker thread cannot be started.
    pub fn with_capacity(workers: usize, capacity: usize) -> Result<Self, MsgBusError> {
        let count = workers.max(1);
        let capacity = capacity.max(1);
        let mut senders = Vec::with_capacity(count);
        let mut handles = Vec::with_capacity(count);

        for index in 0..count {
            let (sender, receiver) = mpsc::channel(capacity);
            let handle = thread::Builder::new()
                .name(format!("msgbus-dispatch-{index}"))
                .spawn(move || run_worker(index, receiver))
                .map_err(|source| MsgBusError::Spawn {
                    what: format!("dispatch worker {index}"),
                    source,
                })?;
            senders.push(sender);
            handles.push(handle);
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                workers: senders,
                capacity,
                handles,
            }),
        })
    }

    /// Number of worker threads.
    pub fn workers(&self) -> usize {
        self.inner.workers.len()
    }

    /// Per-worker queue capacity.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Queues `listener(message)` on the worker owning `key`.
    ///
    /// Never blocks. Returns `false` if the message was dropped because the
    /// worker's queue is full or the worker is gone.
    pub fn submit(&self, key: &str, listener: MessageListener, message: Message) -> bool {
        let worker = self.worker_for(key);
        let job = Job {
            key: key.to_string(),
            listener,
            message,
        };
        match self.inner.workers[worker].try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(key = %key, worker, capacity = self.inner.capacity, "dispatch queue full, message dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                warn!(key = %key, worker, "dispatch worker is gone, message dropped");
                false
            }
        }
    }

    fn worker_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.inner.workers.len() as u64) as usize
    }
}

fn run_worker(index: usize, mut receiver: mpsc::Receiver<Job>) {
    while let Some(job) = receiver.blocking_recv() {
        let Job {
            key,
            listener,
            message,
        } = job;
        trace!(worker = index, key = %key, "dispatching message");
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(message))) {
            error!(
                worker = index,
                key = %key,
                panic = %panic_message(panic.as_ref()),
                "message listener panicked"
            );
        }
    }
    trace!(worker = index, "dispatch worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::CompletionSignal;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[test]
    fn test_listener_runs_off_caller_thread() {
        let pool = DispatchPool::new(2).unwrap();
        let caller = thread::current().id();
        let done = Arc::new(CompletionSignal::new());
        let signal = Arc::clone(&done);

        pool.submit(
            "/topic",
            Arc::new(move |_| {
                signal.fulfill(thread::current().id()).unwrap();
            }),
            Message::new("x"),
        );

        let worker = done.wait_for(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn test_order_preserved_per_key() {
        let pool = DispatchPool::new(4).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let done = Arc::new(CompletionSignal::new());

        let listener: MessageListener = {
            let seen = Arc::clone(&seen);
            let done = Arc::clone(&done);
            Arc::new(move |message: Message| {
                let mut seen = seen.lock();
                seen.push(message.body_str().unwrap_or_default().to_string());
                if seen.len() == 50 {
                    let _ = done.fulfill(());
                }
            })
        };

        for index in 0..50 {
            pool.submit("/ordered", Arc::clone(&listener), Message::new(index.to_string()));
        }

        done.wait_for(Duration::from_secs(5)).unwrap();
        let expected: Vec<String> = (0..50).map(|i| i.to_string()).collect();
        assert_eq!(*seen.lock(), expected);
    }

    #[test]
    fn test_panicking_listener_does_not_kill_worker() {
        let pool = DispatchPool::new(1).unwrap();
        let done = Arc::new(CompletionSignal::new());
        let signal = Arc::clone(&done);

        pool.submit("/k", Arc::new(|_| panic!("listener failure")), Message::new(""));
        pool.submit(
            "/k",
            Arc::new(move |message: Message| {
                signal.fulfill(message.into_body()).unwrap();
            }),
            Message::new("after"),
        );

        assert_eq!(done.wait_for(Duration::from_secs(5)).unwrap(), b"after".to_vec());
    }

    #[test]
    fn test_zero_workers_rounds_up() {
        let pool = DispatchPool::new(0).unwrap();
        assert_eq!(pool.workers(), 1);
        assert_eq!(pool.capacity(), DEFAULT_QUEUE_CAPACITY);
        assert_eq!(DispatchPool::with_capacity(1, 0).unwrap().capacity(), 1);
    }

    #[test]
    fn test_full_queue_drops_instead_of_growing() {
        let pool = DispatchPool::with_capacity(1, 2).unwrap();
        let started = Arc::new(CompletionSignal::new());
        let release = Arc::new(CompletionSignal::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let listener: MessageListener = {
            let started = Arc::clone(&started);
            let release = Arc::clone(&release);
            let seen = Arc::clone(&seen);
            Arc::new(move |message: Message| {
                if message.body_str() == Some("blocker") {
                    let _ = started.fulfill(());
                    let _ = release.wait_for(Duration::from_secs(5));
                }
                seen.lock().push(message.body_str().unwrap_or_default().to_string());
            })
        };

        assert!(pool.submit("/slow", Arc::clone(&listener), Message::new("blocker")));
        started.wait_for(Duration::from_secs(5)).unwrap();

        assert!(pool.submit("/slow", Arc::clone(&listener), Message::new("1")));
        assert!(pool.submit("/slow", Arc::clone(&listener), Message::new("2")));
        assert!(!pool.submit("/slow", Arc::clone(&listener), Message::new("3")));

        release.fulfill(()).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while seen.lock().len() < 3 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*seen.lock(), vec!["blocker", "1", "2"]);
    }

    #[test]
    fn test_panic_message_extraction() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("boom"));
        assert_eq!(panic_message(owned.as_ref()), "boom");
        let other: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
