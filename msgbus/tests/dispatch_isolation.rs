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

//! Integration tests for listener isolation from transport threads.

use msgbus::client::{ClientConfig, DEFAULT_MEMORY_ENDPOINT};
use msgbus::session::{MemoryBroker, MemoryTransport};
use msgbus::{CompletionSignal, Message, MessageBus};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

fn connected_bus(broker: &Arc<MemoryBroker>, name: &str) -> MessageBus {
    let config = ClientConfig::new(name)
        .with_endpoint(DEFAULT_MEMORY_ENDPOINT)
        .with_operation_timeout(Duration::from_millis(500));
    let bus = MessageBus::new(Arc::new(MemoryTransport::new(Arc::clone(broker))), config).unwrap();
    assert!(bus.connect().is_connected());
    bus
}

/// Test that listeners run on dispatch workers rather than driver threads.
#[test]
fn test_listener_runs_on_dispatch_worker() {
    let broker = MemoryBroker::new();
    let subscriber = connected_bus(&broker, "where");
    let publisher = connected_bus(&broker, "who");
    let thread_name = Arc::new(CompletionSignal::new());
    let signal = Arc::clone(&thread_name);

    subscriber.subscribe(
        "/where",
        Arc::new(move |_| {
            let name = thread::current().name().unwrap_or_default().to_string();
            let _ = signal.fulfill(name);
        }),
    );
    publisher.publish("/where", Message::new("?"));

    let name = thread_name.wait_for(Duration::from_secs(5)).unwrap();
    assert!(name.starts_with("msgbus-dispatch-"), "listener ran on {name}");
}

/// Test that a panicking listener does not stop later deliveries.
#[test]
fn test_panicking_listener_is_contained() {
    let broker = MemoryBroker::new();
    let subscriber = connected_bus(&broker, "fragile");
    let publisher = connected_bus(&broker, "source");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);

    subscriber.subscribe(
        "/panics",
        Arc::new(move |message: Message| {
            counter.fetch_add(1, Ordering::SeqCst);
            if message.body_str() == Some("boom") {
                panic!("listener failure");
            }
        }),
    );

    publisher.publish("/panics", Message::new("boom"));
    publisher.publish("/panics", Message::new("fine"));

    let started = Instant::now();
    while calls.load(Ordering::SeqCst) < 2 && started.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // the subscriber's connection is unaffected
    assert!(subscriber.publish("/elsewhere", Message::new("still up")).is_accepted());
}

/// Test that messages for one subscription arrive in publish order.
#[test]
fn test_order_preserved_per_subscription() {
    let broker = MemoryBroker::new();
    let subscriber = connected_bus(&broker, "ordered");
    let publisher = connected_bus(&broker, "sequencer");
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);

    subscriber.subscribe(
        "/ordered",
        Arc::new(move |message: Message| {
            sink.lock().push(message.body_str().unwrap_or_default().to_string());
        }),
    );
    for index in 0..20 {
        assert!(publisher.publish("/ordered", Message::new(index.to_string())).is_accepted());
    }

    let started = Instant::now();
    while seen.lock().len() < 20 && started.elapsed() < Duration::from_secs(5) {
        thread::sleep(Duration::from_millis(5));
    }
    let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
    assert_eq!(*seen.lock(), expected);
}

/// Test that a listener may call back into the bus without deadlocking.
#[test]
fn test_listener_can_publish() {
    let broker = MemoryBroker::new();
    let relay = Arc::new(connected_bus(&broker, "relay"));
    let publisher = connected_bus(&broker, "origin");
    let end = connected_bus(&broker, "end");
    let arrived = Arc::new(CompletionSignal::new());
    let signal = Arc::clone(&arrived);

    end.subscribe(
        "/second",
        Arc::new(move |message: Message| {
            let _ = signal.fulfill(message.into_body());
        }),
    );
    let forward = Arc::downgrade(&relay);
    relay.subscribe(
        "/first",
        Arc::new(move |message: Message| {
            if let Some(bus) = forward.upgrade() {
                bus.publish("/second", Message::new(message.into_body()));
            }
        }),
    );

    publisher.publish("/first", Message::new("hop"));
    assert_eq!(arrived.wait_for(Duration::from_secs(5)).unwrap(), b"hop".to_vec());
}
