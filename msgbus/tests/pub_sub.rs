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

//! Integration tests for publish/subscribe over the memory broker.

use msgbus::client::{ClientAdapter, ClientConfig, DEFAULT_MEMORY_ENDPOINT};
use msgbus::session::{MemoryBroker, MemoryTransport};
use msgbus::{CompletionSignal, DeliveryState, Message, MessageBus, MessageListener};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_millis(500);

fn config(name: &str) -> ClientConfig {
    ClientConfig::new(name)
        .with_endpoint(DEFAULT_MEMORY_ENDPOINT)
        .with_operation_timeout(TIMEOUT)
}

fn connected_bus(broker: &Arc<MemoryBroker>, name: &str) -> MessageBus {
    let bus = MessageBus::new(Arc::new(MemoryTransport::new(Arc::clone(broker))), config(name)).unwrap();
    assert!(bus.connect().is_connected());
    bus
}

fn recorder() -> (MessageListener, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: MessageListener = Arc::new(move |message: Message| {
        sink.lock().push(message.body_str().unwrap_or_default().to_string());
    });
    (listener, seen)
}

fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Test that a published message reaches the subscriber exactly once.
#[test]
fn test_subscriber_observes_published_message_once() {
    let broker = MemoryBroker::new();
    let subscriber = connected_bus(&broker, "subscriber");
    let publisher = connected_bus(&broker, "publisher");
    let (listener, seen) = recorder();

    assert_eq!(subscriber.subscribe("/topicTest", listener), DeliveryState::Accepted);
    let message = Message::build_message("publisher", "/topicTest", "test", "RESPONSE");
    assert_eq!(publisher.publish("/topicTest", message), DeliveryState::Accepted);

    assert!(wait_until(Duration::from_secs(5), || !seen.lock().is_empty()));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(*seen.lock(), vec!["RESPONSE".to_string()]);
}

/// Test that publish and subscribe return within the operation timeout once connected.
#[test]
fn test_calls_bounded_by_timeout() {
    let broker = MemoryBroker::new();
    let bus = connected_bus(&broker, "bounded");
    let slack = Duration::from_millis(400);

    let started = Instant::now();
    bus.subscribe("/bounded", Arc::new(|_| {}));
    bus.publish("/bounded", Message::new("x"));
    assert!(started.elapsed() < 2 * TIMEOUT + slack);

    broker.suppress_link_events(true);
    let started = Instant::now();
    assert_eq!(bus.publish("/bounded", Message::new("y")), DeliveryState::Rejected);
    let elapsed = started.elapsed();
    assert!(elapsed >= TIMEOUT);
    assert!(elapsed < TIMEOUT + slack);
}

/// Test that every subscriber of a topic receives its own copy.
#[test]
fn test_fan_out_to_all_subscribers() {
    let broker = MemoryBroker::new();
    let first = connected_bus(&broker, "first");
    let second = connected_bus(&broker, "second");
    let publisher = connected_bus(&broker, "pub");
    let (listener_a, seen_a) = recorder();
    let (listener_b, seen_b) = recorder();

    first.subscribe("/fan", listener_a);
    second.subscribe("/fan", listener_b);
    assert_eq!(broker.receiver_count("/fan"), 2);

    publisher.publish("/fan", Message::new("both"));
    assert!(wait_until(Duration::from_secs(5), || {
        seen_a.lock().len() == 1 && seen_b.lock().len() == 1
    }));
}

/// Test that one bus holds independent subscriptions per topic.
#[test]
fn test_bus_keeps_subscriptions_per_topic() {
    let broker = MemoryBroker::new();
    let bus = connected_bus(&broker, "multi");
    let (listener_a, seen_a) = recorder();
    let (listener_b, seen_b) = recorder();

    bus.subscribe("/a", listener_a);
    bus.subscribe("/b", listener_b);
    assert_eq!(bus.subscription_count(), 2);

    bus.publish("/a", Message::new("to-a"));
    bus.publish("/b", Message::new("to-b"));

    assert!(wait_until(Duration::from_secs(5), || {
        seen_a.lock().len() == 1 && seen_b.lock().len() == 1
    }));
    assert_eq!(seen_a.lock()[0], "to-a");
    assert_eq!(seen_b.lock()[0], "to-b");
}

/// Test that messages stop after unsubscribe.
#[test]
fn test_unsubscribe_stops_delivery() {
    let broker = MemoryBroker::new();
    let subscriber = connected_bus(&broker, "leaving");
    let publisher = connected_bus(&broker, "staying");
    let (listener, seen) = recorder();

    subscriber.subscribe("/leave", listener);
    assert_eq!(subscriber.unsubscribe("/leave", None), DeliveryState::Accepted);
    publisher.publish("/leave", Message::new("late"));

    thread::sleep(Duration::from_millis(100));
    assert!(seen.lock().is_empty());
}

/// Test that a message whose routing key does not match the subscription is dropped.
#[test]
fn test_unmatched_routing_key_dropped() {
    let broker = MemoryBroker::new();
    let transport = Arc::new(MemoryTransport::new(Arc::clone(&broker)));
    let consumer = ClientAdapter::new(transport.clone(), config("filtered")).unwrap();
    let producer = ClientAdapter::new(transport, config("producer")).unwrap();
    consumer.connect();
    producer.connect();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let listener: MessageListener = Arc::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    assert!(consumer.receive("/replies", Some("corr-expected"), listener).is_accepted());

    // routed on the address, which is not the filter key
    assert!(producer.send(Message::build_message("p", "/replies", "s", "plain")).is_accepted());
    // routed on a correlation id that is not the filter key
    let stray = Message::build_message("p", "/replies", "s", "stray").with(msgbus::message::CORRELATION_ID, "corr-other");
    assert!(producer.send(stray).is_accepted());
    // routed on the expected correlation id
    let wanted = Message::build_message("p", "/replies", "s", "wanted").with(msgbus::message::CORRELATION_ID, "corr-expected");
    assert!(producer.send(wanted).is_accepted());

    assert!(wait_until(Duration::from_secs(5), || hits.load(Ordering::SeqCst) == 1));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

/// Test that a blocking listener does not hold up the subscriber's other work.
#[test]
fn test_slow_listener_does_not_block_subscribe_calls() {
    let broker = MemoryBroker::new();
    let subscriber = connected_bus(&broker, "slow");
    let publisher = connected_bus(&broker, "fast");
    let release = Arc::new(CompletionSignal::<()>::new());
    let gate = Arc::clone(&release);

    subscriber.subscribe(
        "/slow",
        Arc::new(move |_| {
            let _ = gate.wait_for(Duration::from_secs(5));
        }),
    );
    publisher.publish("/slow", Message::new("block"));

    let started = Instant::now();
    assert!(subscriber.subscribe("/other", Arc::new(|_| {})).is_accepted());
    assert!(started.elapsed() < TIMEOUT);
    release.fulfill(()).unwrap();
}
