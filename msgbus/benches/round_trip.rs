//! Round-trip benchmarks for msgbus
//!
//! Measures over the in-process broker:
//! - Publish latency (sender open + send confirmation)
//! - Publish-to-listener delivery latency
//! - Synchronous request/reply latency for different body sizes

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use msgbus::client::{ClientConfig, DEFAULT_MEMORY_ENDPOINT};
use msgbus::message::STATUS_OK;
use msgbus::session::{MemoryBroker, MemoryTransport};
use msgbus::{Message, MessageBus};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::time::Duration;

fn bus(broker: &Arc<MemoryBroker>, name: &str) -> Arc<MessageBus> {
    let config = ClientConfig::new(name)
        .with_endpoint(DEFAULT_MEMORY_ENDPOINT)
        .with_operation_timeout(Duration::from_secs(2));
    let bus = MessageBus::new(Arc::new(MemoryTransport::new(Arc::clone(broker))), config).unwrap();
    assert!(bus.connect().is_connected());
    Arc::new(bus)
}

/// Benchmark publish confirmation latency
fn bench_publish(c: &mut Criterion) {
    let broker = MemoryBroker::new();
    let publisher = bus(&broker, "bench-pub");

    c.bench_function("publish", |b| {
        b.iter(|| {
            let state = publisher.publish("/bench/publish", Message::new("payload"));
            assert!(state.is_accepted());
        });
    });
}

/// Benchmark publish-to-listener delivery
fn bench_delivery(c: &mut Criterion) {
    let broker = MemoryBroker::new();
    let subscriber = bus(&broker, "bench-sub");
    let publisher = bus(&broker, "bench-src");

    let (tx, rx) = mpsc::channel::<()>();
    let tx = parking_lot::Mutex::new(tx);
    subscriber.subscribe(
        "/bench/delivery",
        Arc::new(move |_| {
            let _ = tx.lock().send(());
        }),
    );

    c.bench_function("delivery", |b| {
        b.iter(|| {
            publisher.publish("/bench/delivery", Message::new("payload"));
            rx.recv_timeout(Duration::from_secs(2)).unwrap();
        });
    });
}

/// Benchmark synchronous request/reply
fn bench_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("request");
    let broker = MemoryBroker::new();

    let replyer = bus(&broker, "bench-replyer");
    let handle: Weak<MessageBus> = Arc::downgrade(&replyer);
    replyer.receive(
        "/bench/queue",
        Arc::new(move |request: Message| {
            if let (Some(bus), Some(reply_to)) = (handle.upgrade(), request.reply_to()) {
                bus.send_reply(reply_to, request.build_reply(STATUS_OK));
            }
        }),
    );
    let requester = bus(&broker, "bench-requester");

    for size in [16usize, 1024, 16384] {
        group.bench_with_input(BenchmarkId::from_parameter(format!("{size}bytes")), &size, |b, &size| {
            b.iter(|| {
                let reply = requester.request("/bench/queue", Message::new(vec![0u8; size]), 2);
                assert!(reply.is_some());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_publish, bench_delivery, bench_request);
criterion_main!(benches);
