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

//! Publish/subscribe over the in-process broker.
//!
//! Run with: `cargo run --example pub_sub`

use msgbus::client::{ClientConfig, DEFAULT_MEMORY_ENDPOINT};
use msgbus::session::{MemoryBroker, MemoryTransport};
use msgbus::{CompletionSignal, Message, MessageBus};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let broker = MemoryBroker::new();
    let transport = Arc::new(MemoryTransport::new(broker));

    let subscriber = MessageBus::new(
        transport.clone(),
        ClientConfig::new("subscriber").with_endpoint(DEFAULT_MEMORY_ENDPOINT),
    )?;
    let publisher = MessageBus::new(
        transport,
        ClientConfig::new("publisher").with_endpoint(DEFAULT_MEMORY_ENDPOINT),
    )?;
    println!("subscriber connect: {}", subscriber.connect());
    println!("publisher connect: {}", publisher.connect());

    let received = Arc::new(CompletionSignal::new());
    let signal = Arc::clone(&received);
    let state = subscriber.subscribe(
        "/topicTest",
        Arc::new(move |message: Message| {
            println!("subscriber got: {message}");
            let _ = signal.fulfill(message.into_body());
        }),
    );
    println!("subscribe: {state}");

    let message = Message::build_message("publisher", "/topicTest", "demo", "RESPONSE");
    println!("publish: {}", publisher.publish("/topicTest", message));

    let body = received.wait_for(Duration::from_secs(2))?;
    println!("received body: {}", String::from_utf8_lossy(&body));

    subscriber.close();
    publisher.close();
    Ok(())
}
