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

//! Synchronous request/reply over the in-process broker.
//!
//! Run with: `cargo run --example request_reply`

use msgbus::client::{ClientConfig, DEFAULT_MEMORY_ENDPOINT};
use msgbus::message::STATUS_OK;
use msgbus::session::{MemoryBroker, MemoryTransport};
use msgbus::{Message, MessageBus};
use std::sync::{Arc, Weak};

const QUEUE: &str = "/queueTest";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let transport = Arc::new(MemoryTransport::new(MemoryBroker::new()));

    let replyer = Arc::new(MessageBus::new(
        transport.clone(),
        ClientConfig::new("replyer").with_endpoint(DEFAULT_MEMORY_ENDPOINT),
    )?);
    replyer.connect();

    // the listener holds the bus weakly so dropping `replyer` shuts it down
    let handle: Weak<MessageBus> = Arc::downgrade(&replyer);
    replyer.receive(
        QUEUE,
        Arc::new(move |request: Message| {
            let Some(bus) = handle.upgrade() else { return };
            let Some(reply_to) = request.reply_to().map(str::to_string) else {
                return;
            };
            let body = format!("{}{}", request.body_str().unwrap_or_default(), STATUS_OK);
            let reply = request.build_reply(body);
            println!("replying to {reply_to}");
            bus.send_reply(&reply_to, reply);
        }),
    );

    let requester = MessageBus::new(
        transport,
        ClientConfig::new("requester").with_endpoint(DEFAULT_MEMORY_ENDPOINT),
    )?;
    requester.connect();

    let request = Message::build_request("requester", QUEUE, "query", "/replies/requester", "QUERY");
    match requester.request(QUEUE, request, 2) {
        Some(reply) => println!("reply: {}", reply.body_str().unwrap_or_default()),
        None => println!("no reply"),
    }

    requester.close();
    replyer.close();
    Ok(())
}
