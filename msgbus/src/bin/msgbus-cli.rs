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

//! Command line client for an AMQP or MQTT message bus.
//!
//! Usage:
//!   msgbus-cli -e tcp://localhost:1883 -t /etn/test subscribe
//!   msgbus-cli -t /etn/test -s greeting publish hello world
//!   msgbus-cli -e amqp://127.0.0.1:5672 -q /etn/queue -T 5 request ping
//!
//! `amqp://` endpoints use AMQP 1.0; anything else is taken as MQTT.
//!
//! Environment variables:
//!   MSGBUS_ENDPOINT - broker endpoint (default: tcp://localhost:1883)
//!   RUST_LOG - log filter (default: info)

use clap::{Parser, Subcommand};
use msgbus::client::{ClientConfig, DEFAULT_MQTT_ENDPOINT};
use msgbus::message::{
    CORRELATION_ID, CorrelationId, FROM, Message, REPLY_TO, SUBJECT, TIMEOUT,
};
use msgbus::session::{AmqpTransport, MqttTransport, Transport};
use msgbus::{ConnectionState, MessageBus, MessageListener};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "msgbus-cli")]
#[command(about = "Publish, subscribe and exchange requests on a message bus")]
#[command(version)]
struct Args {
    /// Endpoint to connect to
    #[arg(short = 'e', long, env = "MSGBUS_ENDPOINT", default_value = DEFAULT_MQTT_ENDPOINT)]
    endpoint: String,

    /// Subject of the message
    #[arg(short = 's', long, default_value = "")]
    subject: String,

    /// Topic to publish or subscribe on
    #[arg(short = 't', long, default_value = "")]
    topic: String,

    /// Timeout in seconds
    #[arg(short = 'T', long, default_value_t = 5)]
    timeout: u64,

    /// Queue to send requests to or receive on
    #[arg(short = 'q', long, default_value = "")]
    queue: String,

    /// Send the message without metadata
    #[arg(short = 'x', long = "no-metadata")]
    no_metadata: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Send a request with payload
    SendRequest { payload: Vec<String> },
    /// Send a request with payload and wait for the reply
    Request { payload: Vec<String> },
    /// Listen on a queue and dump received messages
    Receive,
    /// Subscribe on a topic and dump received messages
    Subscribe,
    /// Publish a message on a topic
    Publish { payload: Vec<String> },
}

fn transport_for(endpoint: &str) -> Arc<dyn Transport> {
    if endpoint.starts_with("amqp://") {
        Arc::new(AmqpTransport::new())
    } else {
        Arc::new(MqttTransport::new())
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = ClientConfig::new(format!("msgbus-cli-{}", &CorrelationId::new().to_string()[..8]))
        .with_endpoint(args.endpoint.as_str())
        .with_operation_timeout(Duration::from_secs(args.timeout.max(1)));

    let bus = match MessageBus::new(transport_for(&args.endpoint), config) {
        Ok(bus) => bus,
        Err(error) => {
            error!(error = %error, "could not start message bus");
            return ExitCode::FAILURE;
        }
    };

    let state = bus.connect();
    if state != ConnectionState::Connected {
        error!(endpoint = %args.endpoint, state = %state, "not connected");
        return ExitCode::FAILURE;
    }

    let ok = match &args.action {
        Action::Publish { payload } => {
            let mut message = Message::new(payload.join(" "));
            if !args.no_metadata {
                message.set(SUBJECT, args.subject.as_str());
            }
            dump(&message);
            bus.publish(&args.topic, message).is_accepted()
        }
        Action::SendRequest { payload } => {
            let message = request_message(&args, bus.name(), payload);
            dump(&message);
            bus.send_request(&args.queue, message).is_accepted()
        }
        Action::Request { payload } => {
            let message = request_message(&args, bus.name(), payload);
            dump(&message);
            match bus.request(&args.queue, message, args.timeout) {
                Some(reply) => {
                    dump(&reply);
                    true
                }
                None => {
                    error!(queue = %args.queue, timeout = args.timeout, "no reply");
                    false
                }
            }
        }
        Action::Subscribe => {
            bus.subscribe(&args.topic, dumper()).is_accepted() && wait_for_interrupt()
        }
        Action::Receive => bus.receive(&args.queue, dumper()).is_accepted() && wait_for_interrupt(),
    };

    bus.close();
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

fn request_message(args: &Args, client: &str, payload: &[String]) -> Message {
    let message = Message::new(payload.join(" "));
    if args.no_metadata {
        return message;
    }
    message
        .with(FROM, client)
        .with(REPLY_TO, format!("/replies/{client}"))
        .with(SUBJECT, args.subject.as_str())
        .with(CORRELATION_ID, CorrelationId::new().to_string())
        .with(TIMEOUT, args.timeout.to_string())
}

fn dumper() -> MessageListener {
    Arc::new(|message: Message| dump(&message))
}

fn dump(message: &Message) {
    let metadata: Vec<String> = message
        .metadata()
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect();
    info!(
        metadata = %metadata.join(", "),
        body = %String::from_utf8_lossy(message.body()),
        "message"
    );
}

/// Blocks until Ctrl-C on a local runtime.
fn wait_for_interrupt() -> bool {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(error = %error, "could not start signal runtime");
            return false;
        }
    };
    info!("waiting for messages, Ctrl-C to stop");
    match runtime.block_on(tokio::signal::ctrl_c()) {
        Ok(()) => true,
        Err(error) => {
            error!(error = %error, "could not wait for Ctrl-C");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_flag_not_accepted() {
        assert!(Args::try_parse_from(["msgbus-cli", "-d", "/elsewhere", "receive"]).is_err());
        let args = Args::try_parse_from(["msgbus-cli", "-q", "/etn/queue", "receive"]).unwrap();
        assert_eq!(args.queue, "/etn/queue");
    }

    #[test]
    fn test_transport_follows_endpoint_scheme() {
        assert_eq!(transport_for("amqp://127.0.0.1:5672").name(), "AMQP");
        assert_eq!(transport_for(DEFAULT_MQTT_ENDPOINT).name(), "MQTT");
    }
}
