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

//! The transport-neutral message DTO.
//!
//! A [`Message`] is an ordered set of string metadata plus an opaque byte
//! body. The metadata keys below are understood by every transport; anything
//! else is carried through untouched.
//!
//! # Example
//!
//! ```rust
//! use msgbus::message::Message;
//!
//! let request = Message::build_request("client", "/queueTest", "greeting", "/replies", "QUERY");
//! assert!(request.is_request());
//!
//! let reply = request.build_reply("QUERYOK");
//! assert!(reply.is_reply());
//! assert_eq!(reply.to(), Some("/replies"));
//! assert_eq!(reply.correlation_id(), request.correlation_id());
//! ```

mod correlation;

pub use correlation::CorrelationId;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Sender identity.
pub const FROM: &str = "FROM";
/// Destination address (topic or queue).
pub const TO: &str = "TO";
/// Free-form subject line.
pub const SUBJECT: &str = "SUBJECT";
/// Correlation id linking a reply to its request.
pub const CORRELATION_ID: &str = "CORRELATION_ID";
/// Address the replier should send the reply to.
pub const REPLY_TO: &str = "REPLY_TO";
/// Requester-side timeout hint, in seconds.
pub const TIMEOUT: &str = "TIMEOUT";
/// Outcome of a request, set on replies.
pub const STATUS: &str = "STATUS";

/// [`STATUS`] value of a successful reply.
pub const STATUS_OK: &str = "OK";
/// [`STATUS`] value of a failed reply.
pub const STATUS_KO: &str = "KO";

/// A message: ordered metadata plus an opaque body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    body: Vec<u8>,
}

impl Message {
    /// Creates a message with no metadata.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Creates a message from existing metadata and body.
    pub fn with_metadata(metadata: BTreeMap<String, String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            metadata,
            body: body.into(),
        }
    }

    /// Builds a one-way message.
    pub fn build_message(
        from: &str,
        to: &str,
        subject: &str,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self::new(body)
            .with(FROM, from)
            .with(TO, to)
            .with(SUBJECT, subject)
    }

    /// Builds a request carrying a fresh correlation id.
    pub fn build_request(
        from: &str,
        to: &str,
        subject: &str,
        reply_to: &str,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self::build_message(from, to, subject, body)
            .with(REPLY_TO, reply_to)
            .with(CORRELATION_ID, CorrelationId::new().to_string())
    }

    /// Builds the reply to this request.
    ///
    /// The reply is addressed to the request's reply-to address, keeps its
    /// correlation id and subject, and is marked [`STATUS_OK`].
    pub fn build_reply(&self, body: impl Into<Vec<u8>>) -> Self {
        let mut reply = Self::new(body).with(STATUS, STATUS_OK);
        if let Some(to) = self.to() {
            reply.set(FROM, to);
        }
        if let Some(reply_to) = self.reply_to() {
            reply.set(TO, reply_to);
        }
        if let Some(subject) = self.subject() {
            reply.set(SUBJECT, subject);
        }
        if let Some(correlation_id) = self.correlation_id() {
            reply.set(CORRELATION_ID, correlation_id);
        }
        reply
    }

    /// Sets `key` and returns the message.
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Returns all metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// Returns mutable access to the metadata.
    pub fn metadata_mut(&mut self) -> &mut BTreeMap<String, String> {
        &mut self.metadata
    }

    /// Returns the raw value of `key`, empty or not.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Sets `key` to `value`.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.metadata.insert(key.to_string(), value.into());
    }

    /// Removes `key`, returning its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.metadata.remove(key)
    }

    fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).filter(|value| !value.is_empty())
    }

    /// Destination address.
    pub fn to(&self) -> Option<&str> {
        self.non_empty(TO)
    }

    /// Sets the destination address.
    pub fn set_to(&mut self, to: impl Into<String>) {
        self.set(TO, to);
    }

    /// Sender identity.
    pub fn from(&self) -> Option<&str> {
        self.non_empty(FROM)
    }

    /// Subject line.
    pub fn subject(&self) -> Option<&str> {
        self.non_empty(SUBJECT)
    }

    /// Correlation id.
    pub fn correlation_id(&self) -> Option<&str> {
        self.non_empty(CORRELATION_ID)
    }

    /// Sets the correlation id.
    pub fn set_correlation_id(&mut self, correlation_id: impl Into<String>) {
        self.set(CORRELATION_ID, correlation_id);
    }

    /// Reply-to address.
    pub fn reply_to(&self) -> Option<&str> {
        self.non_empty(REPLY_TO)
    }

    /// Sets the reply-to address.
    pub fn set_reply_to(&mut self, reply_to: impl Into<String>) {
        self.set(REPLY_TO, reply_to);
    }

    /// Reply status.
    pub fn status(&self) -> Option<&str> {
        self.non_empty(STATUS)
    }

    /// Returns `true` if the message expects a reply.
    pub fn is_request(&self) -> bool {
        self.correlation_id().is_some() && self.reply_to().is_some()
    }

    /// Returns `true` if the message answers a request.
    pub fn is_reply(&self) -> bool {
        self.correlation_id().is_some() && self.reply_to().is_none()
    }

    /// Returns the body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Returns the body as UTF-8 text, if it is.
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Replaces the body.
    pub fn set_body(&mut self, body: impl Into<Vec<u8>>) {
        self.body = body.into();
    }

    /// Consumes the message, returning its body.
    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message[")?;
        for (index, (key, value)) in self.metadata.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        match self.body_str() {
            Some(text) => write!(f, "; body=\"{text}\"]"),
            None => write!(f, "; body={} bytes]", self.body.len()),
        }
    }
}
