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

//! JSON envelope carrying a message's metadata and body over a network
//! broker.

use super::SessionError;
use crate::message::Message;

/// Encodes `message` for the wire.
pub(crate) fn encode(message: &Message) -> Result<Vec<u8>, SessionError> {
    Ok(serde_json::to_vec(message)?)
}

/// Decodes a payload received on `address`.
///
/// A message without a `TO` address is addressed to where it arrived.
pub(crate) fn decode(address: &str, payload: &[u8]) -> Result<Message, SessionError> {
    let mut message: Message = serde_json::from_slice(payload)?;
    if message.to().is_none() {
        message.set_to(address);
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{CORRELATION_ID, TO};

    #[test]
    fn test_envelope_keeps_metadata() {
        let message = Message::new("QUERY").with(CORRELATION_ID, "abc").with(TO, "/queueTest");
        let payload = encode(&message).unwrap();
        let decoded = decode("/queueTest", &payload).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_fills_missing_address() {
        let payload = encode(&Message::new("x")).unwrap();
        let decoded = decode("/topicTest", &payload).unwrap();
        assert_eq!(decoded.to(), Some("/topicTest"));
    }

    #[test]
    fn test_decode_rejects_foreign_payload() {
        let error = decode("/t", b"plain text").unwrap_err();
        assert!(matches!(error, SessionError::Encoding(_)));
    }
}
