// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire Frames
//!
//! Transport-level JSON frames exchanged with the relay server. Every frame
//! is a JSON object tagged with `type`. Application payloads travel opaquely
//! inside `send`/`message` frames as JSON-encoded envelopes.
//!
//! Must match the relay server's frame enums.

use serde::{Deserialize, Serialize};

use super::error::{NetworkError, NetworkResult};

/// Frames sent from client to relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Announce our DID after the socket opens.
    Register { did: String },
    /// Deliver an envelope to a peer (relayed, buffered if offline).
    Send { to_did: String, payload: String },
    /// Request replay of messages queued while we were offline.
    FetchOffline,
    /// Keep-alive probe.
    Ping,
}

/// Frames received from the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Registration acknowledged; the session is usable.
    Registered { did: String },
    /// An envelope from a peer.
    Message { from_did: String, payload: String },
    /// Transport-level acknowledgment that a `send` reached the relay.
    Ack { id: String },
    /// Keep-alive reply.
    Pong,
    /// Relay-side error report. Informational; the connection stays open
    /// unless the relay closes it.
    Error { message: String },
    /// Batch of messages buffered while we were offline.
    OfflineMessages { messages: Vec<OfflineMessage> },
    /// Unknown frame type (forward compatibility: ignore, never crash).
    #[serde(other)]
    Unknown,
}

/// A single buffered message replayed by the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfflineMessage {
    pub id: String,
    pub from_did: String,
    pub payload: String,
    pub timestamp: i64,
}

/// Encode a client frame as a JSON string for the wire.
pub fn encode_client_frame(frame: &ClientFrame) -> NetworkResult<String> {
    serde_json::to_string(frame).map_err(|e| NetworkError::SendFailed(e.to_string()))
}

/// Decode a relay frame from wire text.
///
/// Structurally invalid JSON is an error; a structurally valid frame with an
/// unrecognized `type` decodes as [`ServerFrame::Unknown`].
pub fn decode_server_frame(text: &str) -> NetworkResult<ServerFrame> {
    serde_json::from_str(text).map_err(|e| NetworkError::InvalidFrame(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_frame_register_serializes_with_type_tag() {
        let frame = ClientFrame::Register {
            did: "did:key:z6MkAlice".to_string(),
        };
        let json = encode_client_frame(&frame).unwrap();
        assert!(json.contains("\"type\":\"register\""));
        assert!(json.contains("did:key:z6MkAlice"));
    }

    #[test]
    fn server_frame_registered_round_trips() {
        let json = r#"{"type":"registered","did":"did:key:z6MkAlice"}"#;
        let frame = decode_server_frame(json).unwrap();
        match frame {
            ServerFrame::Registered { did } => assert_eq!(did, "did:key:z6MkAlice"),
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn server_frame_offline_messages_decodes() {
        let json = r#"{"type":"offline_messages","messages":[{"id":"m1","from_did":"did:key:z6MkBob","payload":"{}","timestamp":1000}]}"#;
        let frame = decode_server_frame(json).unwrap();
        match frame {
            ServerFrame::OfflineMessages { messages } => {
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0].id, "m1");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn unknown_server_frame_type_is_tolerated() {
        let json = r#"{"type":"quantum_entangle","qubits":7}"#;
        let frame = decode_server_frame(json).unwrap();
        assert!(matches!(frame, ServerFrame::Unknown));
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(decode_server_frame("not json at all").is_err());
    }
}
