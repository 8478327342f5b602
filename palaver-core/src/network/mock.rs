// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock Transport
//!
//! In-memory transport for tests: captures sent frames, replays queued
//! inbound frames, and injects failures. A scripted relay in miniature.

use std::collections::VecDeque;

use super::error::NetworkError;
use super::frame::{ClientFrame, ServerFrame};
use super::transport::{SocketState, Transport, TransportConfig, TransportResult};

/// Scriptable in-memory transport.
///
/// With `auto_register` enabled (the default) the mock answers a `register`
/// frame with `registered`, like a healthy relay. With `auto_ack` enabled it
/// additionally acknowledges every `send` with an `ack{id}` carrying the
/// envelope's message id when one can be extracted, so the pending-ack queue
/// drains in tests.
pub struct MockTransport {
    state: SocketState,
    sent: Vec<ClientFrame>,
    receive_queue: VecDeque<ServerFrame>,
    injected_error: Option<NetworkError>,
    fail_next_send: bool,
    auto_register: bool,
    auto_ack: bool,
    connect_count: u32,
}

impl MockTransport {
    pub fn new() -> Self {
        MockTransport {
            state: SocketState::Disconnected,
            sent: Vec::new(),
            receive_queue: VecDeque::new(),
            injected_error: None,
            fail_next_send: false,
            auto_register: true,
            auto_ack: false,
            connect_count: 0,
        }
    }

    /// Queue a frame to be returned by `receive`.
    pub fn queue_receive(&mut self, frame: ServerFrame) {
        self.receive_queue.push_back(frame);
    }

    /// Frames sent so far, in order.
    pub fn sent_frames(&self) -> &[ClientFrame] {
        &self.sent
    }

    /// Drop captured sent frames.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Fail the next `connect` call with this error.
    pub fn inject_error(&mut self, error: NetworkError) {
        self.injected_error = Some(error);
    }

    /// Fail the next `send` call with a closed-connection error and drop to
    /// `Disconnected`, simulating a socket that died under us.
    pub fn fail_next_send(&mut self) {
        self.fail_next_send = true;
    }

    /// Control the automatic `register` -> `registered` reply.
    pub fn set_auto_register(&mut self, enabled: bool) {
        self.auto_register = enabled;
    }

    /// Control automatic `ack` replies to `send` frames.
    pub fn set_auto_ack(&mut self, enabled: bool) {
        self.auto_ack = enabled;
    }

    /// Force a socket state, simulating external disconnects.
    pub fn set_state(&mut self, state: SocketState) {
        self.state = state;
    }

    /// Number of successful `connect` calls.
    pub fn connect_count(&self) -> u32 {
        self.connect_count
    }

    /// Extract the `message_id` from a JSON-encoded chat or group message
    /// envelope. Receipts and presence are not acked, mirroring the relay.
    fn message_id_of(payload: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(payload).ok()?;
        match value.get("kind")?.as_str()? {
            "chat_message" | "group_message" => {}
            _ => return None,
        }
        value
            .get("payload")?
            .get("message_id")?
            .as_str()
            .map(|s| s.to_string())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for MockTransport {
    fn connect(&mut self, _config: &TransportConfig) -> TransportResult<()> {
        if let Some(error) = self.injected_error.take() {
            self.state = SocketState::Disconnected;
            return Err(error);
        }
        self.state = SocketState::Connected;
        self.connect_count += 1;
        Ok(())
    }

    fn disconnect(&mut self) -> TransportResult<()> {
        self.state = SocketState::Disconnected;
        Ok(())
    }

    fn state(&self) -> SocketState {
        self.state.clone()
    }

    fn send(&mut self, frame: &ClientFrame) -> TransportResult<()> {
        if self.state != SocketState::Connected {
            return Err(NetworkError::NotConnected);
        }
        if self.fail_next_send {
            self.fail_next_send = false;
            self.state = SocketState::Disconnected;
            return Err(NetworkError::ConnectionClosed);
        }

        match frame {
            ClientFrame::Register { did } if self.auto_register => {
                self.receive_queue
                    .push_back(ServerFrame::Registered { did: did.clone() });
            }
            ClientFrame::Send { payload, .. } if self.auto_ack => {
                if let Some(id) = Self::message_id_of(payload) {
                    self.receive_queue.push_back(ServerFrame::Ack { id });
                }
            }
            ClientFrame::Ping => {
                self.receive_queue.push_back(ServerFrame::Pong);
            }
            _ => {}
        }

        self.sent.push(frame.clone());
        Ok(())
    }

    fn receive(&mut self) -> TransportResult<Option<ServerFrame>> {
        if self.state != SocketState::Connected {
            return Err(NetworkError::NotConnected);
        }
        Ok(self.receive_queue.pop_front())
    }

    fn has_pending(&self) -> bool {
        !self.receive_queue.is_empty()
    }
}
