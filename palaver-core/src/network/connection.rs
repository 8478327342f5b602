// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connection Manager
//!
//! Owns the single live relay connection: registration handshake, keep-alive,
//! and the offline-message replay request. There is exactly one manager per
//! client; every component funnels outbound envelopes through it, so frame
//! transmission is serialized by construction.

use std::time::{Duration, Instant};

use super::envelope::Envelope;
use super::error::{NetworkError, NetworkResult};
use super::frame::{ClientFrame, ServerFrame};
use super::transport::{SocketState, Transport, TransportConfig, TransportResult};

/// Session state, layered above the socket state.
///
/// `Registered` is the edge between receiving the relay's acknowledgment and
/// completing the exactly-once post-registration work (offline replay
/// request, presence broadcast, community invite republish); the facade
/// promotes the session to `Ready` once that work is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Registered,
    Ready,
}

/// Connection manager over an injected transport.
pub struct ConnectionManager<T: Transport> {
    transport: T,
    did: String,
    session: SessionState,
    connected_url: Option<String>,
    registered_did: Option<String>,
    keep_alive_interval: Duration,
    last_ping: Option<Instant>,
    /// Backgrounded: keep-alive paused, connection left open.
    suspended: bool,
}

impl<T: Transport> ConnectionManager<T> {
    pub fn new(transport: T, did: String, keep_alive_interval: Duration) -> Self {
        ConnectionManager {
            transport,
            did,
            session: SessionState::Disconnected,
            connected_url: None,
            registered_did: None,
            keep_alive_interval,
            last_ping: None,
            suspended: false,
        }
    }

    pub fn session(&self) -> SessionState {
        self.session
    }

    pub fn is_ready(&self) -> bool {
        self.session == SessionState::Ready
    }

    pub fn is_open(&self) -> bool {
        self.transport.state() == SocketState::Connected
    }

    pub fn connected_url(&self) -> Option<&str> {
        self.connected_url.as_deref()
    }

    pub fn registered_did(&self) -> Option<&str> {
        self.registered_did.as_deref()
    }

    pub fn did(&self) -> &str {
        &self.did
    }

    /// Open the physical connection to `url` and send the registration
    /// frame. Short-circuits if a session is already open or in progress.
    pub fn establish(&mut self, url: &str) -> NetworkResult<()> {
        if self.session != SessionState::Disconnected {
            return Ok(());
        }

        self.session = SessionState::Connecting;
        let config = TransportConfig::for_url(url);
        if let Err(e) = self.transport.connect(&config) {
            self.session = SessionState::Disconnected;
            return Err(e);
        }

        if let Err(e) = self.transport.send(&ClientFrame::Register {
            did: self.did.clone(),
        }) {
            let _ = self.transport.disconnect();
            self.session = SessionState::Disconnected;
            return Err(e);
        }

        self.connected_url = Some(url.to_string());
        tracing::info!(url, "connecting to relay");
        Ok(())
    }

    /// Receive the next frame, intercepting session-level control frames.
    ///
    /// * `registered` on the `Connecting` edge triggers the offline replay
    ///   request and is returned to the caller so it can run the remaining
    ///   post-registration actions exactly once; a duplicate `registered`
    ///   is logged and swallowed.
    /// * `pong` refreshes keep-alive liveness and is swallowed.
    ///
    /// Transport errors propagate; the caller treats any close as a lost
    /// connection.
    pub fn receive(&mut self, now: Instant) -> NetworkResult<Option<ServerFrame>> {
        let frame = match self.transport.receive()? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        match frame {
            ServerFrame::Registered { did } => {
                if self.session != SessionState::Connecting {
                    tracing::warn!(did = %did, "duplicate registration acknowledgment, ignoring");
                    return Ok(None);
                }
                self.session = SessionState::Registered;
                self.registered_did = Some(did.clone());
                self.last_ping = Some(now);
                tracing::info!(did = %did, "registered with relay");

                // Request replay of messages queued while we were offline.
                self.transport.send(&ClientFrame::FetchOffline)?;

                Ok(Some(ServerFrame::Registered { did }))
            }
            ServerFrame::Pong => {
                self.last_ping = Some(now);
                Ok(None)
            }
            other => Ok(Some(other)),
        }
    }

    /// Promote `Registered` to `Ready` after the post-registration actions.
    pub fn mark_ready(&mut self) {
        if self.session == SessionState::Registered {
            self.session = SessionState::Ready;
        }
    }

    /// Send an application envelope to a peer.
    pub fn send_envelope(&mut self, to_did: &str, envelope: &Envelope) -> NetworkResult<()> {
        if !matches!(self.session, SessionState::Registered | SessionState::Ready) {
            return Err(NetworkError::NotConnected);
        }
        let payload = envelope
            .to_wire()
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
        self.transport.send(&ClientFrame::Send {
            to_did: to_did.to_string(),
            payload,
        })
    }

    /// Send a keep-alive ping if one is due. Suspended sessions skip pings
    /// without closing the connection.
    pub fn tick_keep_alive(&mut self, now: Instant) -> NetworkResult<()> {
        if self.session != SessionState::Ready || self.suspended {
            return Ok(());
        }
        let due = match self.last_ping {
            Some(last) => now.duration_since(last) >= self.keep_alive_interval,
            None => true,
        };
        if due {
            self.transport.send(&ClientFrame::Ping)?;
            self.last_ping = Some(now);
        }
        Ok(())
    }

    /// Pause keep-alive (app backgrounded). The connection stays open.
    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Resume keep-alive (app foregrounded).
    pub fn resume(&mut self) {
        self.suspended = false;
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Record a lost connection: reset session bookkeeping. The caller
    /// clears presence and informs the reconnection manager.
    pub fn handle_close(&mut self) {
        let _ = self.transport.disconnect();
        self.session = SessionState::Disconnected;
        self.connected_url = None;
        self.registered_did = None;
        self.last_ping = None;
    }

    /// Close the connection deliberately.
    pub fn disconnect(&mut self) -> TransportResult<()> {
        let was_open = self.is_open();
        self.handle_close();
        if was_open {
            tracing::info!("disconnected from relay");
        }
        Ok(())
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}
