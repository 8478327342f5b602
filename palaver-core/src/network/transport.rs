//! Transport Trait
//!
//! Platform-agnostic abstraction for the relay connection.

use super::error::NetworkError;
use super::frame::{ClientFrame, ServerFrame};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, NetworkError>;

/// Socket-level connection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketState {
    /// Not connected to any server.
    Disconnected,
    /// Connection in progress.
    Connecting,
    /// Connected and ready for frames.
    Connected,
}

/// Configuration for a single transport connection.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Server URL/address (ws:// or wss://).
    pub server_url: String,
    /// Connection timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read/write timeout in milliseconds.
    pub io_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            server_url: String::new(),
            connect_timeout_ms: 10_000,
            io_timeout_ms: 30_000,
        }
    }
}

impl TransportConfig {
    /// Creates a config for the given server URL with default timeouts.
    pub fn for_url(server_url: &str) -> Self {
        TransportConfig {
            server_url: server_url.to_string(),
            ..Default::default()
        }
    }
}

/// Transport trait for relay communication.
///
/// Abstracts the underlying mechanism (WebSocket, in-memory pair, ...) so the
/// connection manager can be exercised without real sockets.
///
/// # Synchronous Interface
///
/// Methods are synchronous for simplicity in the core library. Platform
/// implementations may internally use async runtimes but expose a blocking
/// interface here. `receive` must not block indefinitely: it returns
/// `Ok(None)` when no frame is currently available.
pub trait Transport: Send {
    /// Connects to the relay server.
    fn connect(&mut self, config: &TransportConfig) -> TransportResult<()>;

    /// Disconnects from the relay server. Safe to call when not connected.
    fn disconnect(&mut self) -> TransportResult<()>;

    /// Returns the current socket state.
    fn state(&self) -> SocketState;

    /// Sends one frame to the relay.
    ///
    /// The implementation must write the frame atomically with respect to
    /// other `send` calls on the same transport (no interleaved partial
    /// writes).
    fn send(&mut self, frame: &ClientFrame) -> TransportResult<()>;

    /// Receives the next frame from the relay, if one is available.
    fn receive(&mut self) -> TransportResult<Option<ServerFrame>>;

    /// Checks if there are frames waiting to be received (non-blocking).
    fn has_pending(&self) -> bool;
}
