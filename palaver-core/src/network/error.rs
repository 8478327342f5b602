// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Error Types
//!
//! Error taxonomy for the transport and connection layers.

use thiserror::Error;

/// Errors produced by transports, the connection manager, and the
/// reconnection manager.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Could not establish a connection to the relay.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation requires a connection but none is open.
    #[error("not connected")]
    NotConnected,

    /// The relay closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be decoded. The connection stays open; the frame
    /// is dropped by the caller.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The relay rejected our registration.
    #[error("registration failed: {0}")]
    RegistrationFailed(String),

    /// The relay reported an error frame.
    #[error("relay error: {0}")]
    RelayError(String),

    /// All reconnection attempts across the server pool are exhausted.
    #[error("reconnection attempts exhausted")]
    ReconnectExhausted,
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;
