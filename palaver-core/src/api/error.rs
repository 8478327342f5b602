// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Error Types
//!
//! Unified error type for the client API layer.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::friends::FriendError;
use crate::groups::GroupError;
use crate::messaging::MessagingError;
use crate::network::{EnvelopeError, NetworkError};

/// Unified error type for client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Network operation failed.
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// Envelope encode/decode failed.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// Friend engine operation failed.
    #[error("friend error: {0}")]
    Friend(#[from] FriendError),

    /// Messaging operation failed.
    #[error("messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Group operation failed.
    #[error("group error: {0}")]
    Group(#[from] GroupError),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid operation in current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
