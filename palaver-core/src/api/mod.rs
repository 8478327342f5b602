// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Client API Layer
//!
//! High-level API for the Palaver relay protocol engine.
//!
//! # Overview
//!
//! The API layer provides the composition root that coordinates:
//! - The single connection manager and its reconnection supervisor
//! - The friend, messaging, group, and call engines
//! - Presence tracking
//! - Event handling
//!
//! # Example
//!
//! ```ignore
//! use palaver_core::api::{ClientConfig, PalaverClient};
//! use palaver_core::crypto::MockCryptoService;
//! use palaver_core::network::MockTransport;
//!
//! let identity = MockCryptoService::generate_identity("Alice");
//! let config = ClientConfig::new(identity, "wss://relay.example.com")
//!     .with_fallback_relay("wss://relay-2.example.com");
//! let mut client = PalaverClient::new(config, MockTransport::new(), MockCryptoService::new())?;
//!
//! client.add_event_handler(|event| println!("event: {event:?}"));
//! client.connect(Instant::now())?;
//! ```
//!
//! # Module Structure
//!
//! - [`error`] - Error types for the API layer
//! - [`config`] - Configuration types
//! - [`events`] - Event system for callbacks
//! - [`client`] - Main client orchestrator

#[cfg(feature = "testing")]
pub mod client;
#[cfg(not(feature = "testing"))]
mod client;

#[cfg(feature = "testing")]
pub mod config;
#[cfg(not(feature = "testing"))]
mod config;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod events;
#[cfg(not(feature = "testing"))]
mod events;

// Error types
pub use error::{ClientError, ClientResult};

// Configuration
pub use config::ClientConfig;

// Events
pub use events::{CallbackHandler, ClientEvent, EventDispatcher, EventHandler};

// Client orchestrator
pub use client::{ConnectionStatus, PalaverClient};
