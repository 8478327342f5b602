// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Client Configuration

use crate::crypto::Identity;
use crate::network::ReconnectConfig;

/// Configuration for a [`PalaverClient`](super::client::PalaverClient).
///
/// The relay pool is ordered: the primary URL first, then fallbacks in the
/// order they should be tried when the primary keeps failing.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The local peer's identity.
    pub identity: Identity,
    /// Relay pool, primary first.
    pub relays: Vec<String>,
    /// Backoff/failover tuning.
    pub reconnect: ReconnectConfig,
    /// Keep-alive ping interval in milliseconds.
    pub keep_alive_interval_ms: u64,
    /// Accept incoming friend requests without a human step.
    pub auto_accept_friends: bool,
}

impl ClientConfig {
    /// Config with a single relay and defaults.
    pub fn new(identity: Identity, primary_relay: &str) -> Self {
        ClientConfig {
            identity,
            relays: vec![primary_relay.to_string()],
            reconnect: ReconnectConfig::default(),
            keep_alive_interval_ms: 30_000,
            auto_accept_friends: false,
        }
    }

    /// Append a fallback relay to the pool.
    pub fn with_fallback_relay(mut self, url: &str) -> Self {
        self.relays.push(url.to_string());
        self
    }

    /// Override the backoff tuning.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Override the keep-alive interval.
    pub fn with_keep_alive_interval_ms(mut self, interval_ms: u64) -> Self {
        self.keep_alive_interval_ms = interval_ms;
        self
    }

    /// Auto-accept incoming friend requests.
    pub fn with_auto_accept_friends(mut self, enabled: bool) -> Self {
        self.auto_accept_friends = enabled;
        self
    }
}
