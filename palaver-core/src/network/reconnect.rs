// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reconnection Manager
//!
//! Supervises the connection manager's lifecycle: schedules retries with
//! exponential backoff and jitter, cycles through an ordered pool of
//! candidate servers, and stops after exhausting the pool until an explicit
//! trigger (user connect or app foregrounding) resumes it.
//!
//! The manager is an explicit state machine driven by caller-supplied
//! `Instant`s; it never sleeps or spawns timers itself, so it is fully
//! testable without real time.

use std::time::{Duration, Instant};

use rand::Rng;

use super::error::{NetworkError, NetworkResult};

/// Backoff and failover tuning.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Base delay for exponential backoff (milliseconds).
    pub base_delay_ms: u64,
    /// Upper bound on the un-jittered delay (milliseconds).
    pub max_delay_ms: u64,
    /// Attempts against one server before moving to the next in the pool.
    pub attempts_per_server: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            attempts_per_server: 5,
        }
    }
}

/// Reconnection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectState {
    /// Nothing scheduled (never connected, or intentionally disconnected).
    Idle,
    /// Waiting for the backoff delay of the given attempt to elapse.
    BackingOff { until: Instant, attempt: u32 },
    /// An attempt is in flight. New attempts are short-circuited.
    Connecting,
    /// Registered with a relay.
    Connected,
    /// The whole pool has been tried `attempts_per_server` times each.
    /// Only an explicit trigger resumes scheduling.
    Exhausted,
}

/// Outcome of reporting a lost connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LossOutcome {
    /// A retry was scheduled after this delay.
    Scheduled { delay: Duration, attempt: u32 },
    /// The pool is exhausted; the peer is offline until retriggered.
    Exhausted,
    /// The disconnect was intentional; nothing is scheduled.
    Suppressed,
}

/// Singleton backoff/failover controller for one client process.
pub struct ReconnectManager {
    config: ReconnectConfig,
    servers: Vec<String>,
    state: ReconnectState,
    /// Index of the next attempt (0-based, monotonic until reset).
    attempt: u32,
    /// Set by an intentional disconnect; suppresses all scheduling until the
    /// next explicit connect.
    suppressed: bool,
}

impl ReconnectManager {
    /// Create a manager over an ordered server pool (primary first).
    pub fn new(servers: Vec<String>, config: ReconnectConfig) -> NetworkResult<Self> {
        if servers.is_empty() {
            return Err(NetworkError::ConnectionFailed(
                "at least one relay URL is required".into(),
            ));
        }
        Ok(ReconnectManager {
            config,
            servers,
            state: ReconnectState::Idle,
            attempt: 0,
            suppressed: false,
        })
    }

    pub fn state(&self) -> &ReconnectState {
        &self.state
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.state, ReconnectState::Exhausted)
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }

    /// Index of the next attempt.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Pool index the next attempt will target.
    pub fn server_index(&self) -> usize {
        let index = (self.attempt / self.config.attempts_per_server) as usize;
        index.min(self.servers.len() - 1)
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    fn max_attempts(&self) -> u32 {
        self.config.attempts_per_server * self.servers.len() as u32
    }

    /// Backoff delay for an attempt: `min(base * 2^attempt, max) * jitter`
    /// with jitter uniform in [0.8, 1.2].
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
            .min(self.config.max_delay_ms);
        let jitter: f64 = rand::thread_rng().gen_range(0.8..=1.2);
        Duration::from_millis((exp as f64 * jitter) as u64)
    }

    /// Explicit user/API connect. Clears suppression, resets counters, and
    /// claims the in-flight slot. Returns the URL to attempt (the primary).
    pub fn connect_requested(&mut self) -> String {
        self.suppressed = false;
        self.attempt = 0;
        let url = self.servers[0].clone();
        self.state = ReconnectState::Connecting;
        self.attempt = 1;
        url
    }

    /// Explicit user/API disconnect: suppress all scheduling until the next
    /// `connect_requested`.
    pub fn intentional_disconnect(&mut self) {
        self.suppressed = true;
        self.attempt = 0;
        self.state = ReconnectState::Idle;
    }

    /// Report a successful registration: resets backoff to the primary.
    pub fn on_registered(&mut self) {
        self.attempt = 0;
        self.state = ReconnectState::Connected;
    }

    /// Report a lost connection or a failed attempt.
    pub fn on_connection_lost(&mut self, now: Instant) -> LossOutcome {
        if self.suppressed {
            self.state = ReconnectState::Idle;
            return LossOutcome::Suppressed;
        }
        if self.attempt >= self.max_attempts() {
            tracing::warn!(
                attempts = self.attempt,
                servers = self.servers.len(),
                "reconnection attempts exhausted"
            );
            self.state = ReconnectState::Exhausted;
            return LossOutcome::Exhausted;
        }
        let attempt = self.attempt;
        let delay = self.compute_delay(attempt);
        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        self.state = ReconnectState::BackingOff {
            until: now + delay,
            attempt,
        };
        LossOutcome::Scheduled { delay, attempt }
    }

    /// If a scheduled retry is due, claim the in-flight slot and return the
    /// URL to attempt. Only one attempt may be in flight at a time; while
    /// `Connecting` or `Connected` this returns `None`.
    pub fn poll_due(&mut self, now: Instant) -> Option<String> {
        match self.state {
            ReconnectState::BackingOff { until, .. } if now >= until => {
                let url = self.servers[self.server_index()].clone();
                self.attempt += 1;
                self.state = ReconnectState::Connecting;
                Some(url)
            }
            _ => None,
        }
    }

    /// App returned to the foreground. If the connection is not up and the
    /// disconnect was not intentional, reset backoff and schedule an
    /// immediate attempt. Returns true if an attempt was scheduled.
    pub fn on_foreground(&mut self, now: Instant) -> bool {
        if self.suppressed || matches!(self.state, ReconnectState::Connected | ReconnectState::Connecting) {
            return false;
        }
        self.attempt = 0;
        self.state = ReconnectState::BackingOff {
            until: now,
            attempt: 0,
        };
        true
    }
}
