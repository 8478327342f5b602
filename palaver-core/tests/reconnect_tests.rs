// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the reconnection manager driving a live client: automatic
//! recovery, exhaustion, foreground triggers, and backoff bounds.

mod common;

use std::time::{Duration, Instant};

use common::{build_client, connect, record_events};
use palaver_core::api::ClientEvent;
use palaver_core::network::{
    NetworkError, ReconnectConfig, ReconnectManager, SessionState, SocketState,
};
use proptest::prelude::*;

#[test]
fn test_client_reconnects_after_socket_drop() {
    let t0 = Instant::now();
    let (_id, mut a) = build_client("Alice", false);
    connect(&mut a, t0);
    assert_eq!(a.transport_mut().connect_count(), 1);

    // Socket dies under us.
    a.transport_mut().set_state(SocketState::Disconnected);
    a.poll(t0).unwrap();
    assert!(!a.is_ready());

    // Backoff for attempt 0 is at most base * 1.2 = 12ms; well due by 100ms.
    a.poll(t0 + Duration::from_millis(100)).unwrap();
    assert!(a.is_ready(), "client should re-register automatically");
    assert_eq!(a.transport_mut().connect_count(), 2);
}

#[test]
fn test_exhaustion_surfaces_offline_and_foreground_recovers() {
    let t0 = Instant::now();
    let (_id, mut a) = build_client("Alice", false);
    let events = record_events(&mut a);
    connect(&mut a, t0);

    a.transport_mut().set_state(SocketState::Disconnected);
    a.poll(t0).unwrap();

    // Two attempts per server, one server: fail both.
    let mut now = t0;
    for _ in 0..2 {
        now += Duration::from_millis(500);
        a.transport_mut()
            .inject_error(NetworkError::ConnectionFailed("refused".into()));
        a.poll(now).unwrap();
    }
    assert!(events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ClientEvent::ReconnectionExhausted)));
    assert_eq!(a.status().session, SessionState::Disconnected);

    // Exhausted: no further attempts, however long we wait.
    let connects = a.transport_mut().connect_count();
    a.poll(now + Duration::from_secs(3600)).unwrap();
    assert_eq!(a.transport_mut().connect_count(), connects);

    // Foregrounding resets backoff and schedules a zero-delay attempt.
    now += Duration::from_secs(1);
    a.resume(now);
    a.poll(now).unwrap();
    assert!(a.is_ready());
}

#[test]
fn test_intentional_disconnect_suppresses_reconnection() {
    let t0 = Instant::now();
    let (_id, mut a) = build_client("Alice", false);
    connect(&mut a, t0);

    a.disconnect().unwrap();
    let connects = a.transport_mut().connect_count();

    // Neither time nor foregrounding revives a deliberate disconnect.
    a.poll(t0 + Duration::from_secs(60)).unwrap();
    a.resume(t0 + Duration::from_secs(61));
    a.poll(t0 + Duration::from_secs(62)).unwrap();
    assert_eq!(a.transport_mut().connect_count(), connects);
    assert!(a.status().intentional_disconnect);

    // An explicit connect clears the suppression.
    a.connect(t0 + Duration::from_secs(63)).unwrap();
    a.poll(t0 + Duration::from_secs(63)).unwrap();
    assert!(a.is_ready());
}

#[test]
fn test_registration_resets_attempt_counter() {
    let t0 = Instant::now();
    let (_id, mut a) = build_client("Alice", false);
    connect(&mut a, t0);

    // One failed cycle, then a successful one.
    a.transport_mut().set_state(SocketState::Disconnected);
    a.poll(t0).unwrap();
    a.poll(t0 + Duration::from_millis(100)).unwrap();
    assert!(a.is_ready());
    assert_eq!(a.status().reconnect_attempt, 0);
    assert_eq!(a.status().server_index, 0);
}

proptest! {
    /// Delay for attempt n stays within [base*2^n*0.8, min(base*2^n, max)*1.2].
    #[test]
    fn prop_backoff_delay_within_bounds(
        base in 1u64..10_000,
        max_factor in 1u64..64,
        attempt in 0u32..20,
    ) {
        let max = base.saturating_mul(max_factor);
        let manager = ReconnectManager::new(
            vec!["ws://relay.test".to_string()],
            ReconnectConfig {
                base_delay_ms: base,
                max_delay_ms: max,
                attempts_per_server: 5,
            },
        )
        .unwrap();

        let raw = base
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX))
            .min(max);
        let delay = manager.compute_delay(attempt).as_millis() as u64;
        let low = ((raw as f64) * 0.8) as u64;
        let high = ((raw as f64) * 1.2) as u64 + 1;
        prop_assert!(
            delay >= low && delay <= high,
            "attempt {} base {} max {}: delay {} outside [{}, {}]",
            attempt, base, max, delay, low, high
        );
    }
}
