// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for group creation, fan-out, and key rotation on removal.

mod common;

use std::time::Instant;

use common::{befriend, build_client, connect, record_events, TestRelay};
use palaver_core::api::ClientEvent;
use palaver_core::network::{Envelope, EnvelopePayload, ServerFrame};

/// Admin plus two accepted members, all pumped to a settled state.
fn trio() -> (
    TestRelay,
    Instant,
    (palaver_core::crypto::Identity, common::TestClient),
    (palaver_core::crypto::Identity, common::TestClient),
    (palaver_core::crypto::Identity, common::TestClient),
    String,
) {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", true);
    let (c_id, mut c) = build_client("Carol", true);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);
    connect(&mut c, now);
    befriend(&mut relay, now, (&a_id.did, &mut a), (&b_id.did, &mut b));
    befriend(&mut relay, now, (&a_id.did, &mut a), (&c_id.did, &mut c));

    let group_id = a.create_group("trio").unwrap();
    let mut clients = [
        (a_id.did.as_str(), &mut a),
        (b_id.did.as_str(), &mut b),
        (c_id.did.as_str(), &mut c),
    ];
    relay.run(now, &mut clients);

    let b_invite = b.pending_group_invites()[0].invite_id.clone();
    b.accept_group_invite(&b_invite).unwrap();
    let c_invite = c.pending_group_invites()[0].invite_id.clone();
    c.accept_group_invite(&c_invite).unwrap();
    let mut clients = [
        (a_id.did.as_str(), &mut a),
        (b_id.did.as_str(), &mut b),
        (c_id.did.as_str(), &mut c),
    ];
    relay.run(now, &mut clients);

    (relay, now, (a_id, a), (b_id, b), (c_id, c), group_id)
}

#[test]
fn test_create_invite_accept() {
    let (_relay, _now, (_a_id, a), (_b_id, b), (_c_id, c), group_id) = trio();

    let group_a = a.group(&group_id).unwrap();
    assert_eq!(group_a.members.len(), 3);
    assert_eq!(group_a.key_version, 1);

    let group_b = b.group(&group_id).unwrap();
    let group_c = c.group(&group_id).unwrap();
    assert_eq!(group_b.key_version, 1);
    assert_eq!(group_c.key_version, 1);
    assert_eq!(group_b.group_name, "trio");
}

#[test]
fn test_fanout_send_reaches_every_member() {
    let (mut relay, now, (a_id, mut a), (b_id, mut b), (c_id, mut c), group_id) = trio();
    let b_events = record_events(&mut b);
    let c_events = record_events(&mut c);

    a.send_group_message(&group_id, "hello group").unwrap();
    let mut clients = [
        (a_id.did.as_str(), &mut a),
        (b_id.did.as_str(), &mut b),
        (c_id.did.as_str(), &mut c),
    ];
    relay.run(now, &mut clients);

    for events in [&b_events, &c_events] {
        assert!(events.lock().unwrap().iter().any(|e| matches!(
            e,
            ClientEvent::GroupMessageReceived { message }
                if message.content == "hello group" && message.sender_did == a_id.did
        )));
    }
}

#[test]
fn test_decline_never_creates_local_state() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", true);
    let a_events = record_events(&mut a);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);
    befriend(&mut relay, now, (&a_id.did, &mut a), (&b_id.did, &mut b));

    let group_id = a.create_group("duo").unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);

    let invite_id = b.pending_group_invites()[0].invite_id.clone();
    b.decline_group_invite(&invite_id).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);

    assert!(b.group(&group_id).is_none());
    assert!(b.pending_group_invites().is_empty());
    assert!(!a.group(&group_id).unwrap().is_member(&b_id.did));
    assert!(a_events.lock().unwrap().iter().any(|e| matches!(
        e,
        ClientEvent::GroupInviteDeclined { member_did, .. } if member_did == &b_id.did
    )));
}

#[test]
fn test_remove_member_rotates_key_and_excludes_removed_peer() {
    let (mut relay, now, (a_id, mut a), (b_id, mut b), (c_id, mut c), group_id) = trio();
    let b_events = record_events(&mut b);
    let c_events = record_events(&mut c);

    a.remove_group_member(&group_id, &c_id.did).unwrap();
    let mut clients = [
        (a_id.did.as_str(), &mut a),
        (b_id.did.as_str(), &mut b),
        (c_id.did.as_str(), &mut c),
    ];
    relay.run(now, &mut clients);

    // Remaining members converge on the same, advanced key version.
    assert_eq!(a.group(&group_id).unwrap().key_version, 2);
    assert_eq!(b.group(&group_id).unwrap().key_version, 2);
    assert!(b_events.lock().unwrap().iter().any(|e| matches!(
        e,
        ClientEvent::GroupKeyRotated { key_version: 2, .. }
    )));

    // The removed member learns it is out and never sees the new key.
    assert!(c.group(&group_id).is_none());
    let c_log = c_events.lock().unwrap();
    assert!(c_log
        .iter()
        .any(|e| matches!(e, ClientEvent::RemovedFromGroup { .. })));
    assert!(!c_log
        .iter()
        .any(|e| matches!(e, ClientEvent::GroupKeyRotated { .. })));
    drop(c_log);

    // Messages under the rotated key reach remaining members only.
    a.send_group_message(&group_id, "after rotation").unwrap();
    let mut clients = [
        (a_id.did.as_str(), &mut a),
        (b_id.did.as_str(), &mut b),
        (c_id.did.as_str(), &mut c),
    ];
    relay.run(now, &mut clients);
    assert!(b_events.lock().unwrap().iter().any(|e| matches!(
        e,
        ClientEvent::GroupMessageReceived { message } if message.content == "after rotation"
    )));
    assert!(!c_events.lock().unwrap().iter().any(|e| matches!(
        e,
        ClientEvent::GroupMessageReceived { message } if message.content == "after rotation"
    )));
}

#[test]
fn test_stale_key_version_message_is_dropped() {
    let (mut relay, now, (a_id, mut a), (b_id, mut b), (c_id, mut c), group_id) = trio();
    let b_events = record_events(&mut b);

    // Rotate by removing Carol; version moves to 2.
    a.remove_group_member(&group_id, &c_id.did).unwrap();
    let mut clients = [
        (a_id.did.as_str(), &mut a),
        (b_id.did.as_str(), &mut b),
        (c_id.did.as_str(), &mut c),
    ];
    relay.run(now, &mut clients);
    b_events.lock().unwrap().clear();

    // A message still encrypted under version 1 must not surface.
    let stale = palaver_core::network::GroupMessagePayload {
        message_id: "stale-1".to_string(),
        group_id: group_id.clone(),
        sender_did: a_id.did.clone(),
        ciphertext: palaver_core::network::encode_bytes(b"old-key-data"),
        nonce: palaver_core::network::encode_bytes(&[0u8; 12]),
        key_version: 1,
        timestamp: 1,
    };
    b.transport_mut().queue_receive(ServerFrame::Message {
        from_did: a_id.did.clone(),
        payload: Envelope::new(&EnvelopePayload::GroupMessage(stale))
            .unwrap()
            .to_wire()
            .unwrap(),
    });
    b.poll(now).unwrap();

    assert!(!b_events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ClientEvent::GroupMessageReceived { .. })));
}

#[test]
fn test_non_admin_cannot_remove_members() {
    let (_relay, _now, (_a_id, _a), (_b_id, mut b), (c_id, _c), group_id) = trio();
    assert!(b.remove_group_member(&group_id, &c_id.did).is_err());
}
