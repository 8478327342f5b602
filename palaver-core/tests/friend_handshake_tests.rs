// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the three-leg friend handshake.

mod common;

use std::time::Instant;

use common::{build_client, connect, record_events, TestRelay};
use palaver_core::api::ClientEvent;
use palaver_core::network::{Envelope, EnvelopePayload, FriendRequestPayload, ServerFrame};

fn wire(payload: &EnvelopePayload) -> String {
    Envelope::new(payload).unwrap().to_wire().unwrap()
}

#[test]
fn test_handshake_completeness_and_asymmetric_timing() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", true);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);

    a.send_friend_request(&b_id.did, Some("hi".to_string()))
        .unwrap();

    // Leg 1+2: the request reaches Bob, who auto-accepts. The acceptor
    // creates its record *before* the requester has one.
    {
        let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
        relay.route(&mut clients);
    }
    b.poll(now).unwrap();
    assert!(b.friend(&a_id.did).is_some(), "acceptor record exists first");
    assert!(a.friend(&b_id.did).is_none(), "requester record not yet");

    // Leg 3: the response reaches Alice, who creates her record and acks.
    {
        let mut clients = [(b_id.did.as_str(), &mut b), (a_id.did.as_str(), &mut a)];
        relay.route(&mut clients);
    }
    a.poll(now).unwrap();
    let a_record = a.friend(&b_id.did).expect("requester record after response");
    let b_record = b.friend(&a_id.did).unwrap();

    assert_eq!(a_record.conversation_id, b_record.conversation_id);
    assert_eq!(a_record.signing_key, b_id.signing_key);
    assert_eq!(a_record.encryption_key, b_id.encryption_key);
    assert_eq!(b_record.signing_key, a_id.signing_key);
    assert_eq!(b_record.encryption_key, a_id.encryption_key);

    // The ack reaches Bob; it is informational only.
    {
        let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
        relay.route(&mut clients);
    }
    b.poll(now).unwrap();
    assert!(b.friend(&a_id.did).is_some());
}

#[test]
fn test_manual_accept() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", false);
    let b_events = record_events(&mut b);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);

    a.send_friend_request(&b_id.did, None).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);

    let request_id = b_events
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match e {
            ClientEvent::FriendRequestReceived { request_id, from_did, .. }
                if from_did == &a_id.did =>
            {
                Some(request_id.clone())
            }
            _ => None,
        })
        .expect("request event");
    assert!(b.friend(&a_id.did).is_none(), "no record before accepting");

    b.accept_friend_request(&request_id).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);

    assert!(a.friend(&b_id.did).is_some());
    assert!(b.friend(&a_id.did).is_some());
}

#[test]
fn test_rejection_discards_pending_silently() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", false);
    let a_events = record_events(&mut a);
    let b_events = record_events(&mut b);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);

    a.send_friend_request(&b_id.did, None).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);

    let request_id = b_events
        .lock()
        .unwrap()
        .iter()
        .find_map(|e| match e {
            ClientEvent::FriendRequestReceived { request_id, .. } => Some(request_id.clone()),
            _ => None,
        })
        .unwrap();
    b.reject_friend_request(&request_id).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);

    assert!(a.friend(&b_id.did).is_none());
    assert!(b.friend(&a_id.did).is_none());
    assert!(a.pending_friend_requests().is_empty(), "requester pending discarded");
    assert!(a_events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, ClientEvent::FriendRequestDeclined { peer_did } if peer_did == &b_id.did)));
}

#[test]
fn test_mutual_requests_auto_accept_without_human_step() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", false);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);

    a.send_friend_request(&b_id.did, None).unwrap();
    b.send_friend_request(&a_id.did, None).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);

    assert!(a.friend(&b_id.did).is_some());
    assert!(b.friend(&a_id.did).is_some());
}

#[test]
fn test_duplicate_request_is_idempotent_last_write_wins() {
    let now = Instant::now();
    let (_b_id, mut b) = build_client("Bob", false);
    connect(&mut b, now);

    let stranger = palaver_core::crypto::MockCryptoService::generate_identity("Mallory");
    let mut payload = FriendRequestPayload {
        id: "req-1".to_string(),
        from_did: stranger.did.clone(),
        from_display_name: "Mallory".to_string(),
        from_signing_key: stranger.signing_key.clone(),
        from_encryption_key: stranger.encryption_key.clone(),
        message: Some("first".to_string()),
        created_at: 1,
    };
    b.transport_mut().queue_receive(ServerFrame::Message {
        from_did: stranger.did.clone(),
        payload: wire(&EnvelopePayload::FriendRequest(payload.clone())),
    });
    payload.message = Some("second".to_string());
    b.transport_mut().queue_receive(ServerFrame::Message {
        from_did: stranger.did.clone(),
        payload: wire(&EnvelopePayload::FriendRequest(payload)),
    });
    b.poll(now).unwrap();

    let pending = b.pending_friend_requests();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].message.as_deref(), Some("second"));
}

#[test]
fn test_response_without_pending_request_is_a_noop() {
    let now = Instant::now();
    let (_a_id, mut a) = build_client("Alice", false);
    connect(&mut a, now);

    let stranger = palaver_core::crypto::MockCryptoService::generate_identity("Mallory");
    let response = palaver_core::network::FriendResponsePayload {
        request_id: "never-sent".to_string(),
        accepted: true,
        responder_did: stranger.did.clone(),
        responder_display_name: Some("Mallory".to_string()),
        responder_signing_key: Some(stranger.signing_key.clone()),
        responder_encryption_key: Some(stranger.encryption_key.clone()),
    };
    a.transport_mut().queue_receive(ServerFrame::Message {
        from_did: stranger.did.clone(),
        payload: wire(&EnvelopePayload::FriendResponse(response)),
    });
    a.poll(now).unwrap();

    assert!(a.friend(&stranger.did).is_none());
}

#[test]
fn test_lost_ack_leg_is_non_fatal() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", true);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);

    a.send_friend_request(&b_id.did, None).unwrap();
    // Request to Bob, response back to Alice.
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.route(&mut clients);
    b.poll(now).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.route(&mut clients);
    a.poll(now).unwrap();

    // Drop the ack on the floor.
    a.transport_mut().clear_sent();

    assert!(a.friend(&b_id.did).is_some());
    assert!(b.friend(&a_id.did).is_some());
}
