//! Tests for the registration sequence, presence tracking, and
//! frame-level robustness of a live client.

mod common;

use std::time::{Duration, Instant};

use common::{befriend, build_client, connect, record_events, TestRelay};
use palaver_core::api::ClientEvent;
use palaver_core::network::{
    ClientFrame, Envelope, EnvelopePayload, PresencePayload, ServerFrame, SessionState,
    SocketState,
};

#[test]
fn test_registration_sequence_and_post_registration_actions() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", true);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);
    befriend(&mut relay, now, (&a_id.did, &mut a), (&b_id.did, &mut b));

    // Reconnect Alice and inspect the raw frame sequence before routing.
    a.disconnect().unwrap();
    a.transport_mut().clear_sent();
    a.connect(now).unwrap();
    a.poll(now).unwrap();

    let frames = a.transport_mut().sent_frames().to_vec();
    let register = frames
        .iter()
        .position(|f| matches!(f, ClientFrame::Register { did } if did == &a_id.did))
        .expect("register frame");
    let fetch = frames
        .iter()
        .position(|f| matches!(f, ClientFrame::FetchOffline))
        .expect("offline replay request");
    let presence = frames
        .iter()
        .position(|f| match f {
            ClientFrame::Send { to_did, payload } => {
                to_did == &b_id.did && payload.contains("presence_online")
            }
            _ => false,
        })
        .expect("presence broadcast to every known friend");
    assert!(register < fetch && fetch < presence);

    let status = a.status();
    assert_eq!(status.session, SessionState::Ready);
    assert_eq!(status.connected_url.as_deref(), Some("ws://relay-test.local"));
    assert_eq!(status.registered_did.as_deref(), Some(a_id.did.as_str()));
}

#[test]
fn test_presence_online_gets_acked_and_tracked() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", true);
    let b_events = record_events(&mut b);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);
    befriend(&mut relay, now, (&a_id.did, &mut a), (&b_id.did, &mut b));

    // Alice reconnects; her presence_online reaches Bob, whose ack reaches
    // Alice. Both now see each other as reachable.
    a.disconnect().unwrap();
    a.connect(now).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);

    assert!(b.is_peer_online(&a_id.did));
    assert!(a.is_peer_online(&b_id.did));
    assert!(b_events.lock().unwrap().iter().any(|e| matches!(
        e,
        ClientEvent::PresenceChanged { did, online: true } if did == &a_id.did
    )));
}

#[test]
fn test_presence_cleared_on_any_disconnect() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", true);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);
    befriend(&mut relay, now, (&a_id.did, &mut a), (&b_id.did, &mut b));
    assert!(a.is_peer_online(&b_id.did));

    a.transport_mut().set_state(SocketState::Disconnected);
    a.poll(now).unwrap();
    assert!(a.online_peers().is_empty(), "no stale presence across a drop");
}

#[test]
fn test_keep_alive_pings_on_interval() {
    let t0 = Instant::now();
    let (_id, mut a) = build_client("Alice", false);
    connect(&mut a, t0);
    a.transport_mut().clear_sent();

    // Default interval is 30s; nothing at 10s, a ping by 31s.
    a.poll(t0 + Duration::from_secs(10)).unwrap();
    assert!(!a
        .transport_mut()
        .sent_frames()
        .iter()
        .any(|f| matches!(f, ClientFrame::Ping)));

    a.poll(t0 + Duration::from_secs(31)).unwrap();
    assert!(a
        .transport_mut()
        .sent_frames()
        .iter()
        .any(|f| matches!(f, ClientFrame::Ping)));

    // Suspended (backgrounded): the interval elapses without a ping and the
    // connection stays open.
    a.transport_mut().clear_sent();
    a.suspend();
    a.poll(t0 + Duration::from_secs(120)).unwrap();
    assert!(!a
        .transport_mut()
        .sent_frames()
        .iter()
        .any(|f| matches!(f, ClientFrame::Ping)));
    assert!(a.is_ready());
}

#[test]
fn test_relay_error_frame_surfaces_as_event() {
    let now = Instant::now();
    let (_id, mut a) = build_client("Alice", false);
    let events = record_events(&mut a);
    connect(&mut a, now);

    a.transport_mut().queue_receive(ServerFrame::Error {
        message: "rate limited".to_string(),
    });
    a.poll(now).unwrap();

    assert!(events.lock().unwrap().iter().any(|e| matches!(
        e,
        ClientEvent::RelayError { message } if message == "rate limited"
    )));
    assert!(a.is_ready(), "error frames do not close the connection");
}

#[test]
fn test_unknown_envelope_kind_is_ignored() {
    let now = Instant::now();
    let (_id, mut a) = build_client("Alice", false);
    connect(&mut a, now);

    let envelope = Envelope {
        kind: "time_travel_request".to_string(),
        version: 1,
        payload: serde_json::json!({"year": 1985}),
    };
    a.transport_mut().queue_receive(ServerFrame::Message {
        from_did: "did:key:z6MkDoc".to_string(),
        payload: envelope.to_wire().unwrap(),
    });
    a.poll(now).unwrap();
    assert!(a.is_ready(), "unknown kinds never take down the connection");
}

#[test]
fn test_malformed_envelope_is_dropped_not_fatal() {
    let now = Instant::now();
    let (_id, mut a) = build_client("Alice", false);
    connect(&mut a, now);

    a.transport_mut().queue_receive(ServerFrame::Message {
        from_did: "did:key:z6MkEve".to_string(),
        payload: "{not valid json".to_string(),
    });
    a.poll(now).unwrap();
    assert!(a.is_ready());
}

#[test]
fn test_community_invites_republished_on_registration() {
    let now = Instant::now();
    let (a_id, mut a) = build_client("Alice", false);
    let (b_id, mut b) = build_client("Bob", true);
    let b_events = record_events(&mut b);
    let mut relay = TestRelay::new();
    connect(&mut a, now);
    connect(&mut b, now);
    befriend(&mut relay, now, (&a_id.did, &mut a), (&b_id.did, &mut b));

    a.publish_community_invite(serde_json::json!({
        "community_id": "c-1",
        "invite_code": "JOIN-ME",
    }));
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);
    let first = b_events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ClientEvent::CommunityEvent { .. }))
        .count();
    assert_eq!(first, 1);

    // A reconnect republishes the active invite code.
    a.disconnect().unwrap();
    a.connect(now).unwrap();
    let mut clients = [(a_id.did.as_str(), &mut a), (b_id.did.as_str(), &mut b)];
    relay.run(now, &mut clients);
    let second = b_events
        .lock()
        .unwrap()
        .iter()
        .filter(|e| matches!(e, ClientEvent::CommunityEvent { .. }))
        .count();
    assert_eq!(second, 2);
}

#[test]
fn test_presence_ack_payload_shape() {
    // presence_ack mirrors presence_online on the wire.
    let payload = EnvelopePayload::PresenceAck(PresencePayload {
        did: "did:key:z6MkAlice".to_string(),
        timestamp: 1_700_000_000,
    });
    let envelope = Envelope::new(&payload).unwrap();
    assert_eq!(envelope.kind, "presence_ack");
    assert_eq!(envelope.version, 1);
}
