#![allow(dead_code)] // not every test binary uses every helper

//! Shared test harness: an in-memory relay shuttling frames between clients.
//!
//! The relay buffers messages for unreachable peers and *redelivers* the
//! whole buffer on every `fetch_offline`, deliberately exercising the
//! receiver-side dedup the protocol requires.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use palaver_core::api::{ClientConfig, ClientEvent, PalaverClient};
use palaver_core::crypto::{Identity, MockCryptoService};
use palaver_core::network::{
    ClientFrame, MockTransport, OfflineMessage, ReconnectConfig, ServerFrame,
};

pub type TestClient = PalaverClient<MockTransport, MockCryptoService>;

/// Fast backoff so tests never need real waiting.
pub fn test_reconnect_config() -> ReconnectConfig {
    ReconnectConfig {
        base_delay_ms: 10,
        max_delay_ms: 100,
        attempts_per_server: 2,
    }
}

/// Build a client with a fresh random identity.
pub fn build_client(display_name: &str, auto_accept: bool) -> (Identity, TestClient) {
    let identity = MockCryptoService::generate_identity(display_name);
    let config = ClientConfig::new(identity.clone(), "ws://relay-test.local")
        .with_reconnect(test_reconnect_config())
        .with_auto_accept_friends(auto_accept);
    let client = PalaverClient::new(config, MockTransport::new(), MockCryptoService::new())
        .expect("client construction");
    (identity, client)
}

/// Attach an event recorder and return the shared log.
pub fn record_events(client: &mut TestClient) -> Arc<Mutex<Vec<ClientEvent>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    client.add_event_handler(move |event| sink.lock().unwrap().push(event));
    log
}

/// In-memory relay: routes `send` frames, buffers for offline peers, and
/// redelivers the buffer on `fetch_offline`.
#[derive(Default)]
pub struct TestRelay {
    offline: HashMap<String, Vec<OfflineMessage>>,
    next_id: u64,
}

impl TestRelay {
    pub fn new() -> Self {
        TestRelay::default()
    }

    /// One routing pass: drain every client's outbound frames and deliver
    /// them. Does not poll the clients; callers pump with [`run`].
    pub fn route(&mut self, clients: &mut [(&str, &mut TestClient)]) {
        // Drain first so delivery order follows send order per client.
        let mut outbound: Vec<(String, ClientFrame)> = Vec::new();
        for (did, client) in clients.iter_mut() {
            let frames = client.transport_mut().sent_frames().to_vec();
            client.transport_mut().clear_sent();
            for frame in frames {
                outbound.push((did.to_string(), frame));
            }
        }

        for (from_did, frame) in outbound {
            match frame {
                ClientFrame::Send { to_did, payload } => {
                    let reachable = clients
                        .iter_mut()
                        .find(|(did, _)| *did == to_did)
                        .filter(|(_, c)| c.is_ready());
                    match reachable {
                        Some((_, client)) => {
                            client.transport_mut().queue_receive(ServerFrame::Message {
                                from_did: from_did.clone(),
                                payload,
                            });
                        }
                        None => {
                            self.next_id += 1;
                            self.offline.entry(to_did).or_default().push(OfflineMessage {
                                id: format!("off-{}", self.next_id),
                                from_did: from_did.clone(),
                                payload,
                                timestamp: self.next_id as i64,
                            });
                        }
                    }
                }
                ClientFrame::FetchOffline => {
                    let messages = self.offline.get(&from_did).cloned().unwrap_or_default();
                    if let Some((_, client)) =
                        clients.iter_mut().find(|(did, _)| *did == from_did)
                    {
                        client
                            .transport_mut()
                            .queue_receive(ServerFrame::OfflineMessages { messages });
                    }
                }
                // register/ping are answered by the mock transport itself.
                ClientFrame::Register { .. } | ClientFrame::Ping => {}
            }
        }
    }

    /// Pump clients and routing for enough rounds to settle any multi-leg
    /// exchange (request/response/ack is three legs; eight rounds leaves
    /// headroom).
    pub fn run(&mut self, now: Instant, clients: &mut [(&str, &mut TestClient)]) {
        for _ in 0..8 {
            for (_, client) in clients.iter_mut() {
                client.poll(now).expect("poll");
            }
            self.route(clients);
        }
        for (_, client) in clients.iter_mut() {
            client.poll(now).expect("poll");
        }
    }
}

/// Connect a client and pump until it is registered and ready.
pub fn connect(client: &mut TestClient, now: Instant) {
    client.connect(now).expect("connect");
    client.poll(now).expect("poll");
    assert!(client.is_ready(), "client should register against the mock");
}

/// Run the full three-leg handshake so `a` and `b` are friends.
/// `b` must have auto-accept enabled.
pub fn befriend(
    relay: &mut TestRelay,
    now: Instant,
    a: (&str, &mut TestClient),
    b: (&str, &mut TestClient),
) {
    let (a_did, a_client) = a;
    let (b_did, b_client) = b;
    a_client
        .send_friend_request(b_did, Some("hello!".to_string()))
        .expect("friend request");
    let mut clients = [(a_did, a_client), (b_did, b_client)];
    relay.run(now, &mut clients);
    assert!(clients[0].1.friend(b_did).is_some(), "a should hold a record");
    assert!(clients[1].1.friend(a_did).is_some(), "b should hold a record");
}
