// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Client Orchestrator
//!
//! The composition root of the protocol engine. One `PalaverClient` owns the
//! single connection manager, the reconnection supervisor, and every
//! protocol engine; application components share it by handle and observe it
//! through the event dispatcher; there is no ambient global state.
//!
//! The client is pumped cooperatively: call [`poll`](PalaverClient::poll) on
//! a timer (or whenever the transport signals readable data). One inbound
//! frame is decoded and dispatched at a time, in arrival order.

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::calls::{self, CallSignal};
use crate::crypto::{CryptoService, Identity};
use crate::friends::{FriendEngine, FriendRecord, PendingRequest, RequestOutcome};
use crate::groups::{GroupEngine, GroupRecord, PendingGroupInvite};
use crate::messaging::{MessageChannel, TrackedMessage};
use crate::network::{Envelope, EnvelopePayload, PresencePayload};
use crate::network::{
    ConnectionManager, LossOutcome, NetworkError, ReconnectManager, ServerFrame, SessionState,
    Transport,
};
use crate::presence::PresenceTracker;

use super::config::ClientConfig;
use super::error::{ClientError, ClientResult};
use super::events::{CallbackHandler, ClientEvent, EventDispatcher, EventHandler};

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Snapshot of the connection singleton's observable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub session: SessionState,
    pub connected_url: Option<String>,
    pub registered_did: Option<String>,
    pub reconnect_attempt: u32,
    pub server_index: usize,
    pub intentional_disconnect: bool,
}

/// The relay protocol engine for one peer.
///
/// # Example
///
/// ```ignore
/// use palaver_core::api::{ClientConfig, PalaverClient};
/// use palaver_core::crypto::MockCryptoService;
/// use palaver_core::network::MockTransport;
///
/// let identity = MockCryptoService::generate_identity("Alice");
/// let config = ClientConfig::new(identity, "ws://relay.example.com");
/// let mut client = PalaverClient::new(config, MockTransport::new(), MockCryptoService::new())?;
///
/// client.connect(Instant::now())?;
/// loop {
///     client.poll(Instant::now())?;
/// }
/// ```
pub struct PalaverClient<T: Transport, C: CryptoService> {
    identity: Identity,
    crypto: C,
    connection: ConnectionManager<T>,
    reconnect: ReconnectManager,
    friends: FriendEngine,
    messages: MessageChannel,
    groups: GroupEngine,
    presence: PresenceTracker,
    events: EventDispatcher,
    /// Invite codes for communities this peer owns; republished on every
    /// successful registration.
    community_invites: Vec<serde_json::Value>,
}

impl<T: Transport, C: CryptoService> PalaverClient<T, C> {
    pub fn new(config: ClientConfig, transport: T, crypto: C) -> ClientResult<Self> {
        if config.relays.is_empty() {
            return Err(ClientError::Configuration(
                "at least one relay URL is required".into(),
            ));
        }
        let reconnect = ReconnectManager::new(config.relays.clone(), config.reconnect.clone())?;
        let connection = ConnectionManager::new(
            transport,
            config.identity.did.clone(),
            Duration::from_millis(config.keep_alive_interval_ms),
        );
        Ok(PalaverClient {
            friends: FriendEngine::new(config.identity.clone(), config.auto_accept_friends),
            messages: MessageChannel::new(config.identity.clone()),
            groups: GroupEngine::new(config.identity.clone()),
            identity: config.identity,
            crypto,
            connection,
            reconnect,
            presence: PresenceTracker::new(),
            events: EventDispatcher::new(),
            community_invites: Vec::new(),
        })
    }

    // === Events ===

    /// Register an event handler.
    pub fn add_event_handler<F>(&mut self, callback: F)
    where
        F: Fn(ClientEvent) + Send + Sync + 'static,
    {
        self.events
            .add_handler(Arc::new(CallbackHandler::new(callback)));
    }

    /// Register a boxed event handler.
    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.events.add_handler(handler);
    }

    // === Connection lifecycle ===

    /// Explicit user/API connect: clears any intentional-disconnect
    /// suppression and attempts the primary relay immediately. On failure
    /// the reconnection manager takes over with backoff.
    pub fn connect(&mut self, now: Instant) -> ClientResult<()> {
        let url = self.reconnect.connect_requested();
        match self.connection.establish(&url) {
            Ok(()) => {
                self.events.dispatch(ClientEvent::ConnectionStateChanged {
                    state: self.connection.session(),
                });
                Ok(())
            }
            Err(e) => {
                self.handle_connection_lost(now);
                Err(e.into())
            }
        }
    }

    /// Explicit user/API disconnect: suppresses all reconnection until the
    /// next [`connect`](PalaverClient::connect).
    pub fn disconnect(&mut self) -> ClientResult<()> {
        self.reconnect.intentional_disconnect();
        let _ = self.connection.disconnect();
        self.presence.clear();
        self.events.dispatch(ClientEvent::ConnectionStateChanged {
            state: SessionState::Disconnected,
        });
        Ok(())
    }

    /// App moved to the background: keep-alive pauses, the connection stays
    /// open.
    pub fn suspend(&mut self) {
        self.connection.suspend();
    }

    /// App returned to the foreground: keep-alive resumes. If the connection
    /// died while backgrounded, backoff resets and an immediate attempt is
    /// scheduled (picked up by the next [`poll`](PalaverClient::poll)).
    pub fn resume(&mut self, now: Instant) {
        self.connection.resume();
        if !self.connection.is_open() {
            self.connection.handle_close();
            self.presence.clear();
            self.reconnect.on_foreground(now);
        }
    }

    pub fn is_ready(&self) -> bool {
        self.connection.is_ready()
    }

    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            session: self.connection.session(),
            connected_url: self.connection.connected_url().map(|s| s.to_string()),
            registered_did: self.connection.registered_did().map(|s| s.to_string()),
            reconnect_attempt: self.reconnect.attempt(),
            server_index: self.reconnect.server_index(),
            intentional_disconnect: self.reconnect.is_suppressed(),
        }
    }

    /// Pump the engine: fire due reconnect attempts, drain inbound frames,
    /// tick keep-alive, and flush due read receipts. Call this regularly;
    /// every error degrades to drop-and-log or a scheduled reconnect, never
    /// a panic.
    pub fn poll(&mut self, now: Instant) -> ClientResult<()> {
        // A socket that died under us counts as a close, clean or not.
        if self.connection.session() != SessionState::Disconnected && !self.connection.is_open() {
            tracing::info!("socket closed");
            self.handle_connection_lost(now);
        }

        // Due reconnect attempt (single-flight guarded by the manager).
        if let Some(url) = self.reconnect.poll_due(now) {
            if let Err(e) = self.connection.establish(&url) {
                tracing::debug!(url = %url, error = %e, "reconnect attempt failed");
                self.handle_connection_lost(now);
            } else {
                self.events.dispatch(ClientEvent::ConnectionStateChanged {
                    state: self.connection.session(),
                });
            }
        }

        // Drain inbound frames in arrival order.
        while self.connection.is_open() {
            match self.connection.receive(now) {
                Ok(Some(frame)) => self.handle_frame(frame, now),
                Ok(None) => break,
                Err(e) => {
                    tracing::info!(error = %e, "connection lost");
                    self.handle_connection_lost(now);
                    break;
                }
            }
        }

        // Keep-alive.
        if let Err(e) = self.connection.tick_keep_alive(now) {
            tracing::info!(error = %e, "keep-alive failed, connection lost");
            self.handle_connection_lost(now);
        }

        // Read receipts whose randomized delay elapsed.
        if self.connection.is_ready() {
            for (to_did, receipt) in self.messages.take_due_read_receipts(now) {
                let message_id = receipt.message_id.clone();
                let status = receipt.status;
                self.relay_payload_logged(&to_did, &EnvelopePayload::MessageStatus(receipt));
                self.events.dispatch(ClientEvent::MessageStatusChanged {
                    message_id,
                    status,
                });
            }
        }

        Ok(())
    }

    // === Friends ===

    pub fn send_friend_request(
        &mut self,
        peer_did: &str,
        message: Option<String>,
    ) -> ClientResult<String> {
        self.require_ready()?;
        let (request_id, payload) = self.friends.request(peer_did, message, now_secs())?;
        self.relay_payload(peer_did, &EnvelopePayload::FriendRequest(payload))?;
        Ok(request_id)
    }

    pub fn accept_friend_request(&mut self, request_id: &str) -> ClientResult<FriendRecord> {
        self.require_ready()?;
        let (record, response) = self.friends.accept(request_id)?;
        self.relay_payload(&record.did, &EnvelopePayload::FriendResponse(response))?;
        self.events.dispatch(ClientEvent::FriendAdded {
            did: record.did.clone(),
        });
        Ok(record)
    }

    pub fn reject_friend_request(&mut self, request_id: &str) -> ClientResult<()> {
        self.require_ready()?;
        let (peer_did, response) = self.friends.reject(request_id)?;
        self.relay_payload(&peer_did, &EnvelopePayload::FriendResponse(response))
    }

    pub fn friends(&self) -> Vec<&FriendRecord> {
        self.friends.friends()
    }

    pub fn friend(&self, did: &str) -> Option<&FriendRecord> {
        self.friends.friend(did)
    }

    pub fn pending_friend_requests(&self) -> Vec<&PendingRequest> {
        self.friends.pending_requests()
    }

    // === Messaging ===

    /// Encrypt and send a direct message. Fails without a friend record for
    /// `peer_did`. Returns the message id; its status starts at `Sending`
    /// and advances as acks and receipts arrive.
    pub fn send_message(&mut self, peer_did: &str, text: &str) -> ClientResult<String> {
        self.send_message_inner(peer_did, text, None)
    }

    /// Send a reply within a thread.
    pub fn send_thread_reply(
        &mut self,
        peer_did: &str,
        text: &str,
        thread_id: &str,
    ) -> ClientResult<String> {
        self.send_message_inner(peer_did, text, Some(thread_id.to_string()))
    }

    /// Send a typing indicator for the conversation with `peer_did`.
    pub fn send_typing(&mut self, peer_did: &str, typing: bool) -> ClientResult<()> {
        self.require_ready()?;
        let friend = self
            .friends
            .friend(peer_did)
            .cloned()
            .ok_or_else(|| crate::messaging::MessagingError::NotFriends(peer_did.to_string()))?;
        let payload = self.messages.typing(&friend, typing);
        self.relay_payload(peer_did, &EnvelopePayload::TypingIndicator(payload))
    }

    pub fn message(&self, message_id: &str) -> Option<&TrackedMessage> {
        self.messages.message(message_id)
    }

    pub fn conversation_messages(&self, conversation_id: &str) -> Vec<&TrackedMessage> {
        self.messages.conversation_messages(conversation_id)
    }

    pub fn received_messages(&self) -> Vec<&TrackedMessage> {
        self.messages.received_messages()
    }

    fn send_message_inner(
        &mut self,
        peer_did: &str,
        text: &str,
        thread_id: Option<String>,
    ) -> ClientResult<String> {
        self.require_ready()?;
        let friend = self
            .friends
            .friend(peer_did)
            .cloned()
            .ok_or_else(|| crate::messaging::MessagingError::NotFriends(peer_did.to_string()))?;
        let (message_id, payload) =
            self.messages
                .send(&self.crypto, &friend, text, thread_id, now_secs())?;
        self.relay_payload(peer_did, &EnvelopePayload::ChatMessage(payload))?;
        Ok(message_id)
    }

    // === Groups ===

    /// Create a group and invite every current friend.
    pub fn create_group(&mut self, group_name: &str) -> ClientResult<String> {
        self.require_ready()?;
        let (group_id, invites) =
            self.groups
                .create(&self.crypto, &self.friends, group_name, now_secs())?;
        for (to_did, invite) in invites {
            self.relay_payload_logged(&to_did, &EnvelopePayload::GroupInvite(invite));
        }
        Ok(group_id)
    }

    /// Accept a pending group invite. Returns the group id.
    pub fn accept_group_invite(&mut self, invite_id: &str) -> ClientResult<String> {
        self.require_ready()?;
        let (inviter_did, accept) =
            self.groups
                .accept_invite(&self.crypto, &self.friends, invite_id)?;
        let group_id = accept.group_id.clone();
        self.relay_payload(&inviter_did, &EnvelopePayload::GroupInviteAccept(accept))?;
        Ok(group_id)
    }

    pub fn decline_group_invite(&mut self, invite_id: &str) -> ClientResult<()> {
        self.require_ready()?;
        let (inviter_did, decline) = self.groups.decline_invite(invite_id)?;
        self.relay_payload(&inviter_did, &EnvelopePayload::GroupInviteDecline(decline))
    }

    /// Encrypt once and fan out a group message to every member.
    pub fn send_group_message(&mut self, group_id: &str, text: &str) -> ClientResult<String> {
        self.require_ready()?;
        let (message_id, fanout) = self.groups.send(&self.crypto, group_id, text, now_secs())?;
        for (to_did, payload) in fanout {
            self.relay_payload_logged(&to_did, &EnvelopePayload::GroupMessage(payload));
        }
        Ok(message_id)
    }

    /// Remove a member (admin only): rotates the key and distributes the new
    /// version to every remaining member. The removed peer never sees it.
    pub fn remove_group_member(&mut self, group_id: &str, member_did: &str) -> ClientResult<()> {
        self.require_ready()?;
        let fanout =
            self.groups
                .remove_member(&self.crypto, &self.friends, group_id, member_did)?;
        let (removed_did, removed) = fanout.removed;
        self.relay_payload_logged(&removed_did, &EnvelopePayload::GroupMemberRemoved(removed));
        for (to_did, rotation) in fanout.rotations {
            self.relay_payload_logged(&to_did, &EnvelopePayload::GroupKeyRotation(rotation));
        }
        Ok(())
    }

    pub fn group(&self, group_id: &str) -> Option<&GroupRecord> {
        self.groups.group(group_id)
    }

    pub fn pending_group_invites(&self) -> Vec<&PendingGroupInvite> {
        self.groups.pending_invites()
    }

    // === Calls ===

    pub fn send_call_offer(&mut self, to_did: &str, call_id: &str, sdp: &str) -> ClientResult<()> {
        self.require_ready()?;
        self.relay_payload(to_did, &calls::offer(call_id, sdp))
    }

    pub fn send_call_answer(&mut self, to_did: &str, call_id: &str, sdp: &str) -> ClientResult<()> {
        self.require_ready()?;
        self.relay_payload(to_did, &calls::answer(call_id, sdp))
    }

    pub fn send_call_ice_candidate(
        &mut self,
        to_did: &str,
        call_id: &str,
        candidate: &str,
    ) -> ClientResult<()> {
        self.require_ready()?;
        self.relay_payload(to_did, &calls::ice_candidate(call_id, candidate))
    }

    pub fn send_call_end(
        &mut self,
        to_did: &str,
        call_id: &str,
        reason: Option<String>,
    ) -> ClientResult<()> {
        self.require_ready()?;
        self.relay_payload(to_did, &calls::end(call_id, reason))
    }

    pub fn send_call_state(
        &mut self,
        to_did: &str,
        call_id: &str,
        state: &str,
    ) -> ClientResult<()> {
        self.require_ready()?;
        self.relay_payload(to_did, &calls::state(call_id, state))
    }

    // === Presence ===

    pub fn is_peer_online(&self, did: &str) -> bool {
        self.presence.is_online(did)
    }

    pub fn online_peers(&self) -> Vec<String> {
        self.presence.snapshot()
    }

    // === Pass-through surfaces ===

    /// Register a community invite code for republication on every
    /// registration, and broadcast it now if connected.
    pub fn publish_community_invite(&mut self, invite: serde_json::Value) {
        self.community_invites.push(invite.clone());
        if self.connection.is_ready() {
            self.broadcast_community_invite(&invite);
        }
    }

    /// Send an opaque community event to one peer.
    pub fn send_community_event(
        &mut self,
        to_did: &str,
        payload: serde_json::Value,
    ) -> ClientResult<()> {
        self.require_ready()?;
        self.relay_payload(to_did, &EnvelopePayload::CommunityEvent(payload))
    }

    /// Send an opaque file-transfer event to one peer.
    pub fn send_file_event(
        &mut self,
        to_did: &str,
        payload: serde_json::Value,
    ) -> ClientResult<()> {
        self.require_ready()?;
        self.relay_payload(to_did, &EnvelopePayload::DmFileEvent(payload))
    }

    /// Send opaque account metadata to one peer.
    pub fn send_account_metadata(
        &mut self,
        to_did: &str,
        payload: serde_json::Value,
    ) -> ClientResult<()> {
        self.require_ready()?;
        self.relay_payload(to_did, &EnvelopePayload::AccountMetadata(payload))
    }

    pub fn transport_mut(&mut self) -> &mut T {
        self.connection.transport_mut()
    }

    // === Internals ===

    fn require_ready(&self) -> ClientResult<()> {
        if self.connection.is_ready() {
            Ok(())
        } else {
            Err(NetworkError::NotConnected.into())
        }
    }

    fn relay_payload(&mut self, to_did: &str, payload: &EnvelopePayload) -> ClientResult<()> {
        let envelope = Envelope::new(payload)?;
        self.connection.send_envelope(to_did, &envelope)?;
        Ok(())
    }

    /// Best-effort send inside handler paths: failures are logged, never
    /// propagated.
    fn relay_payload_logged(&mut self, to_did: &str, payload: &EnvelopePayload) {
        if let Err(e) = self.relay_payload(to_did, payload) {
            tracing::debug!(to = to_did, kind = payload.kind(), error = %e, "dropping outbound envelope");
        }
    }

    fn broadcast_community_invite(&mut self, invite: &serde_json::Value) {
        for did in self.friends.friend_dids() {
            self.relay_payload_logged(&did, &EnvelopePayload::CommunityEvent(invite.clone()));
        }
    }

    fn handle_connection_lost(&mut self, now: Instant) {
        self.connection.handle_close();
        self.presence.clear();
        self.events.dispatch(ClientEvent::ConnectionStateChanged {
            state: SessionState::Disconnected,
        });
        if self.reconnect.on_connection_lost(now) == LossOutcome::Exhausted {
            self.events.dispatch(ClientEvent::ReconnectionExhausted);
        }
    }

    fn handle_frame(&mut self, frame: ServerFrame, now: Instant) {
        match frame {
            ServerFrame::Registered { .. } => self.handle_registered(),
            ServerFrame::Message { from_did, payload } => {
                self.handle_envelope(&from_did, &payload, now);
            }
            ServerFrame::OfflineMessages { messages } => {
                tracing::info!(count = messages.len(), "replaying offline messages");
                for message in messages {
                    self.handle_envelope(&message.from_did, &message.payload, now);
                }
            }
            ServerFrame::Ack { id } => {
                if let Some(message_id) = self.messages.on_transport_ack(&id) {
                    self.events.dispatch(ClientEvent::MessageStatusChanged {
                        message_id,
                        status: crate::network::MessageStatus::Sent,
                    });
                }
            }
            ServerFrame::Error { message } => {
                tracing::warn!(message = %message, "relay reported an error");
                self.events.dispatch(ClientEvent::RelayError { message });
            }
            // Registered duplicates and pongs are swallowed by the
            // connection manager; anything else unknown is ignored.
            ServerFrame::Pong => {}
            ServerFrame::Unknown => {
                tracing::debug!("ignoring unknown frame type");
            }
        }
    }

    /// Exactly-once post-registration work, on the `Connecting → Registered`
    /// edge: the replay request was already sent by the connection manager;
    /// here we broadcast presence and republish community invites, then
    /// promote the session to `Ready`.
    fn handle_registered(&mut self) {
        self.reconnect.on_registered();

        let ts = now_secs();
        let presence = PresencePayload {
            did: self.identity.did.clone(),
            timestamp: ts,
        };
        for did in self.friends.friend_dids() {
            self.relay_payload_logged(&did, &EnvelopePayload::PresenceOnline(presence.clone()));
        }

        for invite in self.community_invites.clone() {
            self.broadcast_community_invite(&invite);
        }

        self.connection.mark_ready();
        self.events.dispatch(ClientEvent::ConnectionStateChanged {
            state: SessionState::Ready,
        });
    }

    fn handle_envelope(&mut self, from_did: &str, payload: &str, now: Instant) {
        if self.presence.observe(from_did) {
            self.events.dispatch(ClientEvent::PresenceChanged {
                did: from_did.to_string(),
                online: true,
            });
        }

        let envelope = match Envelope::from_wire(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::debug!(from = from_did, error = %e, "dropping malformed envelope");
                return;
            }
        };
        let decoded = match envelope.decode() {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::debug!(from = from_did, kind = %envelope.kind, error = %e, "dropping undecodable envelope");
                return;
            }
        };

        match decoded {
            EnvelopePayload::FriendRequest(p) => self.on_friend_request(p),
            EnvelopePayload::FriendResponse(p) => self.on_friend_response(p),
            EnvelopePayload::FriendAcceptAck(p) => self.friends.on_accept_ack(&p),
            EnvelopePayload::ChatMessage(p) => self.on_chat_message(p, now),
            EnvelopePayload::TypingIndicator(p) => {
                self.events.dispatch(ClientEvent::TypingIndicator {
                    sender_did: p.sender_did,
                    conversation_id: p.conversation_id,
                    typing: p.typing,
                });
            }
            EnvelopePayload::MessageStatus(p) => {
                if let Some(status) = self.messages.on_status(&p) {
                    self.events.dispatch(ClientEvent::MessageStatusChanged {
                        message_id: p.message_id,
                        status,
                    });
                }
            }
            EnvelopePayload::GroupInvite(p) => {
                let event = ClientEvent::GroupInviteReceived {
                    invite_id: p.invite_id.clone(),
                    group_id: p.group_id.clone(),
                    group_name: p.group_name.clone(),
                    inviter_did: p.inviter_did.clone(),
                };
                match self.groups.on_invite(&p) {
                    Ok(()) => self.events.dispatch(event),
                    Err(e) => tracing::debug!(error = %e, "dropping malformed group invite"),
                }
            }
            EnvelopePayload::GroupInviteAccept(p) => {
                self.groups.on_invite_accept(&p);
                self.events.dispatch(ClientEvent::GroupMemberJoined {
                    group_id: p.group_id,
                    member_did: p.member_did,
                });
            }
            EnvelopePayload::GroupInviteDecline(p) => {
                self.groups.on_invite_decline(&p);
                self.events.dispatch(ClientEvent::GroupInviteDeclined {
                    group_id: p.group_id,
                    member_did: p.member_did,
                });
            }
            EnvelopePayload::GroupMessage(p) => match self.groups.on_group_message(&self.crypto, &p)
            {
                Ok(Some(message)) => {
                    self.events
                        .dispatch(ClientEvent::GroupMessageReceived { message });
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(group = %p.group_id, error = %e, "dropping group message");
                }
            },
            EnvelopePayload::GroupKeyRotation(p) => {
                match self
                    .groups
                    .on_key_rotation(&self.crypto, &self.friends, from_did, &p)
                {
                    Ok(()) => self.events.dispatch(ClientEvent::GroupKeyRotated {
                        group_id: p.group_id,
                        key_version: p.key_version,
                    }),
                    Err(e) => {
                        tracing::warn!(group = %p.group_id, error = %e, "ignoring key rotation");
                    }
                }
            }
            EnvelopePayload::GroupMemberRemoved(p) => {
                let removed_us = self.groups.on_member_removed(&p);
                if removed_us {
                    self.events.dispatch(ClientEvent::RemovedFromGroup {
                        group_id: p.group_id,
                    });
                } else {
                    self.events.dispatch(ClientEvent::GroupMemberLeft {
                        group_id: p.group_id,
                        member_did: p.removed_did,
                    });
                }
            }
            EnvelopePayload::CallOffer(p) => self.dispatch_call(CallSignal::Offer {
                call_id: p.call_id,
                from_did: from_did.to_string(),
                sdp: p.sdp,
            }),
            EnvelopePayload::CallAnswer(p) => self.dispatch_call(CallSignal::Answer {
                call_id: p.call_id,
                from_did: from_did.to_string(),
                sdp: p.sdp,
            }),
            EnvelopePayload::CallIceCandidate(p) => self.dispatch_call(CallSignal::IceCandidate {
                call_id: p.call_id,
                from_did: from_did.to_string(),
                candidate: p.candidate,
            }),
            EnvelopePayload::CallEnd(p) => self.dispatch_call(CallSignal::End {
                call_id: p.call_id,
                from_did: from_did.to_string(),
                reason: p.reason,
            }),
            EnvelopePayload::CallState(p) => self.dispatch_call(CallSignal::State {
                call_id: p.call_id,
                from_did: from_did.to_string(),
                state: p.state,
            }),
            EnvelopePayload::PresenceOnline(p) => self.on_presence_online(p),
            EnvelopePayload::PresenceAck(p) => {
                if self.presence.observe(&p.did) {
                    self.events.dispatch(ClientEvent::PresenceChanged {
                        did: p.did,
                        online: true,
                    });
                }
            }
            EnvelopePayload::CommunityEvent(v) => {
                self.events.dispatch(ClientEvent::CommunityEvent {
                    from_did: from_did.to_string(),
                    payload: v,
                });
            }
            EnvelopePayload::DmFileEvent(v) => {
                self.events.dispatch(ClientEvent::FileEvent {
                    from_did: from_did.to_string(),
                    payload: v,
                });
            }
            EnvelopePayload::AccountMetadata(v) => {
                self.events.dispatch(ClientEvent::AccountMetadata {
                    from_did: from_did.to_string(),
                    payload: v,
                });
            }
            EnvelopePayload::Unknown { kind, version } => {
                tracing::debug!(kind = %kind, version, "ignoring unknown envelope kind");
            }
        }
    }

    fn on_friend_request(&mut self, payload: crate::network::FriendRequestPayload) {
        let from_did = payload.from_did.clone();
        match self.friends.on_request(&payload, now_secs()) {
            RequestOutcome::Pending(request_id) => {
                self.events.dispatch(ClientEvent::FriendRequestReceived {
                    request_id,
                    from_did,
                    display_name: payload.from_display_name,
                    message: payload.message,
                });
            }
            RequestOutcome::Accepted { record, response } => {
                self.relay_payload_logged(&from_did, &EnvelopePayload::FriendResponse(response));
                self.events
                    .dispatch(ClientEvent::FriendAdded { did: record.did });
            }
            RequestOutcome::Ignored => {}
        }
    }

    fn on_friend_response(&mut self, payload: crate::network::FriendResponsePayload) {
        let accepted = payload.accepted;
        let responder = payload.responder_did.clone();
        if let Some((record, ack)) = self.friends.on_response(&payload, now_secs()) {
            self.relay_payload_logged(&record.did, &EnvelopePayload::FriendAcceptAck(ack));
            self.events
                .dispatch(ClientEvent::FriendAdded { did: record.did });
        } else if !accepted {
            self.events.dispatch(ClientEvent::FriendRequestDeclined {
                peer_did: responder,
            });
        }
    }

    fn on_chat_message(&mut self, payload: crate::network::ChatMessagePayload, now: Instant) {
        let Some(friend) = self.friends.friend(&payload.sender_did).cloned() else {
            tracing::warn!(sender = %payload.sender_did, "chat message from non-friend, dropping");
            return;
        };
        match self
            .messages
            .on_chat_message(&self.crypto, &friend, &payload, now)
        {
            Ok(Some(received)) => {
                self.relay_payload_logged(
                    &friend.did,
                    &EnvelopePayload::MessageStatus(received.delivered_receipt.clone()),
                );
                if received.is_thread_reply {
                    self.events.dispatch(ClientEvent::ThreadReplyReceived {
                        message: received.message,
                    });
                } else {
                    self.events.dispatch(ClientEvent::MessageReceived {
                        message: received.message,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => {
                // Never tell the sender; they cannot distinguish tampering
                // from a stale key and must not learn which.
                tracing::debug!(message_id = %payload.message_id, error = %e, "dropping undecryptable message");
            }
        }
    }

    fn on_presence_online(&mut self, payload: PresencePayload) {
        if self.presence.observe(&payload.did) {
            self.events.dispatch(ClientEvent::PresenceChanged {
                did: payload.did.clone(),
                online: true,
            });
        }
        // Let the announcing peer know we are reachable too.
        let ack = PresencePayload {
            did: self.identity.did.clone(),
            timestamp: now_secs(),
        };
        self.relay_payload_logged(&payload.did, &EnvelopePayload::PresenceAck(ack));
    }

    fn dispatch_call(&mut self, signal: CallSignal) {
        self.events
            .dispatch(ClientEvent::CallSignalReceived { signal });
    }
}
