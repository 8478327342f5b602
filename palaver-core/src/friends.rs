// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Friend Handshake Engine
//!
//! Drives the three-leg friend protocol and the resulting contact list:
//!
//! 1. `friend_request`: the sender records a pending outgoing request.
//! 2. `friend_response`: the receiver accepts (creating its
//!    [`FriendRecord`] immediately) or rejects.
//! 3. `friend_accept_ack`: the original requester, having created its own
//!    record from the embedded keys, closes the loop.
//!
//! The asymmetric record-creation timing is deliberate: the acceptor holds a
//! `FriendRecord` before the requester does. Loss of the final ack leg is
//! non-fatal; both sides already hold a record by then.

use std::collections::HashMap;

use thiserror::Error;
use uuid::Uuid;

use crate::crypto::Identity;
use crate::messaging::ConversationId;
use crate::network::{
    FriendAcceptAckPayload, FriendRequestPayload, FriendResponsePayload,
};

/// Friend engine errors.
#[derive(Error, Debug)]
pub enum FriendError {
    #[error("no pending request with id {0}")]
    RequestNotFound(String),

    #[error("already friends with {0}")]
    AlreadyFriends(String),

    #[error("cannot send a friend request to yourself")]
    CannotAddSelf,
}

/// Direction of a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// A friend request awaiting a response.
///
/// For incoming requests the peer fields are filled from the request
/// payload; for outgoing requests they stay empty until the acceptance
/// arrives with the responder's keys.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub id: String,
    pub peer_did: String,
    pub direction: Direction,
    pub display_name: Option<String>,
    pub signing_key: Option<String>,
    pub encryption_key: Option<String>,
    pub message: Option<String>,
    pub created_at: i64,
}

/// An established contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendRecord {
    pub did: String,
    pub display_name: String,
    pub signing_key: String,
    pub encryption_key: String,
    pub conversation_id: String,
}

/// What happened to an inbound `friend_request`.
#[derive(Debug)]
pub enum RequestOutcome {
    /// Stored, awaiting a local decision.
    Pending(String),
    /// Accepted immediately (auto-accept host, or mutual request).
    /// The response payload must be sent back to the requester.
    Accepted {
        record: FriendRecord,
        response: FriendResponsePayload,
    },
    /// Duplicate or stale; nothing to do.
    Ignored,
}

/// Friend handshake state machine and contact list.
pub struct FriendEngine {
    identity: Identity,
    auto_accept: bool,
    friends: HashMap<String, FriendRecord>,
    pending: HashMap<String, PendingRequest>,
}

impl FriendEngine {
    pub fn new(identity: Identity, auto_accept: bool) -> Self {
        FriendEngine {
            identity,
            auto_accept,
            friends: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn friend(&self, did: &str) -> Option<&FriendRecord> {
        self.friends.get(did)
    }

    pub fn is_friend(&self, did: &str) -> bool {
        self.friends.contains_key(did)
    }

    /// All friends, sorted by DID for deterministic iteration.
    pub fn friends(&self) -> Vec<&FriendRecord> {
        let mut records: Vec<&FriendRecord> = self.friends.values().collect();
        records.sort_by(|a, b| a.did.cmp(&b.did));
        records
    }

    pub fn friend_dids(&self) -> Vec<String> {
        self.friends().iter().map(|f| f.did.clone()).collect()
    }

    pub fn pending_requests(&self) -> Vec<&PendingRequest> {
        let mut requests: Vec<&PendingRequest> = self.pending.values().collect();
        requests.sort_by(|a, b| a.id.cmp(&b.id));
        requests
    }

    /// Leg 1: create an outgoing request.
    ///
    /// Returns the pending request id and the payload to send.
    pub fn request(
        &mut self,
        peer_did: &str,
        message: Option<String>,
        now: i64,
    ) -> Result<(String, FriendRequestPayload), FriendError> {
        if peer_did == self.identity.did {
            return Err(FriendError::CannotAddSelf);
        }
        if self.friends.contains_key(peer_did) {
            return Err(FriendError::AlreadyFriends(peer_did.to_string()));
        }

        let id = Uuid::new_v4().to_string();
        self.pending.insert(
            id.clone(),
            PendingRequest {
                id: id.clone(),
                peer_did: peer_did.to_string(),
                direction: Direction::Outgoing,
                display_name: None,
                signing_key: None,
                encryption_key: None,
                message: message.clone(),
                created_at: now,
            },
        );

        let payload = FriendRequestPayload {
            id: id.clone(),
            from_did: self.identity.did.clone(),
            from_display_name: self.identity.display_name.clone(),
            from_signing_key: self.identity.signing_key.clone(),
            from_encryption_key: self.identity.encryption_key.clone(),
            message,
            created_at: now,
        };
        Ok((id, payload))
    }

    /// Leg 2 (receiver side): handle an inbound request.
    pub fn on_request(&mut self, payload: &FriendRequestPayload, now: i64) -> RequestOutcome {
        if self.friends.contains_key(&payload.from_did) {
            tracing::debug!(peer = %payload.from_did, "friend request from existing friend, ignoring");
            return RequestOutcome::Ignored;
        }

        // Mutual request: we already sent one to this peer. Auto-accept
        // without a human step; both sides clearly want the link.
        let mutual = self
            .pending
            .values()
            .find(|p| p.direction == Direction::Outgoing && p.peer_did == payload.from_did)
            .map(|p| p.id.clone());
        if let Some(outgoing_id) = mutual {
            tracing::debug!(peer = %payload.from_did, "mutual friend request, auto-accepting");
            self.pending.remove(&outgoing_id);
            let (record, response) = self.build_acceptance(payload);
            return RequestOutcome::Accepted { record, response };
        }

        // Duplicate of a pending id: last write wins on the stored fields.
        let entry = self
            .pending
            .entry(payload.id.clone())
            .or_insert_with(|| PendingRequest {
                id: payload.id.clone(),
                peer_did: payload.from_did.clone(),
                direction: Direction::Incoming,
                display_name: None,
                signing_key: None,
                encryption_key: None,
                message: None,
                created_at: now,
            });
        entry.peer_did = payload.from_did.clone();
        entry.display_name = Some(payload.from_display_name.clone());
        entry.signing_key = Some(payload.from_signing_key.clone());
        entry.encryption_key = Some(payload.from_encryption_key.clone());
        entry.message = payload.message.clone();

        if self.auto_accept {
            let (record, response) = self.build_acceptance(payload);
            self.pending.remove(&payload.id);
            return RequestOutcome::Accepted { record, response };
        }

        RequestOutcome::Pending(payload.id.clone())
    }

    /// Accept a stored incoming request. Creates the local [`FriendRecord`]
    /// immediately, before the requester has one.
    pub fn accept(
        &mut self,
        request_id: &str,
    ) -> Result<(FriendRecord, FriendResponsePayload), FriendError> {
        let pending = self
            .pending
            .get(request_id)
            .filter(|p| p.direction == Direction::Incoming)
            .cloned()
            .ok_or_else(|| FriendError::RequestNotFound(request_id.to_string()))?;

        let payload = FriendRequestPayload {
            id: pending.id.clone(),
            from_did: pending.peer_did.clone(),
            from_display_name: pending.display_name.clone().unwrap_or_default(),
            from_signing_key: pending.signing_key.clone().unwrap_or_default(),
            from_encryption_key: pending.encryption_key.clone().unwrap_or_default(),
            message: pending.message.clone(),
            created_at: pending.created_at,
        };
        let (record, response) = self.build_acceptance(&payload);
        self.pending.remove(request_id);
        Ok((record, response))
    }

    /// Reject a stored incoming request. The requester's pending entry is
    /// discarded on their side when the response arrives; no further
    /// message follows. Returns the requester's DID and the response to
    /// send them.
    pub fn reject(
        &mut self,
        request_id: &str,
    ) -> Result<(String, FriendResponsePayload), FriendError> {
        let pending = self
            .pending
            .remove(request_id)
            .ok_or_else(|| FriendError::RequestNotFound(request_id.to_string()))?;
        let response = FriendResponsePayload {
            request_id: pending.id,
            accepted: false,
            responder_did: self.identity.did.clone(),
            responder_display_name: None,
            responder_signing_key: None,
            responder_encryption_key: None,
        };
        Ok((pending.peer_did, response))
    }

    /// Leg 3 (requester side): handle the response. On acceptance, create
    /// our own record from the embedded keys and return the ack payload to
    /// send; the acceptor treats the ack as purely informational.
    pub fn on_response(
        &mut self,
        payload: &FriendResponsePayload,
        now: i64,
    ) -> Option<(FriendRecord, FriendAcceptAckPayload)> {
        let pending = match self.pending.remove(&payload.request_id) {
            Some(p) if p.direction == Direction::Outgoing => p,
            Some(p) => {
                // Not ours to resolve; put it back.
                tracing::warn!(request_id = %payload.request_id, "response for an incoming request, ignoring");
                self.pending.insert(p.id.clone(), p);
                return None;
            }
            None => {
                tracing::warn!(request_id = %payload.request_id, "response without a matching pending request");
                return None;
            }
        };

        if !payload.accepted {
            tracing::debug!(peer = %pending.peer_did, "friend request rejected");
            return None;
        }

        let (Some(signing_key), Some(encryption_key)) = (
            payload.responder_signing_key.clone(),
            payload.responder_encryption_key.clone(),
        ) else {
            tracing::warn!(peer = %pending.peer_did, "acceptance without responder keys, ignoring");
            return None;
        };

        let record = FriendRecord {
            did: pending.peer_did.clone(),
            display_name: payload
                .responder_display_name
                .clone()
                .unwrap_or_else(|| pending.peer_did.clone()),
            signing_key,
            encryption_key,
            conversation_id: ConversationId::derive(&self.identity.did, &pending.peer_did).into(),
        };
        self.friends.insert(record.did.clone(), record.clone());

        let ack = FriendAcceptAckPayload {
            sender_did: self.identity.did.clone(),
            timestamp: now,
        };
        Some((record, ack))
    }

    /// The ack is a liveness signal, not a correctness precondition: our
    /// record already exists.
    pub fn on_accept_ack(&mut self, payload: &FriendAcceptAckPayload) {
        if self.friends.contains_key(&payload.sender_did) {
            tracing::debug!(peer = %payload.sender_did, "friend handshake acknowledged");
        } else {
            tracing::warn!(peer = %payload.sender_did, "accept ack from unknown peer");
        }
    }

    fn build_acceptance(
        &mut self,
        payload: &FriendRequestPayload,
    ) -> (FriendRecord, FriendResponsePayload) {
        let record = FriendRecord {
            did: payload.from_did.clone(),
            display_name: payload.from_display_name.clone(),
            signing_key: payload.from_signing_key.clone(),
            encryption_key: payload.from_encryption_key.clone(),
            conversation_id: ConversationId::derive(&self.identity.did, &payload.from_did).into(),
        };
        self.friends.insert(record.did.clone(), record.clone());

        let response = FriendResponsePayload {
            request_id: payload.id.clone(),
            accepted: true,
            responder_did: self.identity.did.clone(),
            responder_display_name: Some(self.identity.display_name.clone()),
            responder_signing_key: Some(self.identity.signing_key.clone()),
            responder_encryption_key: Some(self.identity.encryption_key.clone()),
        };
        (record, response)
    }
}
