// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Messaging Channel
//!
//! Encrypted direct messages between friends: send/receive, delivery and
//! read receipts, thread replies, and the transport-level pending-ack queue.
//!
//! Status flow for a sent message: `Sending` when handed to the relay,
//! `Sent` when the relay's transport ack arrives, `Delivered`/`Read` when
//! the recipient's receipts arrive. A status only ever advances.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use rand::Rng;
use ring::digest;
use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{CryptoContext, CryptoError, CryptoService, Identity};
use crate::friends::FriendRecord;
use crate::network::{
    decode_bytes, encode_bytes, ChatMessagePayload, MessageStatus, MessageStatusPayload,
    TypingIndicatorPayload,
};

/// Lower bound of the randomized read-receipt delay.
const READ_DELAY_MIN_MS: u64 = 500;
/// Upper bound of the randomized read-receipt delay.
const READ_DELAY_MAX_MS: u64 = 2_000;

/// Messaging errors.
#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("no friend record for {0}")]
    NotFriends(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Ciphertext or nonce fields were not valid base64.
    #[error("malformed message encoding")]
    MalformedEncoding,

    /// Decrypted bytes were not valid UTF-8.
    #[error("message body is not valid text")]
    InvalidBody,
}

/// Deterministic, order-independent identifier for a two-peer conversation.
///
/// Both sides compute the same id independently: SHA-256 over the
/// lexicographically ordered DID pair, hex-encoded (first 16 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn derive(did_a: &str, did_b: &str) -> Self {
        let (first, second) = if did_a <= did_b {
            (did_a, did_b)
        } else {
            (did_b, did_a)
        };
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(first.as_bytes());
        ctx.update(b"|");
        ctx.update(second.as_bytes());
        let hash = ctx.finish();
        ConversationId(hex::encode(&hash.as_ref()[..16]))
    }

    /// Conversation id for a group, derived from the group id alone.
    pub fn for_group(group_id: &str) -> Self {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(b"group|");
        ctx.update(group_id.as_bytes());
        let hash = ctx.finish();
        ConversationId(hex::encode(&hash.as_ref()[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ConversationId> for String {
    fn from(id: ConversationId) -> String {
        id.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message known to this peer, sent or received.
#[derive(Debug, Clone)]
pub struct TrackedMessage {
    pub message_id: String,
    pub conversation_id: String,
    pub content: String,
    pub timestamp: i64,
    pub sender_did: String,
    pub recipient_did: String,
    pub thread_id: Option<String>,
    pub status: MessageStatus,
}

/// A received message whose `read` receipt is scheduled but not yet due.
#[derive(Debug, Clone)]
struct PendingRead {
    due: Instant,
    message_id: String,
    to_did: String,
}

/// Result of processing an inbound chat message.
#[derive(Debug)]
pub struct ReceivedMessage {
    pub message: TrackedMessage,
    /// Whether this arrived as a thread reply (`thread_id` present).
    pub is_thread_reply: bool,
    /// Delivery receipt to send back to the sender.
    pub delivered_receipt: MessageStatusPayload,
}

/// Encrypted direct-message channel.
pub struct MessageChannel {
    identity: Identity,
    tracked: HashMap<String, TrackedMessage>,
    /// Message ids in receipt order (received messages only).
    received_log: Vec<String>,
    /// Ids of messages already processed; makes offline replay idempotent.
    seen: HashSet<String>,
    /// FIFO of in-flight outbound ids awaiting the relay's transport ack.
    pending_acks: VecDeque<String>,
    pending_reads: Vec<PendingRead>,
}

impl MessageChannel {
    pub fn new(identity: Identity) -> Self {
        MessageChannel {
            identity,
            tracked: HashMap::new(),
            received_log: Vec::new(),
            seen: HashSet::new(),
            pending_acks: VecDeque::new(),
            pending_reads: Vec::new(),
        }
    }

    /// Encrypt and stage an outbound message. Returns the message id and the
    /// payload to transmit. The message starts in `Sending` and joins the
    /// pending-ack queue.
    pub fn send(
        &mut self,
        crypto: &dyn CryptoService,
        friend: &FriendRecord,
        text: &str,
        thread_id: Option<String>,
        now: i64,
    ) -> Result<(String, ChatMessagePayload), MessagingError> {
        let message_id = Uuid::new_v4().to_string();
        let context = CryptoContext {
            sender_did: self.identity.did.clone(),
            recipient_did: friend.did.clone(),
            timestamp: now,
            conversation_id: friend.conversation_id.clone(),
        };
        let (ciphertext, nonce) = crypto.encrypt(
            text.as_bytes(),
            &self.identity.encryption_key,
            &friend.encryption_key,
            &context,
        )?;

        let payload = ChatMessagePayload {
            message_id: message_id.clone(),
            conversation_id: friend.conversation_id.clone(),
            sender_did: self.identity.did.clone(),
            ciphertext: encode_bytes(&ciphertext),
            nonce: encode_bytes(&nonce),
            timestamp: now,
            thread_id: thread_id.clone(),
        };

        self.tracked.insert(
            message_id.clone(),
            TrackedMessage {
                message_id: message_id.clone(),
                conversation_id: friend.conversation_id.clone(),
                content: text.to_string(),
                timestamp: now,
                sender_did: self.identity.did.clone(),
                recipient_did: friend.did.clone(),
                thread_id,
                status: MessageStatus::Sending,
            },
        );
        self.pending_acks.push_back(message_id.clone());

        Ok((message_id, payload))
    }

    /// Decrypt and record an inbound message.
    ///
    /// Returns `Ok(None)` for a replayed duplicate (already seen). A crypto
    /// failure is an error the caller logs and drops; the sender is never
    /// notified. On success a `delivered` receipt is returned for immediate
    /// transmission and a `read` receipt is scheduled after a randomized
    /// 0.5–2 s delay, drained via [`take_due_read_receipts`].
    ///
    /// [`take_due_read_receipts`]: MessageChannel::take_due_read_receipts
    pub fn on_chat_message(
        &mut self,
        crypto: &dyn CryptoService,
        friend: &FriendRecord,
        payload: &ChatMessagePayload,
        now: Instant,
    ) -> Result<Option<ReceivedMessage>, MessagingError> {
        if self.seen.contains(&payload.message_id) {
            tracing::debug!(message_id = %payload.message_id, "duplicate message, ignoring");
            return Ok(None);
        }

        let ciphertext =
            decode_bytes(&payload.ciphertext).map_err(|_| MessagingError::MalformedEncoding)?;
        let nonce = decode_bytes(&payload.nonce).map_err(|_| MessagingError::MalformedEncoding)?;

        // Mirrored context: same values the sender bound at encryption time.
        let context = CryptoContext {
            sender_did: payload.sender_did.clone(),
            recipient_did: self.identity.did.clone(),
            timestamp: payload.timestamp,
            conversation_id: payload.conversation_id.clone(),
        };
        let plaintext = crypto.decrypt(
            &ciphertext,
            &nonce,
            &friend.encryption_key,
            &self.identity.encryption_key,
            &context,
        )?;
        let content = String::from_utf8(plaintext).map_err(|_| MessagingError::InvalidBody)?;

        let message = TrackedMessage {
            message_id: payload.message_id.clone(),
            conversation_id: payload.conversation_id.clone(),
            content,
            timestamp: payload.timestamp,
            sender_did: payload.sender_did.clone(),
            recipient_did: self.identity.did.clone(),
            thread_id: payload.thread_id.clone(),
            status: MessageStatus::Delivered,
        };
        self.seen.insert(payload.message_id.clone());
        self.tracked
            .insert(payload.message_id.clone(), message.clone());
        self.received_log.push(payload.message_id.clone());

        let delay = rand::thread_rng().gen_range(READ_DELAY_MIN_MS..=READ_DELAY_MAX_MS);
        self.pending_reads.push(PendingRead {
            due: now + Duration::from_millis(delay),
            message_id: payload.message_id.clone(),
            to_did: payload.sender_did.clone(),
        });

        Ok(Some(ReceivedMessage {
            is_thread_reply: payload.thread_id.is_some(),
            delivered_receipt: MessageStatusPayload {
                message_id: payload.message_id.clone(),
                status: MessageStatus::Delivered,
            },
            message,
        }))
    }

    /// Drain read receipts whose delay has elapsed. Each is addressed to the
    /// original sender.
    pub fn take_due_read_receipts(&mut self, now: Instant) -> Vec<(String, MessageStatusPayload)> {
        let mut due = Vec::new();
        let mut remaining = Vec::with_capacity(self.pending_reads.len());
        for pending in self.pending_reads.drain(..) {
            if pending.due <= now {
                due.push(pending);
            } else {
                remaining.push(pending);
            }
        }
        self.pending_reads = remaining;

        due.into_iter()
            .map(|p| {
                self.advance_status(&p.message_id, MessageStatus::Read);
                (
                    p.to_did,
                    MessageStatusPayload {
                        message_id: p.message_id,
                        status: MessageStatus::Read,
                    },
                )
            })
            .collect()
    }

    /// Apply a `message_status` receipt from the recipient. Keyed by message
    /// id, so this path is unambiguous. Returns the new status if the
    /// message advanced.
    pub fn on_status(&mut self, payload: &MessageStatusPayload) -> Option<MessageStatus> {
        if !self.tracked.contains_key(&payload.message_id) {
            tracing::warn!(message_id = %payload.message_id, "status receipt for unknown message");
            return None;
        }
        self.advance_status(&payload.message_id, payload.status)
    }

    /// Apply the relay's transport-level `ack`.
    ///
    /// Correlated by id when the acked id is in flight; a relay that acks
    /// positionally (an id we are not tracking) pops the oldest entry
    /// instead. Either way the resolved message advances `Sending → Sent`.
    /// Returns the resolved message id.
    pub fn on_transport_ack(&mut self, id: &str) -> Option<String> {
        let resolved = match self.pending_acks.iter().position(|m| m == id) {
            Some(pos) => self.pending_acks.remove(pos),
            None => self.pending_acks.pop_front(),
        }?;
        self.advance_status(&resolved, MessageStatus::Sent);
        Some(resolved)
    }

    /// Build a typing indicator for a friend's conversation.
    pub fn typing(&self, friend: &FriendRecord, typing: bool) -> TypingIndicatorPayload {
        TypingIndicatorPayload {
            sender_did: self.identity.did.clone(),
            conversation_id: friend.conversation_id.clone(),
            typing,
        }
    }

    pub fn message(&self, message_id: &str) -> Option<&TrackedMessage> {
        self.tracked.get(message_id)
    }

    /// Received messages of one conversation, in receipt order.
    pub fn conversation_messages(&self, conversation_id: &str) -> Vec<&TrackedMessage> {
        self.received_log
            .iter()
            .filter_map(|id| self.tracked.get(id))
            .filter(|m| m.conversation_id == conversation_id)
            .collect()
    }

    /// All received messages in receipt order.
    pub fn received_messages(&self) -> Vec<&TrackedMessage> {
        self.received_log
            .iter()
            .filter_map(|id| self.tracked.get(id))
            .collect()
    }

    pub fn pending_ack_len(&self) -> usize {
        self.pending_acks.len()
    }

    pub fn pending_read_len(&self) -> usize {
        self.pending_reads.len()
    }

    /// Advance a status monotonically; regressions are ignored.
    fn advance_status(&mut self, message_id: &str, status: MessageStatus) -> Option<MessageStatus> {
        let message = self.tracked.get_mut(message_id)?;
        if status > message.status {
            message.status = status;
            Some(status)
        } else {
            None
        }
    }
}
