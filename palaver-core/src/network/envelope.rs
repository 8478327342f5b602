// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Envelope Codec
//!
//! Typed, versioned application payloads nested inside transport frames.
//! On the wire an envelope is `{kind, version, payload}` where `payload` is
//! opaque-by-kind JSON. Decoding maps `(kind, version)` to a typed
//! [`EnvelopePayload`]; anything unrecognized becomes
//! [`EnvelopePayload::Unknown`] so that a newer-than-supported or malformed
//! frame never takes down the connection.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Envelope protocol version. All kinds are currently at version 1.
pub const ENVELOPE_VERSION: u32 = 1;

/// Errors from envelope encoding/decoding.
///
/// Decode errors are non-fatal by contract: callers log and drop the frame.
#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("envelope serialization failed: {0}")]
    Serialize(serde_json::Error),

    #[error("envelope is not valid JSON: {0}")]
    Malformed(serde_json::Error),

    #[error("payload does not match kind {kind:?}: {source}")]
    PayloadMismatch {
        kind: String,
        source: serde_json::Error,
    },
}

/// Wire form of an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    pub version: u32,
    pub payload: serde_json::Value,
}

/// Delivery status carried by `message_status` envelopes and tracked locally.
///
/// Ordering is meaningful: a status may only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
}

/// A group member as serialized inside invites and rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub did: String,
    pub display_name: String,
    pub role: MemberRole,
}

/// Role of a group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

// ---------------------------------------------------------------------------
// Per-kind payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendRequestPayload {
    pub id: String,
    pub from_did: String,
    pub from_display_name: String,
    pub from_signing_key: String,
    pub from_encryption_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendResponsePayload {
    pub request_id: String,
    pub accepted: bool,
    pub responder_did: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_signing_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responder_encryption_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FriendAcceptAckPayload {
    pub sender_did: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessagePayload {
    pub message_id: String,
    pub conversation_id: String,
    pub sender_did: String,
    /// Base64-encoded ciphertext.
    pub ciphertext: String,
    /// Base64-encoded nonce.
    pub nonce: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingIndicatorPayload {
    pub sender_did: String,
    pub conversation_id: String,
    pub typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageStatusPayload {
    pub message_id: String,
    pub status: MessageStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInvitePayload {
    pub invite_id: String,
    pub group_id: String,
    pub group_name: String,
    pub inviter_did: String,
    /// Group key wrapped for the invitee, base64-encoded.
    pub encrypted_group_key: String,
    /// Base64-encoded nonce for the wrapped key.
    pub nonce: String,
    pub key_version: u32,
    pub members: Vec<GroupMember>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInviteAcceptPayload {
    pub invite_id: String,
    pub group_id: String,
    pub member_did: String,
    pub member_display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupInviteDeclinePayload {
    pub invite_id: String,
    pub group_id: String,
    pub member_did: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMessagePayload {
    pub message_id: String,
    pub group_id: String,
    pub sender_did: String,
    /// Base64-encoded ciphertext under the group key.
    pub ciphertext: String,
    /// Base64-encoded nonce.
    pub nonce: String,
    pub key_version: u32,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupKeyRotationPayload {
    pub group_id: String,
    /// New group key wrapped for the recipient, base64-encoded.
    pub encrypted_group_key: String,
    /// Base64-encoded nonce for the wrapped key.
    pub nonce: String,
    pub key_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMemberRemovedPayload {
    pub group_id: String,
    pub removed_did: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallOfferPayload {
    pub call_id: String,
    pub sdp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAnswerPayload {
    pub call_id: String,
    pub sdp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallIceCandidatePayload {
    pub call_id: String,
    pub candidate: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEndPayload {
    pub call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallStatePayload {
    pub call_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresencePayload {
    pub did: String,
    pub timestamp: i64,
}

// ---------------------------------------------------------------------------
// Typed sum
// ---------------------------------------------------------------------------

/// Every envelope kind this engine understands, plus the mandatory
/// unknown-ignore arm.
///
/// `community_event`, `dm_file_event`, and `account_metadata` are routed to
/// the application as opaque values; this core holds no state for them.
#[derive(Debug, Clone)]
pub enum EnvelopePayload {
    FriendRequest(FriendRequestPayload),
    FriendResponse(FriendResponsePayload),
    FriendAcceptAck(FriendAcceptAckPayload),
    ChatMessage(ChatMessagePayload),
    TypingIndicator(TypingIndicatorPayload),
    MessageStatus(MessageStatusPayload),
    GroupInvite(GroupInvitePayload),
    GroupInviteAccept(GroupInviteAcceptPayload),
    GroupInviteDecline(GroupInviteDeclinePayload),
    GroupMessage(GroupMessagePayload),
    GroupKeyRotation(GroupKeyRotationPayload),
    GroupMemberRemoved(GroupMemberRemovedPayload),
    CallOffer(CallOfferPayload),
    CallAnswer(CallAnswerPayload),
    CallIceCandidate(CallIceCandidatePayload),
    CallEnd(CallEndPayload),
    CallState(CallStatePayload),
    PresenceOnline(PresencePayload),
    PresenceAck(PresencePayload),
    CommunityEvent(serde_json::Value),
    DmFileEvent(serde_json::Value),
    AccountMetadata(serde_json::Value),
    /// Unrecognized kind, or known kind at an unsupported version.
    Unknown { kind: String, version: u32 },
}

impl EnvelopePayload {
    /// Wire name for this payload's kind.
    pub fn kind(&self) -> &str {
        match self {
            EnvelopePayload::FriendRequest(_) => "friend_request",
            EnvelopePayload::FriendResponse(_) => "friend_response",
            EnvelopePayload::FriendAcceptAck(_) => "friend_accept_ack",
            EnvelopePayload::ChatMessage(_) => "chat_message",
            EnvelopePayload::TypingIndicator(_) => "typing_indicator",
            EnvelopePayload::MessageStatus(_) => "message_status",
            EnvelopePayload::GroupInvite(_) => "group_invite",
            EnvelopePayload::GroupInviteAccept(_) => "group_invite_accept",
            EnvelopePayload::GroupInviteDecline(_) => "group_invite_decline",
            EnvelopePayload::GroupMessage(_) => "group_message",
            EnvelopePayload::GroupKeyRotation(_) => "group_key_rotation",
            EnvelopePayload::GroupMemberRemoved(_) => "group_member_removed",
            EnvelopePayload::CallOffer(_) => "call_offer",
            EnvelopePayload::CallAnswer(_) => "call_answer",
            EnvelopePayload::CallIceCandidate(_) => "call_ice_candidate",
            EnvelopePayload::CallEnd(_) => "call_end",
            EnvelopePayload::CallState(_) => "call_state",
            EnvelopePayload::PresenceOnline(_) => "presence_online",
            EnvelopePayload::PresenceAck(_) => "presence_ack",
            EnvelopePayload::CommunityEvent(_) => "community_event",
            EnvelopePayload::DmFileEvent(_) => "dm_file_event",
            EnvelopePayload::AccountMetadata(_) => "account_metadata",
            EnvelopePayload::Unknown { kind, .. } => kind,
        }
    }
}

impl Envelope {
    /// Build a version-1 envelope around a typed payload.
    pub fn new(payload: &EnvelopePayload) -> Result<Self, EnvelopeError> {
        let value = match payload {
            EnvelopePayload::FriendRequest(p) => serde_json::to_value(p),
            EnvelopePayload::FriendResponse(p) => serde_json::to_value(p),
            EnvelopePayload::FriendAcceptAck(p) => serde_json::to_value(p),
            EnvelopePayload::ChatMessage(p) => serde_json::to_value(p),
            EnvelopePayload::TypingIndicator(p) => serde_json::to_value(p),
            EnvelopePayload::MessageStatus(p) => serde_json::to_value(p),
            EnvelopePayload::GroupInvite(p) => serde_json::to_value(p),
            EnvelopePayload::GroupInviteAccept(p) => serde_json::to_value(p),
            EnvelopePayload::GroupInviteDecline(p) => serde_json::to_value(p),
            EnvelopePayload::GroupMessage(p) => serde_json::to_value(p),
            EnvelopePayload::GroupKeyRotation(p) => serde_json::to_value(p),
            EnvelopePayload::GroupMemberRemoved(p) => serde_json::to_value(p),
            EnvelopePayload::CallOffer(p) => serde_json::to_value(p),
            EnvelopePayload::CallAnswer(p) => serde_json::to_value(p),
            EnvelopePayload::CallIceCandidate(p) => serde_json::to_value(p),
            EnvelopePayload::CallEnd(p) => serde_json::to_value(p),
            EnvelopePayload::CallState(p) => serde_json::to_value(p),
            EnvelopePayload::PresenceOnline(p) => serde_json::to_value(p),
            EnvelopePayload::PresenceAck(p) => serde_json::to_value(p),
            EnvelopePayload::CommunityEvent(v)
            | EnvelopePayload::DmFileEvent(v)
            | EnvelopePayload::AccountMetadata(v) => Ok(v.clone()),
            EnvelopePayload::Unknown { .. } => Ok(serde_json::Value::Null),
        }
        .map_err(EnvelopeError::Serialize)?;

        Ok(Envelope {
            kind: payload.kind().to_string(),
            version: ENVELOPE_VERSION,
            payload: value,
        })
    }

    /// Serialize to the JSON string carried inside a transport frame.
    pub fn to_wire(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Serialize)
    }

    /// Parse the JSON string carried inside a transport frame.
    pub fn from_wire(text: &str) -> Result<Self, EnvelopeError> {
        serde_json::from_str(text).map_err(EnvelopeError::Malformed)
    }

    /// Decode the opaque payload into its typed form.
    ///
    /// An unrecognized `kind`, or a recognized kind at a version other than
    /// [`ENVELOPE_VERSION`], yields [`EnvelopePayload::Unknown`]. A payload
    /// body that does not match its declared kind is an error; callers log
    /// at debug level and drop the envelope.
    pub fn decode(&self) -> Result<EnvelopePayload, EnvelopeError> {
        if self.version != ENVELOPE_VERSION {
            return Ok(EnvelopePayload::Unknown {
                kind: self.kind.clone(),
                version: self.version,
            });
        }

        let mismatch = |source| EnvelopeError::PayloadMismatch {
            kind: self.kind.clone(),
            source,
        };
        let payload = self.payload.clone();

        let decoded = match self.kind.as_str() {
            "friend_request" => {
                EnvelopePayload::FriendRequest(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "friend_response" => {
                EnvelopePayload::FriendResponse(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "friend_accept_ack" => EnvelopePayload::FriendAcceptAck(
                serde_json::from_value(payload).map_err(mismatch)?,
            ),
            "chat_message" => {
                EnvelopePayload::ChatMessage(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "typing_indicator" => EnvelopePayload::TypingIndicator(
                serde_json::from_value(payload).map_err(mismatch)?,
            ),
            "message_status" => {
                EnvelopePayload::MessageStatus(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "group_invite" => {
                EnvelopePayload::GroupInvite(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "group_invite_accept" => EnvelopePayload::GroupInviteAccept(
                serde_json::from_value(payload).map_err(mismatch)?,
            ),
            "group_invite_decline" => EnvelopePayload::GroupInviteDecline(
                serde_json::from_value(payload).map_err(mismatch)?,
            ),
            "group_message" => {
                EnvelopePayload::GroupMessage(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "group_key_rotation" => EnvelopePayload::GroupKeyRotation(
                serde_json::from_value(payload).map_err(mismatch)?,
            ),
            "group_member_removed" => EnvelopePayload::GroupMemberRemoved(
                serde_json::from_value(payload).map_err(mismatch)?,
            ),
            "call_offer" => {
                EnvelopePayload::CallOffer(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "call_answer" => {
                EnvelopePayload::CallAnswer(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "call_ice_candidate" => EnvelopePayload::CallIceCandidate(
                serde_json::from_value(payload).map_err(mismatch)?,
            ),
            "call_end" => {
                EnvelopePayload::CallEnd(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "call_state" => {
                EnvelopePayload::CallState(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "presence_online" => {
                EnvelopePayload::PresenceOnline(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "presence_ack" => {
                EnvelopePayload::PresenceAck(serde_json::from_value(payload).map_err(mismatch)?)
            }
            "community_event" => EnvelopePayload::CommunityEvent(payload),
            "dm_file_event" => EnvelopePayload::DmFileEvent(payload),
            "account_metadata" => EnvelopePayload::AccountMetadata(payload),
            _ => EnvelopePayload::Unknown {
                kind: self.kind.clone(),
                version: self.version,
            },
        };
        Ok(decoded)
    }
}

/// Encode binary data for a JSON field.
pub fn encode_bytes(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a base64 JSON field back to bytes.
pub fn decode_bytes(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    BASE64.decode(text)
}
