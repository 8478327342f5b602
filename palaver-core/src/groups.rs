// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Group Messaging Engine
//!
//! Groups share a symmetric key distributed via per-recipient wrapping.
//! Creating a group invites every current friend; sending fans out one
//! envelope per member; removing a member rotates the key and distributes
//! the new version to every *remaining* member; the removed peer never
//! sees the new key.

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use uuid::Uuid;

use crate::crypto::{CryptoError, CryptoService, GroupKey, Identity};
use crate::friends::FriendEngine;
use crate::messaging::ConversationId;
use crate::network::{
    decode_bytes, encode_bytes, GroupInviteAcceptPayload, GroupInviteDeclinePayload,
    GroupInvitePayload, GroupKeyRotationPayload, GroupMember, GroupMemberRemovedPayload,
    GroupMessagePayload, MemberRole,
};

/// Group engine errors.
#[derive(Error, Debug)]
pub enum GroupError {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("no pending invite with id {0}")]
    InviteNotFound(String),

    #[error("member not found: {0}")]
    MemberNotFound(String),

    #[error("only an admin may remove members")]
    NotAdmin,

    #[error("stale key version {got}, current is {current}")]
    StaleKeyVersion { got: u32, current: u32 },

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Binary fields were not valid base64.
    #[error("malformed group payload encoding")]
    MalformedEncoding,
}

/// A group this peer belongs to.
pub struct GroupRecord {
    pub group_id: String,
    pub group_name: String,
    pub group_key: GroupKey,
    pub key_version: u32,
    pub members: Vec<GroupMember>,
    pub conversation_id: String,
}

impl GroupRecord {
    pub fn is_member(&self, did: &str) -> bool {
        self.members.iter().any(|m| m.did == did)
    }

    pub fn role_of(&self, did: &str) -> Option<MemberRole> {
        self.members.iter().find(|m| m.did == did).map(|m| m.role)
    }
}

/// An invite awaiting accept/decline. Destroyed on either.
#[derive(Debug, Clone)]
pub struct PendingGroupInvite {
    pub invite_id: String,
    pub group_id: String,
    pub group_name: String,
    pub inviter_did: String,
    pub encrypted_group_key: Vec<u8>,
    pub nonce: Vec<u8>,
    pub key_version: u32,
    pub members: Vec<GroupMember>,
    pub timestamp: i64,
}

/// A decrypted group message.
#[derive(Debug, Clone)]
pub struct GroupMessage {
    pub message_id: String,
    pub group_id: String,
    pub sender_did: String,
    pub content: String,
    pub timestamp: i64,
}

/// Envelopes produced by removing a member.
pub struct RemovalFanout {
    /// `group_member_removed`, addressed to the removed peer.
    pub removed: (String, GroupMemberRemovedPayload),
    /// `group_key_rotation` per remaining member, each with the new key
    /// wrapped for that recipient.
    pub rotations: Vec<(String, GroupKeyRotationPayload)>,
}

/// Group state machine: rosters, keys, invites.
pub struct GroupEngine {
    identity: Identity,
    groups: HashMap<String, GroupRecord>,
    invites: HashMap<String, PendingGroupInvite>,
    seen_messages: HashSet<String>,
}

impl GroupEngine {
    pub fn new(identity: Identity) -> Self {
        GroupEngine {
            identity,
            groups: HashMap::new(),
            invites: HashMap::new(),
            seen_messages: HashSet::new(),
        }
    }

    pub fn group(&self, group_id: &str) -> Option<&GroupRecord> {
        self.groups.get(group_id)
    }

    pub fn group_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.groups.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn pending_invites(&self) -> Vec<&PendingGroupInvite> {
        let mut invites: Vec<&PendingGroupInvite> = self.invites.values().collect();
        invites.sort_by(|a, b| a.invite_id.cmp(&b.invite_id));
        invites
    }

    /// Create a group and build one invite per current friend.
    ///
    /// The creator is the sole admin; invitees join the roster as members so
    /// every recipient of the invite sees the full intended roster.
    pub fn create(
        &mut self,
        crypto: &dyn CryptoService,
        friends: &FriendEngine,
        group_name: &str,
        now: i64,
    ) -> Result<(String, Vec<(String, GroupInvitePayload)>), GroupError> {
        let group_id = Uuid::new_v4().to_string();
        let group_key = crypto.generate_group_key();

        let mut members = vec![GroupMember {
            did: self.identity.did.clone(),
            display_name: self.identity.display_name.clone(),
            role: MemberRole::Admin,
        }];
        for friend in friends.friends() {
            members.push(GroupMember {
                did: friend.did.clone(),
                display_name: friend.display_name.clone(),
                role: MemberRole::Member,
            });
        }

        let mut invites = Vec::new();
        for friend in friends.friends() {
            let (wrapped, nonce) = crypto.wrap_group_key(
                &group_key,
                &self.identity.encryption_key,
                &friend.encryption_key,
            )?;
            invites.push((
                friend.did.clone(),
                GroupInvitePayload {
                    invite_id: Uuid::new_v4().to_string(),
                    group_id: group_id.clone(),
                    group_name: group_name.to_string(),
                    inviter_did: self.identity.did.clone(),
                    encrypted_group_key: encode_bytes(&wrapped),
                    nonce: encode_bytes(&nonce),
                    key_version: 1,
                    members: members.clone(),
                    timestamp: now,
                },
            ));
        }

        self.groups.insert(
            group_id.clone(),
            GroupRecord {
                group_id: group_id.clone(),
                group_name: group_name.to_string(),
                group_key,
                key_version: 1,
                members,
                conversation_id: ConversationId::for_group(&group_id).into(),
            },
        );
        tracing::info!(group_id = %group_id, invites = invites.len(), "group created");

        Ok((group_id, invites))
    }

    /// Store an inbound invite. Duplicates by invite id are idempotent.
    pub fn on_invite(&mut self, payload: &GroupInvitePayload) -> Result<(), GroupError> {
        let encrypted_group_key =
            decode_bytes(&payload.encrypted_group_key).map_err(|_| GroupError::MalformedEncoding)?;
        let nonce = decode_bytes(&payload.nonce).map_err(|_| GroupError::MalformedEncoding)?;

        self.invites.insert(
            payload.invite_id.clone(),
            PendingGroupInvite {
                invite_id: payload.invite_id.clone(),
                group_id: payload.group_id.clone(),
                group_name: payload.group_name.clone(),
                inviter_did: payload.inviter_did.clone(),
                encrypted_group_key,
                nonce,
                key_version: payload.key_version,
                members: payload.members.clone(),
                timestamp: payload.timestamp,
            },
        );
        Ok(())
    }

    /// Accept a stored invite: unwrap the key, store the group (merging self
    /// into the roster if absent), and build the acceptance reply. Returns
    /// the inviter's DID to address the reply to.
    pub fn accept_invite(
        &mut self,
        crypto: &dyn CryptoService,
        friends: &FriendEngine,
        invite_id: &str,
    ) -> Result<(String, GroupInviteAcceptPayload), GroupError> {
        let invite = self
            .invites
            .remove(invite_id)
            .ok_or_else(|| GroupError::InviteNotFound(invite_id.to_string()))?;

        let inviter_key = friends
            .friend(&invite.inviter_did)
            .map(|f| f.encryption_key.clone())
            .ok_or_else(|| GroupError::MemberNotFound(invite.inviter_did.clone()))?;

        let group_key = crypto.unwrap_group_key(
            &invite.encrypted_group_key,
            &invite.nonce,
            &inviter_key,
            &self.identity.encryption_key,
        )?;

        let mut members = invite.members.clone();
        if !members.iter().any(|m| m.did == self.identity.did) {
            members.push(GroupMember {
                did: self.identity.did.clone(),
                display_name: self.identity.display_name.clone(),
                role: MemberRole::Member,
            });
        }

        let record = GroupRecord {
            group_id: invite.group_id.clone(),
            group_name: invite.group_name.clone(),
            group_key,
            key_version: invite.key_version,
            members,
            conversation_id: ConversationId::for_group(&invite.group_id).into(),
        };
        self.groups.insert(invite.group_id.clone(), record);

        let accept = GroupInviteAcceptPayload {
            invite_id: invite.invite_id,
            group_id: invite.group_id,
            member_did: self.identity.did.clone(),
            member_display_name: self.identity.display_name.clone(),
        };
        Ok((invite.inviter_did, accept))
    }

    /// Decline a stored invite. Never creates local state. Returns the reply
    /// and the inviter to address it to.
    pub fn decline_invite(
        &mut self,
        invite_id: &str,
    ) -> Result<(String, GroupInviteDeclinePayload), GroupError> {
        let invite = self
            .invites
            .remove(invite_id)
            .ok_or_else(|| GroupError::InviteNotFound(invite_id.to_string()))?;
        Ok((
            invite.inviter_did.clone(),
            GroupInviteDeclinePayload {
                invite_id: invite.invite_id,
                group_id: invite.group_id,
                member_did: self.identity.did.clone(),
            },
        ))
    }

    /// A peer accepted our invite: make sure they are on the roster.
    pub fn on_invite_accept(&mut self, payload: &GroupInviteAcceptPayload) {
        let Some(group) = self.groups.get_mut(&payload.group_id) else {
            tracing::warn!(group_id = %payload.group_id, "invite acceptance for unknown group");
            return;
        };
        if !group.is_member(&payload.member_did) {
            group.members.push(GroupMember {
                did: payload.member_did.clone(),
                display_name: payload.member_display_name.clone(),
                role: MemberRole::Member,
            });
        }
    }

    /// A peer declined our invite: drop them from the roster. No key
    /// rotation; key rotation is triggered exclusively by member removal.
    pub fn on_invite_decline(&mut self, payload: &GroupInviteDeclinePayload) {
        if let Some(group) = self.groups.get_mut(&payload.group_id) {
            group.members.retain(|m| m.did != payload.member_did);
        }
    }

    /// Encrypt once and fan out one envelope per member other than self.
    pub fn send(
        &mut self,
        crypto: &dyn CryptoService,
        group_id: &str,
        text: &str,
        now: i64,
    ) -> Result<(String, Vec<(String, GroupMessagePayload)>), GroupError> {
        let group = self
            .groups
            .get(group_id)
            .ok_or_else(|| GroupError::GroupNotFound(group_id.to_string()))?;

        let message_id = Uuid::new_v4().to_string();
        let (ciphertext, nonce) = crypto.encrypt_group(text.as_bytes(), &group.group_key)?;
        let ciphertext = encode_bytes(&ciphertext);
        let nonce = encode_bytes(&nonce);

        let fanout = group
            .members
            .iter()
            .filter(|m| m.did != self.identity.did)
            .map(|m| {
                (
                    m.did.clone(),
                    GroupMessagePayload {
                        message_id: message_id.clone(),
                        group_id: group_id.to_string(),
                        sender_did: self.identity.did.clone(),
                        ciphertext: ciphertext.clone(),
                        nonce: nonce.clone(),
                        key_version: group.key_version,
                        timestamp: now,
                    },
                )
            })
            .collect();

        Ok((message_id, fanout))
    }

    /// Decrypt an inbound group message. Duplicates are ignored; a message
    /// under a different key version than ours is dropped (stale or
    /// not-yet-received key).
    pub fn on_group_message(
        &mut self,
        crypto: &dyn CryptoService,
        payload: &GroupMessagePayload,
    ) -> Result<Option<GroupMessage>, GroupError> {
        let group = self
            .groups
            .get(&payload.group_id)
            .ok_or_else(|| GroupError::GroupNotFound(payload.group_id.clone()))?;

        if self.seen_messages.contains(&payload.message_id) {
            return Ok(None);
        }
        if payload.key_version != group.key_version {
            return Err(GroupError::StaleKeyVersion {
                got: payload.key_version,
                current: group.key_version,
            });
        }

        let ciphertext =
            decode_bytes(&payload.ciphertext).map_err(|_| GroupError::MalformedEncoding)?;
        let nonce = decode_bytes(&payload.nonce).map_err(|_| GroupError::MalformedEncoding)?;
        let plaintext = crypto.decrypt_group(&ciphertext, &nonce, &group.group_key)?;
        let content = String::from_utf8(plaintext).map_err(|_| GroupError::MalformedEncoding)?;

        self.seen_messages.insert(payload.message_id.clone());
        Ok(Some(GroupMessage {
            message_id: payload.message_id.clone(),
            group_id: payload.group_id.clone(),
            sender_did: payload.sender_did.clone(),
            content,
            timestamp: payload.timestamp,
        }))
    }

    /// Remove a member: strip them from the roster, rotate the key, inform
    /// the removed peer, and distribute the new key to every remaining
    /// member. The removed peer must never receive the new key.
    pub fn remove_member(
        &mut self,
        crypto: &dyn CryptoService,
        friends: &FriendEngine,
        group_id: &str,
        member_did: &str,
    ) -> Result<RemovalFanout, GroupError> {
        let group = self
            .groups
            .get_mut(group_id)
            .ok_or_else(|| GroupError::GroupNotFound(group_id.to_string()))?;

        if group.role_of(&self.identity.did) != Some(MemberRole::Admin) {
            return Err(GroupError::NotAdmin);
        }
        if !group.is_member(member_did) {
            return Err(GroupError::MemberNotFound(member_did.to_string()));
        }

        group.members.retain(|m| m.did != member_did);
        group.group_key = crypto.generate_group_key();
        group.key_version += 1;
        tracing::info!(group_id, removed = member_did, key_version = group.key_version, "member removed, key rotated");

        let removed = (
            member_did.to_string(),
            GroupMemberRemovedPayload {
                group_id: group_id.to_string(),
                removed_did: member_did.to_string(),
            },
        );

        let mut rotations = Vec::new();
        for member in group.members.iter().filter(|m| m.did != self.identity.did) {
            let Some(friend) = friends.friend(&member.did) else {
                tracing::warn!(member = %member.did, "no keys for remaining member, skipping rotation delivery");
                continue;
            };
            let (wrapped, nonce) = crypto.wrap_group_key(
                &group.group_key,
                &self.identity.encryption_key,
                &friend.encryption_key,
            )?;
            rotations.push((
                member.did.clone(),
                GroupKeyRotationPayload {
                    group_id: group_id.to_string(),
                    encrypted_group_key: encode_bytes(&wrapped),
                    nonce: encode_bytes(&nonce),
                    key_version: group.key_version,
                },
            ));
        }

        Ok(RemovalFanout { removed, rotations })
    }

    /// Install a rotated key from the group's admin. Versions only advance.
    pub fn on_key_rotation(
        &mut self,
        crypto: &dyn CryptoService,
        friends: &FriendEngine,
        sender_did: &str,
        payload: &GroupKeyRotationPayload,
    ) -> Result<(), GroupError> {
        let group = self
            .groups
            .get_mut(&payload.group_id)
            .ok_or_else(|| GroupError::GroupNotFound(payload.group_id.clone()))?;

        if payload.key_version <= group.key_version {
            return Err(GroupError::StaleKeyVersion {
                got: payload.key_version,
                current: group.key_version,
            });
        }

        let sender_key = friends
            .friend(sender_did)
            .map(|f| f.encryption_key.clone())
            .ok_or_else(|| GroupError::MemberNotFound(sender_did.to_string()))?;

        let wrapped =
            decode_bytes(&payload.encrypted_group_key).map_err(|_| GroupError::MalformedEncoding)?;
        let nonce = decode_bytes(&payload.nonce).map_err(|_| GroupError::MalformedEncoding)?;
        group.group_key = crypto.unwrap_group_key(
            &wrapped,
            &nonce,
            &sender_key,
            &self.identity.encryption_key,
        )?;
        group.key_version = payload.key_version;
        Ok(())
    }

    /// We (or someone else) got removed. If it is us, the whole group goes;
    /// otherwise just the roster entry.
    pub fn on_member_removed(&mut self, payload: &GroupMemberRemovedPayload) -> bool {
        if payload.removed_did == self.identity.did {
            let existed = self.groups.remove(&payload.group_id).is_some();
            if existed {
                tracing::info!(group_id = %payload.group_id, "removed from group");
            }
            existed
        } else {
            if let Some(group) = self.groups.get_mut(&payload.group_id) {
                group.members.retain(|m| m.did != payload.removed_did);
            }
            false
        }
    }
}
