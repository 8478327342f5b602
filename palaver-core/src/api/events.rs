//! Event System
//!
//! Callbacks for engine events. Multiple independent application components
//! may observe the same client; they all subscribe here.

use std::sync::Arc;

use crate::calls::CallSignal;
use crate::groups::GroupMessage;
use crate::messaging::TrackedMessage;
use crate::network::MessageStatus;
use crate::network::SessionState;

/// Events emitted by the client.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Connection session state changed.
    ConnectionStateChanged { state: SessionState },

    /// Every reconnection attempt across the server pool failed. The client
    /// stays offline until an explicit connect or foreground trigger.
    ReconnectionExhausted,

    /// An incoming friend request awaits a decision.
    FriendRequestReceived {
        request_id: String,
        from_did: String,
        display_name: String,
        message: Option<String>,
    },

    /// A friend record was created (either handshake side).
    FriendAdded { did: String },

    /// The peer declined our friend request.
    FriendRequestDeclined { peer_did: String },

    /// A direct message arrived.
    MessageReceived { message: TrackedMessage },

    /// A thread reply arrived.
    ThreadReplyReceived { message: TrackedMessage },

    /// A sent message's status advanced.
    MessageStatusChanged {
        message_id: String,
        status: MessageStatus,
    },

    /// A peer started or stopped typing.
    TypingIndicator {
        sender_did: String,
        conversation_id: String,
        typing: bool,
    },

    /// An invitation to join a group arrived.
    GroupInviteReceived {
        invite_id: String,
        group_id: String,
        group_name: String,
        inviter_did: String,
    },

    /// A peer accepted our group invite.
    GroupMemberJoined { group_id: String, member_did: String },

    /// A peer declined our group invite.
    GroupInviteDeclined { group_id: String, member_did: String },

    /// A peer left the roster (removed by an admin).
    GroupMemberLeft { group_id: String, member_did: String },

    /// A group message arrived.
    GroupMessageReceived { message: GroupMessage },

    /// The group key was rotated to a new version.
    GroupKeyRotated { group_id: String, key_version: u32 },

    /// We were removed from a group.
    RemovedFromGroup { group_id: String },

    /// An inbound call signaling event, for the external call manager.
    CallSignalReceived { signal: CallSignal },

    /// A peer's reachability changed.
    PresenceChanged { did: String, online: bool },

    /// Opaque community event (invite codes and the like).
    CommunityEvent {
        from_did: String,
        payload: serde_json::Value,
    },

    /// Opaque direct-message file transfer event.
    FileEvent {
        from_did: String,
        payload: serde_json::Value,
    },

    /// Opaque account metadata update from a peer.
    AccountMetadata {
        from_did: String,
        payload: serde_json::Value,
    },

    /// The relay reported an error.
    RelayError { message: String },
}

/// Event handler trait.
///
/// Implement this trait to receive client events.
pub trait EventHandler: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: ClientEvent);
}

/// Simple callback-based event handler.
///
/// Wraps a closure for easy event handling.
pub struct CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    /// Creates a new callback handler.
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> EventHandler for CallbackHandler<F>
where
    F: Fn(ClientEvent) + Send + Sync,
{
    fn on_event(&self, event: ClientEvent) {
        (self.callback)(event);
    }
}

/// Event dispatcher for managing multiple handlers.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    pub fn new() -> Self {
        EventDispatcher {
            handlers: Vec::new(),
        }
    }

    /// Adds an event handler.
    pub fn add_handler(&mut self, handler: Arc<dyn EventHandler>) {
        self.handlers.push(handler);
    }

    /// Removes all handlers.
    pub fn clear_handlers(&mut self) {
        self.handlers.clear();
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Dispatches an event to all handlers.
    pub fn dispatch(&self, event: ClientEvent) {
        for handler in &self.handlers {
            handler.on_event(event.clone());
        }
    }
}
