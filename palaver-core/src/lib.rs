//! Palaver Core Library
//!
//! Client-side relay protocol engine for encrypted messaging: one outbound
//! connection, typed envelopes, friend/group/call state machines, presence,
//! and automatic reconnection with backoff across a pool of relay servers.
//!
//! Encryption primitives, persistent storage, and UI are external
//! collaborators; this crate consumes crypto through the
//! [`crypto::CryptoService`] seam and never performs its own.

pub mod api;
pub mod calls;
pub mod crypto;
pub mod friends;
pub mod groups;
pub mod messaging;
pub mod network;
pub mod presence;

pub use api::{
    ClientConfig, ClientError, ClientEvent, ClientResult, ConnectionStatus, EventHandler,
    PalaverClient,
};
pub use calls::CallSignal;
pub use crypto::{CryptoContext, CryptoError, CryptoService, GroupKey, Identity, MockCryptoService};
pub use friends::{FriendEngine, FriendError, FriendRecord, PendingRequest};
pub use groups::{GroupEngine, GroupError, GroupMessage, GroupRecord, PendingGroupInvite};
pub use messaging::{ConversationId, MessageChannel, MessagingError, TrackedMessage};
pub use network::{
    ConnectionManager, Envelope, EnvelopePayload, MessageStatus, MockTransport, NetworkError,
    ReconnectConfig, ReconnectManager, ReconnectState, SessionState, Transport, TransportConfig,
};
#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub use network::WebSocketTransport;
pub use presence::PresenceTracker;
