//! Network + Transport Layer
//!
//! The relay protocol engine's transport side: wire frames, the envelope
//! codec, the transport abstraction, and the connection/reconnection
//! managers.
//!
//! # Architecture
//!
//! - **Frames**: transport-level JSON control frames exchanged with the relay
//! - **Envelope codec**: typed, versioned application payloads
//! - **Transport trait**: platform-agnostic interface for network I/O
//! - **Connection manager**: registration handshake, keep-alive, replay
//! - **Reconnection manager**: backoff/failover state machine
//!
//! # Example
//!
//! ```ignore
//! use palaver_core::network::{ConnectionManager, MockTransport};
//!
//! let mut conn = ConnectionManager::new(MockTransport::new(), did, keep_alive);
//! conn.establish("ws://relay.example.com")?;
//! while let Some(frame) = conn.receive(Instant::now())? {
//!     // dispatch
//! }
//! ```

#[cfg(feature = "testing")]
pub mod connection;
#[cfg(not(feature = "testing"))]
mod connection;

#[cfg(feature = "testing")]
pub mod envelope;
#[cfg(not(feature = "testing"))]
mod envelope;

#[cfg(feature = "testing")]
pub mod error;
#[cfg(not(feature = "testing"))]
mod error;

#[cfg(feature = "testing")]
pub mod frame;
#[cfg(not(feature = "testing"))]
mod frame;

#[cfg(feature = "testing")]
pub mod mock;
#[cfg(not(feature = "testing"))]
mod mock;

#[cfg(feature = "testing")]
pub mod reconnect;
#[cfg(not(feature = "testing"))]
mod reconnect;

#[cfg(feature = "testing")]
pub mod transport;
#[cfg(not(feature = "testing"))]
mod transport;

#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub mod websocket;

// Error types
pub use error::{NetworkError, NetworkResult};

// Wire frames
pub use frame::{
    decode_server_frame, encode_client_frame, ClientFrame, OfflineMessage, ServerFrame,
};

// Envelope codec
pub use envelope::{
    decode_bytes, encode_bytes, CallAnswerPayload, CallEndPayload, CallIceCandidatePayload,
    CallOfferPayload, CallStatePayload, ChatMessagePayload, Envelope, EnvelopeError,
    EnvelopePayload, FriendAcceptAckPayload, FriendRequestPayload, FriendResponsePayload,
    GroupInviteAcceptPayload, GroupInviteDeclinePayload, GroupInvitePayload,
    GroupKeyRotationPayload, GroupMember, GroupMemberRemovedPayload, GroupMessagePayload,
    MemberRole, MessageStatus, MessageStatusPayload, PresencePayload, TypingIndicatorPayload,
    ENVELOPE_VERSION,
};

// Transport abstraction
pub use transport::{SocketState, Transport, TransportConfig, TransportResult};

// Mock transport for testing
pub use mock::MockTransport;

// WebSocket transport for production
#[cfg(any(feature = "network-native-tls", feature = "network-rustls"))]
pub use websocket::WebSocketTransport;

// Connection management
pub use connection::{ConnectionManager, SessionState};

// Reconnection management
pub use reconnect::{LossOutcome, ReconnectConfig, ReconnectManager, ReconnectState};
