// SPDX-FileCopyrightText: 2026 Palaver Contributors
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Identity & Crypto Service
//!
//! This core does not perform its own encryption. All key material handling
//! and cipher operations are consumed through the [`CryptoService`] trait,
//! implemented by the platform's identity/crypto layer. The engine only
//! requires that `encrypt` and `decrypt` are symmetric for the two endpoints
//! of a conversation: both sides pass the same context
//! `(sender_did, recipient_did, timestamp, conversation_id)` and the same
//! unordered key pair.
//!
//! [`MockCryptoService`] provides a deterministic, tamper-evident stand-in
//! for tests and in-process wiring; it is not encryption.

use rand::RngCore;
use ring::digest;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Nonce length used on the wire (AES-GCM / ChaCha20-Poly1305 layouts).
pub const NONCE_SIZE: usize = 12;

/// Symmetric group key length.
pub const GROUP_KEY_SIZE: usize = 32;

/// Crypto service errors.
///
/// A decryption failure is deliberately opaque: the receiver cannot
/// distinguish tampering from a stale key, and must not leak that signal.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// Binding context for a single encrypted message.
///
/// Both endpoints derive the same context independently; it acts as
/// associated data so a ciphertext cannot be replayed across conversations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CryptoContext {
    pub sender_did: String,
    pub recipient_did: String,
    pub timestamp: i64,
    pub conversation_id: String,
}

/// A symmetric group key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct GroupKey([u8; GROUP_KEY_SIZE]);

impl GroupKey {
    pub fn from_bytes(bytes: [u8; GROUP_KEY_SIZE]) -> Self {
        GroupKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; GROUP_KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key bytes.
        f.write_str("GroupKey(..)")
    }
}

/// The local peer's identity as seen by this engine: a stable DID plus the
/// public halves of its keypairs, hex-encoded. Private keys stay inside the
/// crypto service implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub did: String,
    pub display_name: String,
    /// Ed25519 signing public key, hex.
    pub signing_key: String,
    /// X25519 encryption public key, hex.
    pub encryption_key: String,
}

/// External encryption/decryption provider.
///
/// `sender_key`/`recipient_key` are the hex public keys of the two endpoints;
/// the implementation resolves private material internally. Implementations
/// must be deterministic with respect to the *unordered* key pair so either
/// endpoint can decrypt what the other encrypted under the mirrored context.
pub trait CryptoService: Send {
    /// Encrypt `plaintext` for a peer. Returns `(ciphertext, nonce)`.
    fn encrypt(
        &self,
        plaintext: &[u8],
        sender_key: &str,
        recipient_key: &str,
        context: &CryptoContext,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError>;

    /// Decrypt a peer's ciphertext with the mirrored context.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        sender_key: &str,
        recipient_key: &str,
        context: &CryptoContext,
    ) -> Result<Vec<u8>, CryptoError>;

    /// Generate a fresh symmetric group key.
    fn generate_group_key(&self) -> GroupKey;

    /// Wrap a group key for one recipient. Returns `(wrapped, nonce)`.
    fn wrap_group_key(
        &self,
        key: &GroupKey,
        sender_key: &str,
        recipient_key: &str,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError>;

    /// Unwrap a group key wrapped by a peer.
    fn unwrap_group_key(
        &self,
        wrapped: &[u8],
        nonce: &[u8],
        sender_key: &str,
        recipient_key: &str,
    ) -> Result<GroupKey, CryptoError>;

    /// Encrypt under a symmetric group key. Returns `(ciphertext, nonce)`.
    fn encrypt_group(
        &self,
        plaintext: &[u8],
        key: &GroupKey,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError>;

    /// Decrypt under a symmetric group key.
    fn decrypt_group(
        &self,
        ciphertext: &[u8],
        nonce: &[u8],
        key: &GroupKey,
    ) -> Result<Vec<u8>, CryptoError>;
}

// ---------------------------------------------------------------------------
// Mock implementation
// ---------------------------------------------------------------------------

const TAG_LEN: usize = 8;

/// Deterministic stand-in for the platform crypto layer.
///
/// "Ciphertext" is `plaintext || tag` where the tag binds the unordered key
/// pair, the context, and the plaintext. Any modification of the ciphertext
/// or a context mismatch makes `decrypt` fail, which is the only property
/// the engine's tests rely on.
#[derive(Debug, Default, Clone)]
pub struct MockCryptoService;

impl MockCryptoService {
    pub fn new() -> Self {
        MockCryptoService
    }

    /// Generate a throwaway identity with random key material.
    pub fn generate_identity(display_name: &str) -> Identity {
        let mut rng = rand::thread_rng();
        let mut seed = [0u8; 16];
        rng.fill_bytes(&mut seed);
        let mut signing = [0u8; 32];
        rng.fill_bytes(&mut signing);
        let mut encryption = [0u8; 32];
        rng.fill_bytes(&mut encryption);

        Identity {
            did: format!("did:key:z6Mk{}", hex::encode(seed)),
            display_name: display_name.to_string(),
            signing_key: hex::encode(signing),
            encryption_key: hex::encode(encryption),
        }
    }

    fn pair_tag(sender_key: &str, recipient_key: &str, context: &CryptoContext, body: &[u8]) -> [u8; TAG_LEN] {
        // Unordered pair: both endpoints compute the same binding.
        let (first, second) = if sender_key <= recipient_key {
            (sender_key, recipient_key)
        } else {
            (recipient_key, sender_key)
        };
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(first.as_bytes());
        ctx.update(b"|");
        ctx.update(second.as_bytes());
        ctx.update(b"|");
        ctx.update(context.sender_did.as_bytes());
        ctx.update(b"|");
        ctx.update(context.recipient_did.as_bytes());
        ctx.update(b"|");
        ctx.update(&context.timestamp.to_be_bytes());
        ctx.update(b"|");
        ctx.update(context.conversation_id.as_bytes());
        ctx.update(b"|");
        ctx.update(body);
        let hash = ctx.finish();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&hash.as_ref()[..TAG_LEN]);
        tag
    }

    fn keyed_tag(key: &[u8], body: &[u8]) -> [u8; TAG_LEN] {
        let mut ctx = digest::Context::new(&digest::SHA256);
        ctx.update(key);
        ctx.update(b"|");
        ctx.update(body);
        let hash = ctx.finish();
        let mut tag = [0u8; TAG_LEN];
        tag.copy_from_slice(&hash.as_ref()[..TAG_LEN]);
        tag
    }

    fn random_nonce() -> Vec<u8> {
        let mut nonce = vec![0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);
        nonce
    }
}

impl CryptoService for MockCryptoService {
    fn encrypt(
        &self,
        plaintext: &[u8],
        sender_key: &str,
        recipient_key: &str,
        context: &CryptoContext,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let tag = Self::pair_tag(sender_key, recipient_key, context, plaintext);
        let mut ciphertext = Vec::with_capacity(plaintext.len() + TAG_LEN);
        ciphertext.extend_from_slice(plaintext);
        ciphertext.extend_from_slice(&tag);
        Ok((ciphertext, Self::random_nonce()))
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        _nonce: &[u8],
        sender_key: &str,
        recipient_key: &str,
        context: &CryptoContext,
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
        let expected = Self::pair_tag(sender_key, recipient_key, context, body);
        if tag != expected {
            return Err(CryptoError::DecryptionFailed);
        }
        Ok(body.to_vec())
    }

    fn generate_group_key(&self) -> GroupKey {
        let mut key = [0u8; GROUP_KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        GroupKey::from_bytes(key)
    }

    fn wrap_group_key(
        &self,
        key: &GroupKey,
        sender_key: &str,
        recipient_key: &str,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        // Reuse the pair binding with an empty context: the wrap is only
        // bound to the two endpoints, not to a conversation.
        let context = CryptoContext {
            sender_did: String::new(),
            recipient_did: String::new(),
            timestamp: 0,
            conversation_id: String::new(),
        };
        let tag = Self::pair_tag(sender_key, recipient_key, &context, key.as_bytes());
        let mut wrapped = Vec::with_capacity(GROUP_KEY_SIZE + TAG_LEN);
        wrapped.extend_from_slice(key.as_bytes());
        wrapped.extend_from_slice(&tag);
        Ok((wrapped, Self::random_nonce()))
    }

    fn unwrap_group_key(
        &self,
        wrapped: &[u8],
        _nonce: &[u8],
        sender_key: &str,
        recipient_key: &str,
    ) -> Result<GroupKey, CryptoError> {
        if wrapped.len() != GROUP_KEY_SIZE + TAG_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (body, tag) = wrapped.split_at(GROUP_KEY_SIZE);
        let context = CryptoContext {
            sender_did: String::new(),
            recipient_did: String::new(),
            timestamp: 0,
            conversation_id: String::new(),
        };
        let expected = Self::pair_tag(sender_key, recipient_key, &context, body);
        if tag != expected {
            return Err(CryptoError::DecryptionFailed);
        }
        let mut key = [0u8; GROUP_KEY_SIZE];
        key.copy_from_slice(body);
        Ok(GroupKey::from_bytes(key))
    }

    fn encrypt_group(
        &self,
        plaintext: &[u8],
        key: &GroupKey,
    ) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let tag = Self::keyed_tag(key.as_bytes(), plaintext);
        let mut ciphertext = Vec::with_capacity(plaintext.len() + TAG_LEN);
        ciphertext.extend_from_slice(plaintext);
        ciphertext.extend_from_slice(&tag);
        Ok((ciphertext, Self::random_nonce()))
    }

    fn decrypt_group(
        &self,
        ciphertext: &[u8],
        _nonce: &[u8],
        key: &GroupKey,
    ) -> Result<Vec<u8>, CryptoError> {
        if ciphertext.len() < TAG_LEN {
            return Err(CryptoError::DecryptionFailed);
        }
        let (body, tag) = ciphertext.split_at(ciphertext.len() - TAG_LEN);
        let expected = Self::keyed_tag(key.as_bytes(), body);
        if tag != expected {
            return Err(CryptoError::DecryptionFailed);
        }
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CryptoContext {
        CryptoContext {
            sender_did: "did:key:z6MkAlice".to_string(),
            recipient_did: "did:key:z6MkBob".to_string(),
            timestamp: 1_700_000_000,
            conversation_id: "conv-1".to_string(),
        }
    }

    #[test]
    fn mock_round_trip() {
        let crypto = MockCryptoService::new();
        let ctx = context();
        let (ct, nonce) = crypto.encrypt(b"hello", "key-a", "key-b", &ctx).unwrap();
        // The mirrored call swaps key order; the unordered pair must match.
        let plain = crypto.decrypt(&ct, &nonce, "key-b", "key-a", &ctx).unwrap();
        assert_eq!(plain, b"hello");
    }

    #[test]
    fn tampered_ciphertext_fails() {
        let crypto = MockCryptoService::new();
        let ctx = context();
        let (mut ct, nonce) = crypto.encrypt(b"hello", "key-a", "key-b", &ctx).unwrap();
        ct[0] ^= 0xff;
        assert!(crypto.decrypt(&ct, &nonce, "key-a", "key-b", &ctx).is_err());
    }

    #[test]
    fn context_mismatch_fails() {
        let crypto = MockCryptoService::new();
        let (ct, nonce) = crypto.encrypt(b"hello", "key-a", "key-b", &context()).unwrap();
        let mut wrong = context();
        wrong.conversation_id = "conv-2".to_string();
        assert!(crypto.decrypt(&ct, &nonce, "key-a", "key-b", &wrong).is_err());
    }

    #[test]
    fn group_key_wrap_round_trip() {
        let crypto = MockCryptoService::new();
        let key = crypto.generate_group_key();
        let (wrapped, nonce) = crypto.wrap_group_key(&key, "key-a", "key-b").unwrap();
        let unwrapped = crypto
            .unwrap_group_key(&wrapped, &nonce, "key-a", "key-b")
            .unwrap();
        assert_eq!(unwrapped.as_bytes(), key.as_bytes());

        // A third party cannot unwrap.
        assert!(crypto
            .unwrap_group_key(&wrapped, &nonce, "key-a", "key-eve")
            .is_err());
    }

    #[test]
    fn group_keys_are_distinct() {
        let crypto = MockCryptoService::new();
        let a = crypto.generate_group_key();
        let b = crypto.generate_group_key();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
