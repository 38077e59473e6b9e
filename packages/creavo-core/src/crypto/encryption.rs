//! # Encryption Module
//!
//! Authenticated public-key encryption between two static X25519 keypairs.
//!
//! ## Message Box
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE BOX                                        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SENDER                                                                │
//! │    shared  = X25519(sender_secret, recipient_public)                   │
//! │    key     = HKDF-SHA256(shared, info = "creavo-message-box-v1")       │
//! │    nonce   = 24 random bytes (fresh per message)                       │
//! │    ct      = XChaCha20-Poly1305(key, nonce, plaintext)  (+16-byte tag) │
//! │                                                                         │
//! │  RECIPIENT                                                             │
//! │    shared  = X25519(recipient_secret, sender_public)    [same value]   │
//! │    key     = same HKDF                                                 │
//! │    plain   = open(key, nonce, ct)  or  DecryptionFailed                │
//! │                                                                         │
//! │  Because the shared value is symmetric, the sender can also open its  │
//! │  own message using the recipient's public key.                         │
//! │                                                                         │
//! │  ADMIN COPY                                                            │
//! │    The same plaintext is sealed a second time for the admin public    │
//! │    key under the same nonce. The keys differ, so the nonce is never   │
//! │    reused under one key.                                               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Reporting
//!
//! Every authentication failure reports [`MESSAGE_OPEN_FAILED`]. A wrong key,
//! a flipped bit and a truncated ciphertext are indistinguishable.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::codec;
use super::kdf::derive_box_key;
use super::keys::{PublicKey, SecretKey};
use super::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result, MESSAGE_OPEN_FAILED};

/// Default plaintext cap, in characters
pub const MAX_PLAINTEXT_CHARS: usize = 10_000;

/// Default cap on the base64 ciphertext text, in bytes
pub const MAX_CIPHERTEXT_TEXT_LEN: usize = 20_000;

/// Default cap on the base64 nonce and public key text, in bytes
pub const MAX_SHORT_FIELD_TEXT_LEN: usize = 100;

/// Size limits applied to messages before sealing and on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageLimits {
    /// Longest accepted plaintext, counted in characters
    pub max_plaintext_chars: usize,
    /// Longest accepted base64 ciphertext text
    pub max_ciphertext_len: usize,
    /// Longest accepted base64 nonce text
    pub max_nonce_len: usize,
    /// Longest accepted base64 public key text
    pub max_public_key_len: usize,
}

impl Default for MessageLimits {
    fn default() -> Self {
        Self {
            max_plaintext_chars: MAX_PLAINTEXT_CHARS,
            max_ciphertext_len: MAX_CIPHERTEXT_TEXT_LEN,
            max_nonce_len: MAX_SHORT_FIELD_TEXT_LEN,
            max_public_key_len: MAX_SHORT_FIELD_TEXT_LEN,
        }
    }
}

/// A 24-byte XChaCha20-Poly1305 nonce
///
/// Always generated randomly. 192 bits is large enough that random
/// generation never collides in practice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Parse from base64 text of exactly 24 decoded bytes
    pub fn from_base64(text: &str) -> Result<Self> {
        Ok(Self(codec::decode_exact(text)?))
    }

    /// Encode as base64 text
    pub fn to_base64(&self) -> String {
        codec::encode(&self.0)
    }
}

/// A 256-bit XChaCha20-Poly1305 key
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw key bytes
    pub fn as_inner(&self) -> [u8; KEY_SIZE] {
        self.0
    }
}

/// Output of sealing one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedMessage {
    /// Ciphertext including the 16-byte tag
    pub ciphertext: Vec<u8>,
    /// Nonce used for sealing
    pub nonce: Nonce,
}

impl SealedMessage {
    /// Base64 form for the wire
    pub fn encode(&self) -> EncodedMessage {
        EncodedMessage {
            ciphertext: codec::encode(&self.ciphertext),
            nonce: self.nonce.to_base64(),
        }
    }
}

/// A sealed message plus its admin-readable copy
///
/// Both ciphertexts share `message.nonce`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedWithAdminCopy {
    /// Copy for the recipient
    pub message: SealedMessage,
    /// Copy for the admin key
    pub admin_ciphertext: Vec<u8>,
}

/// Base64 ciphertext and nonce
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedMessage {
    /// Base64 ciphertext
    pub ciphertext: String,
    /// Base64 nonce
    pub nonce: String,
}

// ============================================================================
// AEAD PRIMITIVES
// ============================================================================

/// Seal `plaintext` under `key` and `nonce`
pub(crate) fn seal(key: &EncryptionKey, nonce: &Nonce, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("invalid key: {}", e)))?;

    cipher
        .encrypt(XNonce::from_slice(&nonce.0), plaintext)
        .map_err(|_| Error::EncryptionFailed("AEAD seal failed".into()))
}

/// Open `ciphertext`, returning `None` on any authentication failure
pub(crate) fn open(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
) -> Option<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new_from_slice(&key.0).ok()?;
    cipher
        .decrypt(XNonce::from_slice(&nonce.0), ciphertext)
        .ok()
        .map(Zeroizing::new)
}

fn box_key(ours: &SecretKey, theirs: &PublicKey) -> Result<EncryptionKey> {
    let shared = ours.diffie_hellman(theirs);
    derive_box_key(&shared)
}

fn check_plaintext(plaintext: &str, limits: &MessageLimits) -> Result<()> {
    let chars = plaintext.chars().count();
    if chars > limits.max_plaintext_chars {
        return Err(Error::EncryptionFailed(format!(
            "message is {} characters; the limit is {}",
            chars, limits.max_plaintext_chars
        )));
    }

    let encoded = codec::encoded_len(plaintext.len() + TAG_SIZE);
    if encoded > limits.max_ciphertext_len {
        return Err(Error::EncryptionFailed(format!(
            "encrypted message would be {} bytes; the limit is {}",
            encoded, limits.max_ciphertext_len
        )));
    }

    Ok(())
}

// ============================================================================
// PUBLIC API
// ============================================================================

/// Encrypt a message for `recipient`
///
/// Size limits are checked before any cryptographic work. A fresh nonce is
/// drawn for every call.
pub fn encrypt(
    plaintext: &str,
    recipient: &PublicKey,
    sender: &SecretKey,
    limits: &MessageLimits,
) -> Result<SealedMessage> {
    check_plaintext(plaintext, limits)?;

    let key = box_key(sender, recipient)?;
    let nonce = Nonce::random();
    let ciphertext = seal(&key, &nonce, plaintext.as_bytes())?;

    Ok(SealedMessage { ciphertext, nonce })
}

/// Encrypt a message for `recipient` and for `admin` under one nonce
pub fn encrypt_with_admin_copy(
    plaintext: &str,
    recipient: &PublicKey,
    admin: &PublicKey,
    sender: &SecretKey,
    limits: &MessageLimits,
) -> Result<SealedWithAdminCopy> {
    check_plaintext(plaintext, limits)?;

    let nonce = Nonce::random();
    let recipient_key = box_key(sender, recipient)?;
    let admin_key = box_key(sender, admin)?;

    let ciphertext = seal(&recipient_key, &nonce, plaintext.as_bytes())?;
    let admin_ciphertext = seal(&admin_key, &nonce, plaintext.as_bytes())?;

    Ok(SealedWithAdminCopy {
        message: SealedMessage { ciphertext, nonce },
        admin_ciphertext,
    })
}

/// Decrypt a message exchanged with `peer`
///
/// For an incoming message `peer` is the sender. For one of our own sent
/// messages `peer` is the recipient it was sealed for.
pub fn decrypt(
    ciphertext: &[u8],
    nonce: &Nonce,
    peer: &PublicKey,
    ours: &SecretKey,
) -> Result<String> {
    let key = box_key(ours, peer)?;
    let plaintext = open(&key, nonce, ciphertext)
        .ok_or_else(|| Error::DecryptionFailed(MESSAGE_OPEN_FAILED.into()))?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| Error::DecryptionFailed(MESSAGE_OPEN_FAILED.into()))
}

/// [`encrypt`] with the recipient key given as base64 text
///
/// Key validation failures are reported as `EncryptionFailed`.
pub fn encrypt_encoded(
    plaintext: &str,
    recipient_public_key: &str,
    sender: &SecretKey,
    limits: &MessageLimits,
) -> Result<EncodedMessage> {
    let recipient = PublicKey::from_base64(recipient_public_key)
        .map_err(|e| Error::EncryptionFailed(format!("recipient key rejected: {}", e)))?;
    Ok(encrypt(plaintext, &recipient, sender, limits)?.encode())
}

/// [`decrypt`] with every input given as base64 text
///
/// Codec failures are reported as `DecryptionFailed`.
pub fn decrypt_encoded(
    ciphertext: &str,
    nonce: &str,
    peer_public_key: &str,
    ours: &SecretKey,
) -> Result<String> {
    let ciphertext = codec::decode(ciphertext, None)
        .map_err(|e| Error::DecryptionFailed(format!("ciphertext rejected: {}", e)))?;
    let nonce = Nonce::from_base64(nonce)
        .map_err(|e| Error::DecryptionFailed(format!("nonce rejected: {}", e)))?;
    let peer = PublicKey::from_base64(peer_public_key)
        .map_err(|e| Error::DecryptionFailed(format!("public key rejected: {}", e)))?;

    decrypt(&ciphertext, &nonce, &peer, ours)
}

// ============================================================================
// TESTS
// ============================================================================
