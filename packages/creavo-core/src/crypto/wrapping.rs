//! # Password Wrapping
//!
//! Seals the 32-byte secret key under a password for storage.
//!
//! ```text
//! salt   = 16 random bytes (fresh per wrap)
//! nonce  = 24 random bytes (fresh per wrap)
//! key    = SHA-512(password ‖ base64(salt))[0..32]
//! blob   = XChaCha20-Poly1305(key, nonce, secret_key)   → 48 bytes
//! ```
//!
//! Unwrapping with the wrong password and unwrapping a corrupted blob fail
//! with the same error text, [`WRONG_PASSWORD_OR_CORRUPTED`].

use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::codec;
use super::encryption::{open, seal, Nonce};
use super::kdf::derive_password_key;
use super::keys::SecretKey;
use super::{SALT_SIZE, SECRET_KEY_SIZE, TAG_SIZE};
use crate::error::{Error, Result, WRONG_PASSWORD_OR_CORRUPTED};

/// Size of a wrapped secret key in bytes
pub const WRAPPED_KEY_SIZE: usize = SECRET_KEY_SIZE + TAG_SIZE;

/// A 16-byte password salt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Salt([u8; SALT_SIZE]);

impl Salt {
    /// Generate a random salt
    pub fn random() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from existing bytes
    pub fn from_bytes(bytes: [u8; SALT_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    /// Parse from base64 text of exactly 16 decoded bytes
    pub fn from_base64(text: &str) -> Result<Self> {
        Ok(Self(codec::decode_exact(text)?))
    }

    /// Encode as base64 text
    pub fn to_base64(&self) -> String {
        codec::encode(&self.0)
    }
}

/// A secret key sealed under a password
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedSecretKey {
    /// Sealed secret key (ciphertext + tag)
    pub ciphertext: Vec<u8>,
    /// Nonce used for sealing
    pub nonce: Nonce,
    /// Salt mixed into the password key
    pub salt: Salt,
}

/// Base64 form of [`WrappedSecretKey`], as stored and exported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedWrappedKey {
    /// Base64 sealed secret key
    pub encrypted_secret_key: String,
    /// Base64 24-byte nonce
    pub key_nonce: String,
    /// Base64 16-byte salt
    pub key_salt: String,
}

impl WrappedSecretKey {
    /// Encode every field as base64
    pub fn encode(&self) -> EncodedWrappedKey {
        EncodedWrappedKey {
            encrypted_secret_key: codec::encode(&self.ciphertext),
            key_nonce: self.nonce.to_base64(),
            key_salt: self.salt.to_base64(),
        }
    }

    /// Decode and validate every field
    ///
    /// A nonce or salt of the wrong length is rejected here, before any
    /// decryption is attempted.
    pub fn decode(encoded: &EncodedWrappedKey) -> Result<Self> {
        Ok(Self {
            ciphertext: codec::decode(&encoded.encrypted_secret_key, None)?,
            nonce: Nonce::from_base64(&encoded.key_nonce)?,
            salt: Salt::from_base64(&encoded.key_salt)?,
        })
    }
}

/// Seal `secret` under `password` with a fresh salt and nonce
pub fn wrap(secret: &SecretKey, password: &str) -> Result<WrappedSecretKey> {
    let salt = Salt::random();
    let nonce = Nonce::random();
    let key = derive_password_key(password, &salt);
    let ciphertext = seal(&key, &nonce, secret.expose_bytes())?;

    Ok(WrappedSecretKey {
        ciphertext,
        nonce,
        salt,
    })
}

/// Recover the secret key from a wrapped blob
///
/// A failed open reports [`WRONG_PASSWORD_OR_CORRUPTED`]. A plaintext of the
/// wrong length is a `KeyValidation` error.
pub fn unwrap(wrapped: &WrappedSecretKey, password: &str) -> Result<SecretKey> {
    let key = derive_password_key(password, &wrapped.salt);
    let plaintext = open(&key, &wrapped.nonce, &wrapped.ciphertext)
        .ok_or_else(|| Error::DecryptionFailed(WRONG_PASSWORD_OR_CORRUPTED.into()))?;

    SecretKey::from_slice(&plaintext)
}
