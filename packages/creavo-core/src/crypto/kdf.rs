//! # Key Derivation Functions
//!
//! Two derivations feed the AEAD:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    KEY DERIVATION                                       │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Message box key                                                       │
//! │    X25519(secret, peer_public) ──► HKDF-SHA256(info=MESSAGE_BOX)       │
//! │                                     ──► 32-byte AEAD key               │
//! │                                                                         │
//! │  Password key                                                          │
//! │    SHA-512(password ‖ base64(salt)) ──► first 32 bytes                 │
//! │                                     ──► 32-byte AEAD key               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The password derivation is a single hash, which keeps stored blobs
//! compatible with existing clients. It offers no work factor against
//! offline guessing; the salt only prevents precomputation.

use hkdf::Hkdf;
use sha2::{Digest, Sha256, Sha512};
use zeroize::{Zeroize, Zeroizing};

use super::codec;
use super::encryption::EncryptionKey;
use super::wrapping::Salt;
use super::KEY_SIZE;
use crate::error::{Error, Result};

/// Domain separation strings for HKDF
pub mod domain {
    /// Info string for the per-pair message box key
    pub const MESSAGE_BOX: &[u8] = b"creavo-message-box-v1";
}

/// Derive the AEAD key for a sender/recipient pair from their X25519 output
pub fn derive_box_key(dh_output: &[u8; 32]) -> Result<EncryptionKey> {
    let hkdf = Hkdf::<Sha256>::new(None, dh_output);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(domain::MESSAGE_BOX, &mut key[..])
        .map_err(|_| Error::KeyDerivationFailed("HKDF expansion failed".into()))?;
    Ok(EncryptionKey::from_bytes(*key))
}

/// Derive the AEAD key that wraps a secret key under a password
pub fn derive_password_key(password: &str, salt: &Salt) -> EncryptionKey {
    let mut hasher = Sha512::new();
    hasher.update(password.as_bytes());
    hasher.update(codec::encode(salt.as_bytes()).as_bytes());
    let mut digest = hasher.finalize();

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&digest[..KEY_SIZE]);
    digest.as_mut_slice().zeroize();
    EncryptionKey::from_bytes(*key)
}
