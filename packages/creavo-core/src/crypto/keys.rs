//! # Key Management
//!
//! Static X25519 keys for the asymmetric message channel.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY TYPES                                      │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  KeyPair                                                               │
//! │  ├── PublicKey  (32 bytes)  published to the key directory             │
//! │  └── SecretKey  (32 bytes)  stored only password-wrapped,              │
//! │                             zeroized on drop                           │
//! │                                                                         │
//! │  Both halves come from one generation call; a pair is never           │
//! │  assembled from independently supplied parts.                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::codec;
use super::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE};
use crate::error::{Error, Result};

/// A freshly generated X25519 keypair
#[derive(Clone)]
pub struct KeyPair {
    public: PublicKey,
    secret: SecretKey,
}

impl KeyPair {
    /// Generate a new random keypair from the OS RNG
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self {
            public: PublicKey(public.to_bytes()),
            secret: SecretKey(secret.to_bytes()),
        }
    }

    /// The public half
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// The secret half
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Split into `(public, secret)`
    pub fn into_parts(self) -> (PublicKey, SecretKey) {
        (self.public, self.secret)
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A 32-byte X25519 public key
///
/// Serializes as canonical base64, the form it takes in the key directory.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PublicKey {
    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    /// Parse from base64 text
    ///
    /// Malformed text is a `Codec` error; well-formed text of the wrong
    /// length is a `KeyValidation` error.
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = codec::decode(text, None)?;
        let bytes: [u8; PUBLIC_KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
            Error::KeyValidation(format!(
                "public key must be {} bytes, got {}",
                PUBLIC_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Encode as base64 text
    pub fn to_base64(&self) -> String {
        codec::encode(&self.0)
    }

    /// Short hex fingerprint for display and logs
    ///
    /// First 8 bytes of SHA-256 over the key, hex encoded.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        PublicKey::from_base64(&text).map_err(serde::de::Error::custom)
    }
}

/// A 32-byte X25519 secret key
///
/// Zeroized on drop. `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_KEY_SIZE]);

impl SecretKey {
    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; SECRET_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Build from a recovered plaintext, checking its length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; SECRET_KEY_SIZE] = bytes.try_into().map_err(|_| {
            Error::KeyValidation(format!(
                "secret key must be {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    /// Parse from base64 text
    pub fn from_base64(text: &str) -> Result<Self> {
        let bytes = Zeroizing::new(codec::decode(text, None)?);
        Self::from_slice(&bytes)
    }

    /// Encode as base64 text
    ///
    /// Only for session storage. Never log the result.
    pub fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(codec::encode(&self.0))
    }

    /// Raw bytes
    pub(crate) fn expose_bytes(&self) -> &[u8; SECRET_KEY_SIZE] {
        &self.0
    }

    /// The public key that belongs to this secret
    pub fn public_key(&self) -> PublicKey {
        let secret = StaticSecret::from(self.0);
        PublicKey(X25519PublicKey::from(&secret).to_bytes())
    }

    /// X25519 Diffie-Hellman with a peer's public key
    ///
    /// Symmetric: `a.diffie_hellman(B) == b.diffie_hellman(A)`.
    pub fn diffie_hellman(&self, their_public: &PublicKey) -> Zeroizing<[u8; 32]> {
        let secret = StaticSecret::from(self.0);
        let theirs = X25519PublicKey::from(their_public.0);
        Zeroizing::new(secret.diffie_hellman(&theirs).to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_keypair() {
        let kp = KeyPair::generate();
        assert_eq!(kp.secret_key().public_key(), *kp.public_key());
        assert_eq!(kp.public_key().as_bytes().len(), 32);
    }

    #[test]
    fn test_keypairs_are_unique() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_diffie_hellman_symmetric() {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();

        let ab = alice.secret_key().diffie_hellman(bob.public_key());
        let ba = bob.secret_key().diffie_hellman(alice.public_key());
        assert_eq!(*ab, *ba);
    }

    #[test]
    fn test_public_key_base64_round_trip() {
        let kp = KeyPair::generate();
        let text = kp.public_key().to_base64();
        assert_eq!(PublicKey::from_base64(&text).unwrap(), *kp.public_key());
    }

    #[test]
    fn test_public_key_wrong_length() {
        let text = codec::encode(&[1u8; 31]);
        assert!(matches!(
            PublicKey::from_base64(&text),
            Err(Error::KeyValidation(_))
        ));
        assert!(matches!(PublicKey::from_base64("%%%"), Err(Error::Codec(_))));
    }

    #[test]
    fn test_secret_key_round_trip() {
        let kp = KeyPair::generate();
        let text = kp.secret_key().to_base64();
        let restored = SecretKey::from_base64(&text).unwrap();
        assert_eq!(restored.public_key(), *kp.public_key());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let kp = KeyPair::generate();
        let secret_text = kp.secret_key().to_base64();
        let debug = format!("{:?}", kp);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains(secret_text.as_str()));
    }

    #[test]
    fn test_public_key_serde() {
        let kp = KeyPair::generate();
        let json = serde_json::to_string(kp.public_key()).unwrap();
        assert_eq!(json, format!("\"{}\"", kp.public_key().to_base64()));
        let back: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, *kp.public_key());

        assert!(serde_json::from_str::<PublicKey>("\"AAAA\"").is_err());
    }

    #[test]
    fn test_fingerprint() {
        let pk = PublicKey::from_bytes([7u8; 32]);
        let fp = pk.fingerprint();
        assert_eq!(fp.len(), 16);
        assert_eq!(fp, pk.fingerprint());
        assert_ne!(fp, PublicKey::from_bytes([8u8; 32]).fingerprint());
    }
}
