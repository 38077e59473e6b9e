//! # Storage Module
//!
//! Where key material lives between and during sessions.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         STORAGE SYSTEM                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PersistentKeyStorage (survives restarts)                              │
//! │  ─────────────────────                                                  │
//! │    identity_id ──► StoredKeys                                          │
//! │                    { publicKey, encryptedSecretKey, keyNonce, keySalt }│
//! │                                                                         │
//! │    The four fields are written together in one `set` call, so a       │
//! │    reader never sees a partial record.                                 │
//! │                                                                         │
//! │  SessionStorage (process lifetime only, one slot)                      │
//! │  ──────────────                                                         │
//! │    (identity_id, SecretKey)    plaintext, present only while           │
//! │                                UNLOCKED, zeroized on removal; a new    │
//! │                                identity evicts the resident one        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The plaintext secret key is never handed to [`PersistentKeyStorage`].

mod key_store;
mod session;

pub use key_store::{FileKeyStore, MemoryKeyStore};
pub use session::MemorySessionStore;

use serde::{Deserialize, Serialize};

use crate::crypto::{EncodedWrappedKey, PublicKey, SecretKey, WrappedSecretKey};
use crate::error::{Error, Result};

/// The persisted key record for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeys {
    /// Public key, base64
    pub public_key: PublicKey,
    /// Password-wrapped secret key, nonce and salt, base64
    #[serde(flatten)]
    pub wrapped: EncodedWrappedKey,
}

impl StoredKeys {
    /// Build a record from a public key and its wrapped secret
    pub fn new(public_key: PublicKey, wrapped: &WrappedSecretKey) -> Self {
        Self {
            public_key,
            wrapped: wrapped.encode(),
        }
    }

    /// Decode the wrapped secret, validating every field
    ///
    /// Codec failures surface as `StorageCorrupted`.
    pub fn wrapped_secret(&self) -> Result<WrappedSecretKey> {
        WrappedSecretKey::decode(&self.wrapped)
            .map_err(|e| Error::StorageCorrupted(e.to_string()))
    }
}

/// Durable storage for wrapped key records, keyed by identity
pub trait PersistentKeyStorage: Send + Sync {
    /// Load the record for `identity_id`, if any
    fn get(&self, identity_id: &str) -> Result<Option<StoredKeys>>;

    /// Replace the record for `identity_id` in one step
    fn set(&self, identity_id: &str, keys: &StoredKeys) -> Result<()>;

    /// Remove the record for `identity_id`; a missing record is not an error
    fn clear(&self, identity_id: &str) -> Result<()>;
}

/// Process-lifetime slot for the one unlocked secret key
///
/// At most one identity is resident at a time.
pub trait SessionStorage: Send + Sync {
    /// The resident secret key, if it belongs to `identity_id`
    fn get(&self, identity_id: &str) -> Option<SecretKey>;

    /// Make `identity_id` resident, evicting any other key
    fn set(&self, identity_id: &str, secret: SecretKey);

    /// Empty the slot if `identity_id` is resident
    fn clear(&self, identity_id: &str);
}
