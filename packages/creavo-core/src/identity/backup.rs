//! # Key Backup
//!
//! A portable JSON document holding the public key and the password-wrapped
//! secret key. The password itself is never part of it.
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "exportDate": "2024-05-01T12:00:00.000Z",
//!   "publicKey": "<base64, 32 bytes>",
//!   "encryptedSecretKey": "<base64, 48 bytes>",
//!   "keyNonce": "<base64, 24 bytes>",
//!   "keySalt": "<base64, 16 bytes>"
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{EncodedWrappedKey, PublicKey, WrappedSecretKey, WRAPPED_KEY_SIZE};
use crate::error::{Error, Result};
use crate::storage::StoredKeys;

/// Current backup format version
pub const BACKUP_VERSION: &str = "1.0";

/// The exported backup document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyBackup {
    /// Format version
    pub version: String,
    /// When the backup was written, ISO 8601
    pub export_date: String,
    /// Base64 public key
    pub public_key: String,
    /// Base64 wrapped secret key
    pub encrypted_secret_key: String,
    /// Base64 wrapping nonce
    pub key_nonce: String,
    /// Base64 wrapping salt
    pub key_salt: String,
}

/// Lenient mirror used for parsing, so a missing field gets a precise error
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawBackup {
    version: Option<String>,
    export_date: Option<String>,
    public_key: Option<String>,
    encrypted_secret_key: Option<String>,
    key_nonce: Option<String>,
    key_salt: Option<String>,
}

fn required(field: Option<String>, name: &str) -> Result<String> {
    field
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::InvalidBackup(format!("missing field {}", name)))
}

impl KeyBackup {
    /// Build a backup from the stored record
    pub fn from_stored(keys: &StoredKeys, exported_at: DateTime<Utc>) -> Self {
        Self {
            version: BACKUP_VERSION.to_string(),
            export_date: crate::time::to_iso8601(&exported_at),
            public_key: keys.public_key.to_base64(),
            encrypted_secret_key: keys.wrapped.encrypted_secret_key.clone(),
            key_nonce: keys.wrapped.key_nonce.clone(),
            key_salt: keys.wrapped.key_salt.clone(),
        }
    }

    /// Serialize as pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a backup document
    ///
    /// All four key fields must be present and decode to their exact sizes.
    /// `version` may be absent but, if present, must be [`BACKUP_VERSION`].
    pub fn parse(doc: &str) -> Result<Self> {
        let raw: RawBackup = serde_json::from_str(doc)
            .map_err(|e| Error::InvalidBackup(format!("not a backup document: {}", e)))?;

        let version = raw.version.unwrap_or_else(|| BACKUP_VERSION.to_string());
        if version != BACKUP_VERSION {
            return Err(Error::InvalidBackup(format!(
                "unsupported version {}",
                version
            )));
        }

        let backup = Self {
            version,
            export_date: raw.export_date.unwrap_or_default(),
            public_key: required(raw.public_key, "publicKey")?,
            encrypted_secret_key: required(raw.encrypted_secret_key, "encryptedSecretKey")?,
            key_nonce: required(raw.key_nonce, "keyNonce")?,
            key_salt: required(raw.key_salt, "keySalt")?,
        };

        backup.to_stored()?;
        Ok(backup)
    }

    /// Convert into the stored record, validating every field
    pub fn to_stored(&self) -> Result<StoredKeys> {
        let public_key = PublicKey::from_base64(&self.public_key)
            .map_err(|e| Error::InvalidBackup(format!("publicKey: {}", e)))?;

        let wrapped = EncodedWrappedKey {
            encrypted_secret_key: self.encrypted_secret_key.clone(),
            key_nonce: self.key_nonce.clone(),
            key_salt: self.key_salt.clone(),
        };
        let decoded = WrappedSecretKey::decode(&wrapped)
            .map_err(|e| Error::InvalidBackup(e.to_string()))?;

        if decoded.ciphertext.len() != WRAPPED_KEY_SIZE {
            return Err(Error::InvalidBackup(format!(
                "encryptedSecretKey must be {} bytes, got {}",
                WRAPPED_KEY_SIZE,
                decoded.ciphertext.len()
            )));
        }

        Ok(StoredKeys {
            public_key,
            wrapped,
        })
    }
}
