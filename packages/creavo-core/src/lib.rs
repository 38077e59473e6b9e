//! # Creavo Core
//!
//! End-to-end encrypted messaging between the client and the freelancer of
//! a marketplace job, with a dispute gate that lets an administrator read a
//! conversation only after both parties asked for it.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CREAVO CORE MODULES                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────┐    ┌──────────────────────┐                  │
//! │  │      Messaging       │───►│       Dispute        │                  │
//! │  │ - send / fetch       │    │ - flag               │                  │
//! │  │ - realtime pump      │    │ - admin gate         │                  │
//! │  │ - admin read         │    │ - system markers     │                  │
//! │  └──────────┬───────────┘    └──────────────────────┘                  │
//! │             │                                                           │
//! │  ┌──────────▼───────────┐    ┌──────────────────────┐                  │
//! │  │      Identity        │───►│       Storage        │                  │
//! │  │ - key lifecycle      │    │ - wrapped keys       │                  │
//! │  │ - lock / unlock      │    │ - session keys       │                  │
//! │  │ - backup             │    └──────────────────────┘                  │
//! │  └──────────┬───────────┘                                               │
//! │             │                                                           │
//! │  ┌──────────▼───────────┐    ┌──────────────────────┐                  │
//! │  │       Crypto         │    │       Network        │                  │
//! │  │ - X25519 + HKDF      │    │ - directory          │                  │
//! │  │ - XChaCha20-Poly1305 │    │ - transport          │                  │
//! │  │ - key wrapping       │    │ - realtime, retry    │                  │
//! │  └──────────────────────┘    └──────────────────────┘                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Keys, message boxes, password key wrapping, base64
//! - [`identity`] - Key lifecycle and backups
//! - [`storage`] - Persistent and session key storage
//! - [`network`] - Collaborator contracts and retry
//! - [`dispute`] - Dispute flags and the admin access gate
//! - [`messaging`] - The message service
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Message encryption                                                    │
//! │  ──────────────────                                                    │
//! │  Every message is sealed with a key derived from the X25519 shared     │
//! │  secret of sender and recipient. The server only stores ciphertext.   │
//! │                                                                         │
//! │  Key at rest                                                           │
//! │  ───────────                                                           │
//! │  The secret key is stored wrapped under a password-derived key. The   │
//! │  unwrapped key lives in session storage only while UNLOCKED.          │
//! │                                                                         │
//! │  Admin copies                                                          │
//! │  ────────────                                                          │
//! │  Conversations that opted in carry a second ciphertext for the admin  │
//! │  key. It is only opened when both parties flagged a dispute.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod crypto;
pub mod dispute;
pub mod error;
pub mod identity;
pub mod messaging;
pub mod network;
pub mod storage;
/// Clock and timestamp formatting.
pub mod time;

#[cfg(test)]
mod testing;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use crypto::{KeyPair, MessageLimits, PublicKey, SecretKey};
pub use dispute::{Conversation, DisputeStatus};
pub use error::{Error, Result};
pub use identity::{IdentityRole, KeyBackup, KeyLifecycleManager, KeyStatus};
pub use messaging::{DecryptedMessage, MessageOutcome, MessageService, UndecryptableMessage};
pub use network::RetryPolicy;

// ============================================================================
// CONFIGURATION
// ============================================================================

use serde::{Deserialize, Serialize};

/// Configuration shared by the key manager and the message service
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// let config = creavo_core::CoreConfig::from_json(r#"{ "admin_user_id": "admin-1" }"#).unwrap();
/// assert_eq!(config.min_password_len, 8);
/// assert_eq!(config.admin_user_id.as_deref(), Some("admin-1"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Plaintext and wire field limits
    pub limits: MessageLimits,
    /// Minimum password length for regular users
    pub min_password_len: usize,
    /// Minimum password length for the admin identity
    pub min_admin_password_len: usize,
    /// Failed unlocks before a backup restore is suggested
    pub unlock_failure_threshold: u32,
    /// Retry policy for sends
    pub send_retry: RetryPolicy,
    /// Retry policy for fetches
    pub fetch_retry: RetryPolicy,
    /// User id of the admin identity, needed to seal admin copies
    pub admin_user_id: Option<String>,
    /// Messages per fetch
    pub fetch_page_size: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            limits: MessageLimits::default(),
            min_password_len: 8,
            min_admin_password_len: 12,
            unlock_failure_threshold: 5,
            send_retry: RetryPolicy::for_send(),
            fetch_retry: RetryPolicy::for_fetch(),
            admin_user_id: None,
            fetch_page_size: 50,
        }
    }
}

impl CoreConfig {
    /// Parse a JSON config, filling missing fields with defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::SerializationError(e.to_string()))
    }
}

// ============================================================================
// TESTS
// ============================================================================
