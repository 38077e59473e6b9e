//! # Error Handling
//!
//! This module provides the error type shared by every component of
//! Creavo Core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Lifecycle Errors (100)                                            │
//! │  │   ├── KeysAlreadyExist      - setup() outside NO_KEYS               │
//! │  │   ├── NoKeys                - nothing stored for this identity      │
//! │  │   ├── SessionLocked         - secret key not unlocked               │
//! │  │   ├── UnlockInProgress      - unlock() re-entered                   │
//! │  │   └── PasswordTooShort      - password policy violated              │
//! │  │                                                                      │
//! │  ├── Key Material Errors (200)                                         │
//! │  │   ├── Codec                 - bad base64 / wrong decoded length     │
//! │  │   ├── KeyValidation         - wrong length for a key role           │
//! │  │   ├── PublicKeyNotFound     - directory has no key for the user     │
//! │  │   └── InvalidBackup         - backup document rejected              │
//! │  │                                                                      │
//! │  ├── Crypto Errors (300)                                               │
//! │  │   ├── EncryptionFailed      - precondition violated before sealing  │
//! │  │   ├── DecryptionFailed      - open failed (deliberately vague)      │
//! │  │   └── KeyDerivationFailed   - HKDF expansion failed                 │
//! │  │                                                                      │
//! │  ├── Storage Errors (400)                                              │
//! │  ├── Transport Errors (500)    - the only retryable family             │
//! │  ├── Dispute Errors (600)                                              │
//! │  │   ├── Unauthorized          - actor is not a participant            │
//! │  │   ├── AdminAccessDenied     - both parties have not flagged         │
//! │  │   └── AdminCopyUnavailable  - conversation never opted in           │
//! │  │                                                                      │
//! │  └── Message Errors (700)                                              │
//! │      └── InvalidMessage        - wire limits / malformed payload       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! Components raise typed errors and never recover on their own. Callers
//! (the UI layer) map them to user-facing text. `DecryptionFailed` messages
//! are fixed strings so that a wrong password and a corrupted blob cannot be
//! told apart from the error text.

use thiserror::Error;

/// Result type alias for Creavo Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Text reported for every failed password unwrap.
pub const WRONG_PASSWORD_OR_CORRUPTED: &str = "wrong password or corrupted data";

/// Text reported for every failed message open.
pub const MESSAGE_OPEN_FAILED: &str = "wrong key, corrupted message, or tampered data";

/// Main error type for Creavo Core
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Key Lifecycle Errors (100-199)
    // ========================================================================

    /// `setup()` was called while keys already exist
    #[error("Encryption keys already exist for this identity. Rotation is not supported.")]
    KeysAlreadyExist,

    /// No key material is stored for this identity
    #[error("No encryption keys found. Set up encryption or import a backup first.")]
    NoKeys,

    /// The secret key is not present in the session
    #[error("Encryption session is locked. Unlock with your password first.")]
    SessionLocked,

    /// Another unlock attempt is still running
    #[error("An unlock attempt is already in progress.")]
    UnlockInProgress,

    /// Password shorter than the policy minimum for this identity
    #[error("Password must be at least {min} characters.")]
    PasswordTooShort {
        /// Minimum length required for the identity's role
        min: usize,
    },

    // ========================================================================
    // Key Material Errors (200-299)
    // ========================================================================

    /// Malformed text encoding or wrong decoded length
    #[error("Invalid encoding: {0}")]
    Codec(String),

    /// Well-formed text but wrong byte length for its cryptographic role
    #[error("Invalid key: {0}")]
    KeyValidation(String),

    /// The key directory has no public key for this user
    #[error("No public key published for user {0}")]
    PublicKeyNotFound(String),

    /// Backup document failed structural or codec validation
    #[error("Invalid key backup: {0}")]
    InvalidBackup(String),

    // ========================================================================
    // Crypto Errors (300-399)
    // ========================================================================

    /// Encryption precondition violated
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed
    #[error("Decryption failed: {0}")]
    DecryptionFailed(String),

    /// Key derivation failed
    #[error("Failed to derive keys: {0}")]
    KeyDerivationFailed(String),

    // ========================================================================
    // Storage Errors (400-499)
    // ========================================================================

    /// Failed to read from storage
    #[error("Failed to read from storage: {0}")]
    StorageReadError(String),

    /// Failed to write to storage
    #[error("Failed to write to storage: {0}")]
    StorageWriteError(String),

    /// Stored key record is unreadable
    #[error("Stored key data is corrupted: {0}")]
    StorageCorrupted(String),

    // ========================================================================
    // Transport Errors (500-599)
    // ========================================================================

    /// Failure reported by an external collaborator (directory, transport)
    ///
    /// `status` is `None` when no response was received at all.
    #[error("Transport error ({}): {}", describe_status(.status), .message)]
    Transport {
        /// HTTP-style status code, if the remote answered
        status: Option<u16>,
        /// Description from the collaborator
        message: String,
    },

    // ========================================================================
    // Dispute Errors (600-699)
    // ========================================================================

    /// Actor is not a participant of the conversation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Admin access requested before both parties flagged a dispute
    #[error("Access denied. Both parties must flag the conversation for dispute before admin can access messages.")]
    AdminAccessDenied,

    /// Conversation did not opt in to admin access when it was created
    #[error("This conversation was not created with admin access; no admin-readable copy exists.")]
    AdminCopyUnavailable,

    // ========================================================================
    // Message Errors (700-799)
    // ========================================================================

    /// Payload violates wire limits or is malformed
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl Error {
    /// Shorthand for a transport failure with a status code
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        Error::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Shorthand for a transport failure without any response
    pub fn network(message: impl Into<String>) -> Self {
        Error::Transport {
            status: None,
            message: message.into(),
        }
    }

    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Key lifecycle
    /// - 200-299: Key material
    /// - 300-399: Crypto
    /// - 400-499: Storage
    /// - 500-599: Transport
    /// - 600-699: Dispute
    /// - 700-799: Messages
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Lifecycle (100-199)
            Error::KeysAlreadyExist => 100,
            Error::NoKeys => 101,
            Error::SessionLocked => 102,
            Error::UnlockInProgress => 103,
            Error::PasswordTooShort { .. } => 104,

            // Key material (200-299)
            Error::Codec(_) => 200,
            Error::KeyValidation(_) => 201,
            Error::PublicKeyNotFound(_) => 202,
            Error::InvalidBackup(_) => 203,

            // Crypto (300-399)
            Error::EncryptionFailed(_) => 300,
            Error::DecryptionFailed(_) => 301,
            Error::KeyDerivationFailed(_) => 302,

            // Storage (400-499)
            Error::StorageReadError(_) => 400,
            Error::StorageWriteError(_) => 401,
            Error::StorageCorrupted(_) => 402,

            // Transport (500-599)
            Error::Transport { .. } => 500,

            // Dispute (600-699)
            Error::Unauthorized(_) => 600,
            Error::AdminAccessDenied => 601,
            Error::AdminCopyUnavailable => 602,

            // Messages (700-799)
            Error::InvalidMessage(_) => 700,

            // Internal (900-999)
            Error::Internal(_) => 900,
            Error::SerializationError(_) => 901,
        }
    }

    /// Check if this error may succeed when retried
    ///
    /// Only transport failures without a response, or with a 5xx status,
    /// are retryable. Client errors (4xx) and every local validation or
    /// crypto failure are terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport { status: None, .. } => true,
            Error::Transport {
                status: Some(status),
                ..
            } => *status >= 500,
            _ => false,
        }
    }

    /// Check if this error requires user action
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            Error::NoKeys
                | Error::SessionLocked
                | Error::PasswordTooShort { .. }
                | Error::InvalidBackup(_)
        )
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "no response".to_string(),
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageReadError(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
