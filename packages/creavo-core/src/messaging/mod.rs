//! # Messaging Module
//!
//! End-to-end encrypted messages between the two parties of a conversation.
//!
//! ## Message Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      SEND                                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. session key ◄── KeyLifecycleManager (must be UNLOCKED)             │
//! │  2. recipient key ◄── KeyDirectory (cached)                            │
//! │  3. nonce = random 24 bytes                                            │
//! │     key = HKDF-SHA256(X25519(ours, theirs))                            │
//! │     ciphertext = XChaCha20-Poly1305(key, nonce, plaintext)             │
//! │  4. admin opted in? seal again for the admin key, same nonce           │
//! │  5. validate payload ──► MessageTransport.send (retried)               │
//! │                                                                         │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                      RECEIVE                                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  fetch page (retried) ──► per message:                                 │
//! │     system marker      → passed through unencrypted                    │
//! │     own message        → open with the counterpart's directory key     │
//! │     counterpart message → open with the senderPublicKey on the wire    │
//! │  failures stay in place as UndecryptableMessage                        │
//! │  then mark read                                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod service;
mod wire;

pub use service::MessageService;
pub use wire::{MessageKind, OutgoingPayload, WireMessage};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::Error;

/// A message ready for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Server-assigned id
    pub id: String,
    /// Conversation it belongs to
    pub conversation_id: String,
    /// Sender user id
    pub sender_id: String,
    /// Text or system marker
    pub kind: MessageKind,
    /// Plaintext, or the marker content for system entries
    pub content: String,
    /// Whether the signed-in identity sent it
    pub is_own: bool,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
}

impl DecryptedMessage {
    pub(crate) fn text(msg: &WireMessage, me: &str, content: String) -> Self {
        Self {
            id: msg.id.clone(),
            conversation_id: msg.conversation_id.clone(),
            sender_id: msg.sender_id.clone(),
            kind: msg.message_type,
            content,
            is_own: msg.sender_id == me,
            created_at: msg.created_at,
        }
    }

    pub(crate) fn system(msg: &WireMessage, me: &str) -> Self {
        Self::text(msg, me, msg.encrypted_content.clone())
    }
}

/// A message that could not be opened, kept in its slot
#[derive(Debug, Clone)]
pub struct UndecryptableMessage {
    /// Server-assigned id
    pub id: String,
    /// Conversation it belongs to
    pub conversation_id: String,
    /// Sender user id
    pub sender_id: String,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
    /// Why it failed
    pub error: Error,
}

impl UndecryptableMessage {
    pub(crate) fn new(msg: &WireMessage, error: Error) -> Self {
        Self {
            id: msg.id.clone(),
            conversation_id: msg.conversation_id.clone(),
            sender_id: msg.sender_id.clone(),
            created_at: msg.created_at,
            error,
        }
    }
}

/// Result of processing one message
pub type MessageOutcome = std::result::Result<DecryptedMessage, UndecryptableMessage>;

/// Tracks which conversation the UI is showing
///
/// Results of an async fetch or decrypt are only applied if the conversation
/// they were started for is still the active one.
#[derive(Debug, Default)]
pub struct ActiveConversation {
    current: RwLock<Option<String>>,
}

impl ActiveConversation {
    /// Nothing active
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch to `conversation_id`
    pub fn set(&self, conversation_id: impl Into<String>) {
        *self.current.write() = Some(conversation_id.into());
    }

    /// Leave the current conversation
    pub fn clear(&self) {
        *self.current.write() = None;
    }

    /// The active conversation id
    pub fn current(&self) -> Option<String> {
        self.current.read().clone()
    }

    /// Whether `conversation_id` is the active one
    pub fn is_active(&self, conversation_id: &str) -> bool {
        self.current.read().as_deref() == Some(conversation_id)
    }

    /// Pass `value` through only if `conversation_id` is still active
    pub fn accept<T>(&self, conversation_id: &str, value: T) -> Option<T> {
        if self.is_active(conversation_id) {
            Some(value)
        } else {
            tracing::debug!(conversation = %conversation_id, "Dropping stale result");
            None
        }
    }
}
