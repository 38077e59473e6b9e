//! # Network Module
//!
//! Contracts for the remote services the messaging core talks to, plus the
//! retry policy wrapped around them.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     EXTERNAL COLLABORATORS                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  KeyDirectory       userId ──► public key         (lookup, publish)    │
//! │                                                                         │
//! │  MessageTransport   send / fetch ciphertext        (retried)            │
//! │                     conversation state, dispute flags, read receipts   │
//! │                                                                         │
//! │  RealtimeChannel    per-conversation push of the same wire shape       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Implementations report remote failures as [`Error::Transport`]: a
//! missing response carries `status: None`, an HTTP error carries its code.
//!
//! [`Error::Transport`]: crate::error::Error::Transport

mod retry;

pub use retry::{with_retry, with_retry_if, RetryPolicy};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::crypto::{EncodedWrappedKey, PublicKey};
use crate::dispute::{Conversation, Party, SystemMarker};
use crate::error::Result;
use crate::messaging::{OutgoingPayload, WireMessage};

/// Directory mapping user ids to published public keys
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Public key for `user_id`, or `None` if the user never published one
    async fn lookup(&self, user_id: &str) -> Result<Option<PublicKey>>;

    /// Publish a public key, optionally with the password-wrapped secret so
    /// the user can restore it on another device
    async fn publish(
        &self,
        user_id: &str,
        public_key: &PublicKey,
        wrapped_backup: Option<&EncodedWrappedKey>,
    ) -> Result<()>;
}

/// Storage and delivery of conversation messages
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Store a message; returns the stored copy
    async fn send(&self, conversation_id: &str, payload: &OutgoingPayload) -> Result<WireMessage>;

    /// Page through a conversation, oldest first
    async fn fetch(&self, conversation_id: &str, limit: usize, offset: usize)
        -> Result<Vec<WireMessage>>;

    /// Current state of a conversation
    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Conversation>;

    /// Record `party`'s dispute flag and append its marker in one step
    ///
    /// Only the flag of `party` is written, at `marker.created_at`; the other
    /// party's flag stays as stored. Either both the flag and the marker are
    /// stored or neither is. Returns the conversation as stored afterwards.
    async fn record_flag(
        &self,
        conversation_id: &str,
        party: Party,
        marker: &SystemMarker,
    ) -> Result<Conversation>;

    /// Mark everything in the conversation read for `reader_id`
    async fn mark_read(&self, conversation_id: &str, reader_id: &str) -> Result<()>;
}

/// Push channel for newly stored messages
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Join the room for `conversation_id`; the receiver yields every message
    /// stored after the call
    async fn subscribe(&self, conversation_id: &str) -> Result<mpsc::Receiver<WireMessage>>;
}
