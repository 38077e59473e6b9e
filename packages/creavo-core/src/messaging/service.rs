//! Messaging service: encrypt, send, fetch, decrypt, flag and admin-read.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::wire::{OutgoingPayload, WireMessage};
use super::{DecryptedMessage, MessageOutcome, UndecryptableMessage};
use crate::crypto::{
    codec, decrypt, encrypt, encrypt_with_admin_copy, Nonce, PublicKey, SecretKey,
};
use crate::dispute::{self, can_admin_access, Conversation, FlagOutcome};
use crate::error::{Error, Result};
use crate::identity::{IdentityRole, KeyLifecycleManager};
use crate::network::{with_retry, KeyDirectory, MessageTransport, RealtimeChannel};
use crate::CoreConfig;

/// Messaging service for one signed-in identity
///
/// The session key is fetched from the [`KeyLifecycleManager`] after every
/// network call, so a `lock()` that lands mid-request stops the operation
/// instead of racing it.
pub struct MessageService {
    manager: Arc<KeyLifecycleManager>,
    directory: Arc<dyn KeyDirectory>,
    transport: Arc<dyn MessageTransport>,
    realtime: Option<Arc<dyn RealtimeChannel>>,
    config: CoreConfig,
    /// Directory lookups, by user id
    key_cache: RwLock<HashMap<String, PublicKey>>,
}

impl MessageService {
    /// Create a service without a realtime channel
    pub fn new(
        manager: Arc<KeyLifecycleManager>,
        directory: Arc<dyn KeyDirectory>,
        transport: Arc<dyn MessageTransport>,
        config: CoreConfig,
    ) -> Self {
        Self {
            manager,
            directory,
            transport,
            realtime: None,
            config,
            key_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Attach a realtime channel
    pub fn with_realtime(mut self, realtime: Arc<dyn RealtimeChannel>) -> Self {
        self.realtime = Some(realtime);
        self
    }

    /// The key manager this service encrypts with
    pub fn manager(&self) -> &Arc<KeyLifecycleManager> {
        &self.manager
    }

    // ========================================================================
    // SEND
    // ========================================================================

    /// Encrypt `plaintext` for the other participant and send it
    ///
    /// When the conversation opted in to admin access, an admin copy is
    /// sealed alongside under the same nonce.
    pub async fn send_message(&self, conversation: &Conversation, plaintext: &str) -> Result<WireMessage> {
        if plaintext.trim().is_empty() {
            return Err(Error::InvalidMessage("message is empty".into()));
        }

        let me = self.manager.identity_id();
        let counterpart = self.counterpart(conversation, me)?;
        self.manager.session_key()?;

        let recipient_key = self.public_key_for(counterpart).await?;
        let admin_key = if conversation.admin_access_enabled {
            Some(self.admin_public_key().await?)
        } else {
            None
        };

        // The session may have been locked during the lookups
        let secret = self.manager.session_key()?;
        let limits = &self.config.limits;

        let (sealed, admin_ciphertext) = match admin_key {
            Some(admin) => {
                let both = encrypt_with_admin_copy(plaintext, &recipient_key, &admin, &secret, limits)?;
                (both.message, Some(both.admin_ciphertext))
            }
            None => (encrypt(plaintext, &recipient_key, &secret, limits)?, None),
        };

        let encoded = sealed.encode();
        let payload = OutgoingPayload {
            client_message_id: Uuid::new_v4(),
            encrypted_content: encoded.ciphertext,
            nonce: encoded.nonce,
            sender_public_key: secret.public_key().to_base64(),
            encrypted_for_admin: admin_ciphertext.map(|ct| codec::encode(&ct)),
        };
        payload.validate(limits)?;
        drop(secret);

        let stored = with_retry(&self.config.send_retry, "send_message", || {
            self.transport.send(&conversation.id, &payload)
        })
        .await?;

        tracing::debug!(
            conversation = %conversation.id,
            message = %stored.id,
            admin_copy = payload.encrypted_for_admin.is_some(),
            "Message sent"
        );
        Ok(stored)
    }

    // ========================================================================
    // RECEIVE
    // ========================================================================

    /// Fetch one page of a conversation and decrypt every message
    ///
    /// A message that fails to decrypt becomes an [`UndecryptableMessage`]
    /// in its slot; the rest of the page is unaffected. Messages are marked
    /// read only after the whole page has been processed.
    pub async fn fetch_messages(
        &self,
        conversation: &Conversation,
        offset: usize,
    ) -> Result<Vec<MessageOutcome>> {
        let me = self.manager.identity_id();
        let counterpart = self.counterpart(conversation, me)?;
        self.manager.session_key()?;

        let page_size = self.config.fetch_page_size;
        let messages = with_retry(&self.config.fetch_retry, "fetch_messages", || {
            self.transport.fetch(&conversation.id, page_size, offset)
        })
        .await?;

        let has_own = messages.iter().any(|m| m.sender_id == me && !m.is_system());
        let counterpart_key = if has_own {
            match self.public_key_for(counterpart).await {
                Ok(key) => Some(key),
                Err(e) => {
                    tracing::warn!(
                        conversation = %conversation.id,
                        error = %e,
                        "Counterpart key unavailable; own messages cannot be opened"
                    );
                    None
                }
            }
        } else {
            None
        };

        let secret = self.manager.session_key()?;
        let outcomes: Vec<MessageOutcome> = messages
            .iter()
            .map(|msg| {
                let peer = if msg.sender_id == me {
                    counterpart_key.ok_or_else(|| Error::PublicKeyNotFound(counterpart.to_string()))
                } else {
                    PublicKey::from_base64(&msg.sender_public_key)
                        .map_err(|e| Error::DecryptionFailed(format!("public key rejected: {}", e)))
                };
                self.open(msg, me, peer, &msg.encrypted_content, &secret)
            })
            .collect();
        drop(secret);

        if messages.iter().any(|m| m.sender_id != me) {
            if let Err(e) = self.transport.mark_read(&conversation.id, me).await {
                tracing::warn!(conversation = %conversation.id, error = %e, "Failed to mark messages read");
            }
        }

        Ok(outcomes)
    }

    /// Decrypt one pushed message through the same checks as fetched history
    pub async fn decrypt_incoming(
        &self,
        conversation: &Conversation,
        message: &WireMessage,
    ) -> Result<DecryptedMessage> {
        if message.conversation_id != conversation.id {
            return Err(Error::InvalidMessage(format!(
                "message {} belongs to conversation {}",
                message.id, message.conversation_id
            )));
        }

        let me = self.manager.identity_id();
        let counterpart = self.counterpart(conversation, me)?;

        if message.is_system() {
            return Ok(DecryptedMessage::system(message, me));
        }

        let peer = if message.sender_id == me {
            self.public_key_for(counterpart).await
        } else {
            PublicKey::from_base64(&message.sender_public_key)
                .map_err(|e| Error::DecryptionFailed(format!("public key rejected: {}", e)))
        };

        let secret = self.manager.session_key()?;
        self.open(message, me, peer, &message.encrypted_content, &secret)
            .map_err(|failed| failed.error)
    }

    /// Subscribe to pushed messages for a conversation
    pub async fn subscribe(&self, conversation_id: &str) -> Result<mpsc::Receiver<WireMessage>> {
        let realtime = self
            .realtime
            .as_ref()
            .ok_or_else(|| Error::Internal("no realtime channel configured".into()))?;
        realtime.subscribe(conversation_id).await
    }

    /// Drain a subscription, handing every decrypted message to `deliver`
    ///
    /// Messages for other conversations are skipped. Returns when the
    /// channel closes.
    pub async fn pump<F>(
        &self,
        conversation: &Conversation,
        mut rx: mpsc::Receiver<WireMessage>,
        mut deliver: F,
    ) where
        F: FnMut(MessageOutcome),
    {
        while let Some(message) = rx.recv().await {
            if message.conversation_id != conversation.id {
                tracing::debug!(message = %message.id, "Skipping message for another conversation");
                continue;
            }

            match self.decrypt_incoming(conversation, &message).await {
                Ok(decrypted) => deliver(Ok(decrypted)),
                Err(error) => deliver(Err(UndecryptableMessage::new(&message, error))),
            }
        }
    }

    // ========================================================================
    // DISPUTES
    // ========================================================================

    /// Flag a conversation for dispute as the signed-in identity
    ///
    /// The transport records only this party's flag together with the
    /// system marker; the returned status is computed from the conversation
    /// as stored afterwards, so a concurrent flag by the other party is
    /// never lost.
    pub async fn flag_dispute(&self, conversation_id: &str) -> Result<FlagOutcome> {
        let mut conversation = self.transport.fetch_conversation(conversation_id).await?;
        let mut outcome = dispute::flag(&mut conversation, self.manager.identity_id())?;

        let stored = self
            .transport
            .record_flag(conversation_id, outcome.party, &outcome.marker)
            .await?;
        outcome.status = stored.dispute_status();

        Ok(outcome)
    }

    /// Read a disputed conversation through the admin copies
    ///
    /// Only for the admin identity. The dispute gate is checked against a
    /// conversation loaded after the messages, right before decryption.
    pub async fn admin_read(&self, conversation_id: &str, offset: usize) -> Result<Vec<MessageOutcome>> {
        if self.manager.role() != IdentityRole::Admin {
            return Err(Error::Unauthorized(
                "only the admin identity can read dispute copies".into(),
            ));
        }
        self.manager.session_key()?;

        let page_size = self.config.fetch_page_size;
        let messages = with_retry(&self.config.fetch_retry, "admin_read", || {
            self.transport.fetch(conversation_id, page_size, offset)
        })
        .await?;

        let conversation = self.transport.fetch_conversation(conversation_id).await?;
        if !can_admin_access(&conversation) {
            tracing::warn!(conversation = %conversation_id, "Admin read refused; dispute not confirmed by both parties");
            return Err(Error::AdminAccessDenied);
        }
        if !conversation.admin_access_enabled {
            return Err(Error::AdminCopyUnavailable);
        }

        let me = self.manager.identity_id();
        let secret = self.manager.session_key()?;

        let outcomes = messages
            .iter()
            .map(|msg| match msg.encrypted_for_admin.as_deref() {
                _ if msg.is_system() => Ok(DecryptedMessage::system(msg, me)),
                None => Err(UndecryptableMessage::new(msg, Error::AdminCopyUnavailable)),
                Some(admin_ciphertext) => {
                    let peer = PublicKey::from_base64(&msg.sender_public_key).map_err(|e| {
                        Error::DecryptionFailed(format!("public key rejected: {}", e))
                    });
                    self.open(msg, me, peer, admin_ciphertext, &secret)
                }
            })
            .collect();

        tracing::info!(conversation = %conversation_id, "Admin read dispute copies");
        Ok(outcomes)
    }

    // ========================================================================
    // KEYS
    // ========================================================================

    /// Public key for `user_id`, from cache or the directory
    pub async fn public_key_for(&self, user_id: &str) -> Result<PublicKey> {
        if let Some(key) = self.key_cache.read().get(user_id) {
            return Ok(*key);
        }

        let key = self
            .directory
            .lookup(user_id)
            .await?
            .ok_or_else(|| Error::PublicKeyNotFound(user_id.to_string()))?;

        self.key_cache.write().insert(user_id.to_string(), key);
        Ok(key)
    }

    /// Drop a cached key so the next use asks the directory again
    pub fn forget_public_key(&self, user_id: &str) {
        self.key_cache.write().remove(user_id);
    }

    async fn admin_public_key(&self) -> Result<PublicKey> {
        let admin_id = self.config.admin_user_id.as_deref().ok_or_else(|| {
            Error::EncryptionFailed(
                "conversation requires an admin copy but no admin identity is configured".into(),
            )
        })?;
        self.public_key_for(admin_id).await
    }

    // ========================================================================
    // HELPERS
    // ========================================================================

    fn counterpart<'c>(&self, conversation: &'c Conversation, me: &str) -> Result<&'c str> {
        conversation.counterpart_of(me).ok_or_else(|| {
            Error::Unauthorized(format!(
                "{} is not a participant of conversation {}",
                me, conversation.id
            ))
        })
    }

    /// Validate and open one message; failures are logged and kept in place
    fn open(
        &self,
        msg: &WireMessage,
        me: &str,
        peer: Result<PublicKey>,
        ciphertext: &str,
        secret: &SecretKey,
    ) -> MessageOutcome {
        if msg.is_system() {
            return Ok(DecryptedMessage::system(msg, me));
        }

        let result = msg
            .validate(&self.config.limits)
            .and_then(|_| peer)
            .and_then(|peer| open_payload(ciphertext, &msg.nonce, &peer, secret));

        match result {
            Ok(content) => Ok(DecryptedMessage::text(msg, me, content)),
            Err(error) => {
                tracing::warn!(message = %msg.id, error = %error, "Message could not be decrypted");
                Err(UndecryptableMessage::new(msg, error))
            }
        }
    }
}

fn open_payload(ciphertext: &str, nonce: &str, peer: &PublicKey, secret: &SecretKey) -> Result<String> {
    let ciphertext = codec::decode(ciphertext, None)
        .map_err(|e| Error::DecryptionFailed(format!("ciphertext rejected: {}", e)))?;
    let nonce = Nonce::from_base64(nonce)
        .map_err(|e| Error::DecryptionFailed(format!("nonce rejected: {}", e)))?;
    decrypt(&ciphertext, &nonce, peer, secret)
}
