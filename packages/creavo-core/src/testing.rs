//! In-memory collaborators for unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;

use crate::crypto::{EncodedWrappedKey, PublicKey};
use crate::dispute::{Conversation, Party, SystemMarker};
use crate::error::{Error, Result};
use crate::messaging::{MessageKind, OutgoingPayload, WireMessage};
use crate::network::{KeyDirectory, MessageTransport, RealtimeChannel};

/// Key directory backed by a map
#[derive(Default)]
pub struct MemoryDirectory {
    keys: RwLock<HashMap<String, PublicKey>>,
    fail_publish: AtomicBool,
    lookups: AtomicUsize,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, user_id: &str, key: PublicKey) {
        self.keys.write().insert(user_id.to_string(), key);
    }

    pub fn published(&self, user_id: &str) -> Option<PublicKey> {
        self.keys.read().get(user_id).copied()
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyDirectory for MemoryDirectory {
    async fn lookup(&self, user_id: &str) -> Result<Option<PublicKey>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.published(user_id))
    }

    async fn publish(
        &self,
        user_id: &str,
        public_key: &PublicKey,
        _wrapped_backup: Option<&EncodedWrappedKey>,
    ) -> Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(Error::network("directory unreachable"));
        }
        self.insert(user_id, *public_key);
        Ok(())
    }
}

/// Message store shared by every [`MemoryTransport`] handle
#[derive(Default)]
struct Backend {
    conversations: RwLock<HashMap<String, Conversation>>,
    messages: RwLock<Vec<WireMessage>>,
    next_id: AtomicUsize,
    failures: Mutex<Option<(u32, Option<u16>)>>,
    send_attempts: AtomicU32,
    fetch_attempts: AtomicU32,
    mark_read_calls: AtomicU32,
    fail_mark_read: AtomicBool,
    fail_record_flag: AtomicBool,
    realtime: RwLock<Option<Arc<MemoryRealtime>>>,
}

/// Message transport as seen by one signed-in user, with failure injection
///
/// Handles made with [`MemoryTransport::for_user`] share one store, the way
/// two clients share a server.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    backend: Arc<Backend>,
    user_id: String,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Another handle on the same store, authenticated as `user_id`
    pub fn for_user(&self, user_id: &str) -> Self {
        Self {
            backend: self.backend.clone(),
            user_id: user_id.to_string(),
        }
    }

    pub fn set_realtime(&self, realtime: Arc<MemoryRealtime>) {
        *self.backend.realtime.write() = Some(realtime);
    }

    pub fn add_conversation(&self, conversation: Conversation) {
        self.backend
            .conversations
            .write()
            .insert(conversation.id.clone(), conversation);
    }

    pub fn conversation(&self, id: &str) -> Option<Conversation> {
        self.backend.conversations.read().get(id).cloned()
    }

    /// Edit a stored message in place
    pub fn tamper(&self, id: &str, edit: impl FnOnce(&mut WireMessage)) {
        if let Some(msg) = self.backend.messages.write().iter_mut().find(|m| m.id == id) {
            edit(msg);
        }
    }

    pub fn stored(&self) -> Vec<WireMessage> {
        self.backend.messages.read().clone()
    }

    /// Fail the next `count` sends and fetches with the given status
    pub fn fail_next(&self, count: u32, status: Option<u16>) {
        *self.backend.failures.lock() = Some((count, status));
    }

    pub fn fail_mark_read(&self, fail: bool) {
        self.backend.fail_mark_read.store(fail, Ordering::SeqCst);
    }

    pub fn fail_record_flag(&self, fail: bool) {
        self.backend.fail_record_flag.store(fail, Ordering::SeqCst);
    }

    pub fn send_attempts(&self) -> u32 {
        self.backend.send_attempts.load(Ordering::SeqCst)
    }

    pub fn fetch_attempts(&self) -> u32 {
        self.backend.fetch_attempts.load(Ordering::SeqCst)
    }

    pub fn mark_read_calls(&self) -> u32 {
        self.backend.mark_read_calls.load(Ordering::SeqCst)
    }

    fn injected_failure(&self) -> Result<()> {
        let mut failures = self.backend.failures.lock();
        match failures.as_mut() {
            Some((remaining, status)) if *remaining > 0 => {
                *remaining -= 1;
                Err(match status {
                    Some(code) => Error::transport(*code, "injected failure"),
                    None => Error::network("injected failure"),
                })
            }
            _ => Ok(()),
        }
    }

    fn store(&self, mut message: WireMessage) -> WireMessage {
        let id = self.backend.next_id.fetch_add(1, Ordering::SeqCst);
        message.id = format!("msg-{}", id);
        self.backend.messages.write().push(message.clone());
        if let Some(realtime) = self.backend.realtime.read().as_ref() {
            realtime.publish(&message);
        }
        message
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn send(&self, conversation_id: &str, payload: &OutgoingPayload) -> Result<WireMessage> {
        self.backend.send_attempts.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;

        let existing = self
            .backend
            .messages
            .read()
            .iter()
            .find(|m| m.client_message_id == Some(payload.client_message_id))
            .cloned();
        if let Some(existing) = existing {
            return Ok(existing);
        }

        Ok(self.store(WireMessage {
            id: String::new(),
            conversation_id: conversation_id.to_string(),
            sender_id: self.user_id.clone(),
            client_message_id: Some(payload.client_message_id),
            encrypted_content: payload.encrypted_content.clone(),
            nonce: payload.nonce.clone(),
            sender_public_key: payload.sender_public_key.clone(),
            encrypted_for_admin: payload.encrypted_for_admin.clone(),
            message_type: MessageKind::Text,
            created_at: chrono::Utc::now(),
        }))
    }

    async fn fetch(&self, conversation_id: &str, limit: usize, offset: usize) -> Result<Vec<WireMessage>> {
        self.backend.fetch_attempts.fetch_add(1, Ordering::SeqCst);
        self.injected_failure()?;

        Ok(self
            .backend
            .messages
            .read()
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        let conversation = self.conversation(conversation_id);
        // Let concurrent callers run between this read and their next write
        tokio::task::yield_now().await;
        conversation
            .ok_or_else(|| Error::transport(404, "conversation not found"))
    }

    async fn record_flag(
        &self,
        conversation_id: &str,
        party: Party,
        marker: &SystemMarker,
    ) -> Result<Conversation> {
        if self.backend.fail_record_flag.load(Ordering::SeqCst) {
            return Err(Error::transport(503, "dispute service unavailable"));
        }

        let updated = {
            let mut conversations = self.backend.conversations.write();
            let stored = conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Error::transport(404, "conversation not found"))?;
            stored.set_flag(party, marker.created_at);
            stored.clone()
        };
        self.store(marker.clone().into_wire(String::new()));
        Ok(updated)
    }

    async fn mark_read(&self, _conversation_id: &str, _reader_id: &str) -> Result<()> {
        self.backend.mark_read_calls.fetch_add(1, Ordering::SeqCst);
        if self.backend.fail_mark_read.load(Ordering::SeqCst) {
            return Err(Error::transport(500, "read receipts unavailable"));
        }
        Ok(())
    }
}

/// Realtime channel fanning stored messages out to subscribers
#[derive(Default)]
pub struct MemoryRealtime {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<WireMessage>>>>,
}

impl MemoryRealtime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, message: &WireMessage) {
        let mut subscribers = self.subscribers.lock();
        if let Some(senders) = subscribers.get_mut(&message.conversation_id) {
            senders.retain(|tx| tx.try_send(message.clone()).is_ok());
        }
    }

    /// Close every subscription
    pub fn close(&self) {
        self.subscribers.lock().clear();
    }
}

#[async_trait]
impl RealtimeChannel for MemoryRealtime {
    async fn subscribe(&self, conversation_id: &str) -> Result<mpsc::Receiver<WireMessage>> {
        let (tx, rx) = mpsc::channel(64);
        self.subscribers
            .lock()
            .entry(conversation_id.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
