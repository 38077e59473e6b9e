//! Integration tests for a complete job conversation
//!
//! A client and a freelancer exchange encrypted messages through a shared
//! in-memory server, one of them moves to a new device with a key backup,
//! both flag a dispute, and the admin reads the conversation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use creavo_core::crypto::{EncodedWrappedKey, PublicKey};
use creavo_core::dispute::{DisputeStatus, Party, SystemMarker, DISPUTE_MARKER_CONTENT};
use creavo_core::messaging::{MessageKind, OutgoingPayload, WireMessage};
use creavo_core::network::{KeyDirectory, MessageTransport};
use creavo_core::storage::{FileKeyStore, MemorySessionStore};
use creavo_core::{
    Conversation, CoreConfig, Error, IdentityRole, KeyLifecycleManager, KeyStatus, MessageOutcome,
    MessageService, Result,
};

const CLIENT: &str = "client-7";
const FREELANCER: &str = "freelancer-3";
const ADMIN: &str = "admin";

/// Everything the remote side stores
#[derive(Default)]
struct ServerState {
    keys: HashMap<String, PublicKey>,
    conversations: HashMap<String, Conversation>,
    messages: Vec<WireMessage>,
}

/// The server as seen by one signed-in user
#[derive(Clone)]
struct Server {
    state: Arc<Mutex<ServerState>>,
    user_id: String,
}

impl Server {
    fn as_user(&self, user_id: &str) -> Self {
        Self {
            state: self.state.clone(),
            user_id: user_id.to_string(),
        }
    }

    fn push(&self, mut message: WireMessage) -> WireMessage {
        let mut state = self.state.lock();
        message.id = format!("m{}", state.messages.len() + 1);
        state.messages.push(message.clone());
        message
    }
}

#[async_trait]
impl KeyDirectory for Server {
    async fn lookup(&self, user_id: &str) -> Result<Option<PublicKey>> {
        Ok(self.state.lock().keys.get(user_id).copied())
    }

    async fn publish(
        &self,
        user_id: &str,
        public_key: &PublicKey,
        _wrapped_backup: Option<&EncodedWrappedKey>,
    ) -> Result<()> {
        self.state.lock().keys.insert(user_id.to_string(), *public_key);
        Ok(())
    }
}

#[async_trait]
impl MessageTransport for Server {
    async fn send(&self, conversation_id: &str, payload: &OutgoingPayload) -> Result<WireMessage> {
        Ok(self.push(WireMessage {
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
        Ok(self
            .state
            .lock()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_conversation(&self, conversation_id: &str) -> Result<Conversation> {
        self.state
            .lock()
            .conversations
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| Error::transport(404, "no such conversation"))
    }

    async fn record_flag(
        &self,
        conversation_id: &str,
        party: Party,
        marker: &SystemMarker,
    ) -> Result<Conversation> {
        let updated = {
            let mut state = self.state.lock();
            let stored = state
                .conversations
                .get_mut(conversation_id)
                .ok_or_else(|| Error::transport(404, "no such conversation"))?;
            stored.set_flag(party, marker.created_at);
            stored.clone()
        };
        self.push(marker.clone().into_wire(String::new()));
        Ok(updated)
    }

    async fn mark_read(&self, _conversation_id: &str, _reader_id: &str) -> Result<()> {
        Ok(())
    }
}

fn config() -> CoreConfig {
    CoreConfig {
        admin_user_id: Some(ADMIN.to_string()),
        ..CoreConfig::default()
    }
}

fn manager(server: &Server, dir: &std::path::Path, id: &str, role: IdentityRole) -> Arc<KeyLifecycleManager> {
    Arc::new(KeyLifecycleManager::new(
        id,
        role,
        Arc::new(FileKeyStore::open(dir.join(id)).unwrap()),
        Arc::new(MemorySessionStore::new()),
        Arc::new(server.as_user(id)),
        &config(),
    ))
}

fn service(server: &Server, manager: Arc<KeyLifecycleManager>) -> MessageService {
    let me = server.as_user(manager.identity_id());
    MessageService::new(manager, Arc::new(me.clone()), Arc::new(me), config())
}

fn texts(outcomes: &[MessageOutcome]) -> Vec<String> {
    outcomes
        .iter()
        .map(|o| match o {
            Ok(m) => m.content.clone(),
            Err(e) => format!("<{}>", e.error),
        })
        .collect()
}

#[tokio::test]
async fn test_conversation_through_dispute() {
    let server = Server {
        state: Arc::default(),
        user_id: String::new(),
    };
    let laptop = tempfile::tempdir().unwrap();
    let phone = tempfile::tempdir().unwrap();

    let conversation = Conversation::new("job-42", CLIENT, FREELANCER, true);
    server
        .state
        .lock()
        .conversations
        .insert(conversation.id.clone(), conversation.clone());

    let client_keys = manager(&server, laptop.path(), CLIENT, IdentityRole::Member);
    let freelancer_keys = manager(&server, laptop.path(), FREELANCER, IdentityRole::Member);
    let admin_keys = manager(&server, laptop.path(), ADMIN, IdentityRole::Admin);

    client_keys.setup("client-pass-1").await.unwrap();
    freelancer_keys.setup("freelancer-pass").await.unwrap();
    assert!(matches!(
        admin_keys.setup("short-pass").await,
        Err(Error::PasswordTooShort { min: 12 })
    ));
    admin_keys.setup("admin-password-long").await.unwrap();

    let client = service(&server, client_keys.clone());
    let freelancer = service(&server, freelancer_keys.clone());

    client
        .send_message(&conversation, "Can you deliver the mockups by Friday?")
        .await
        .unwrap();
    freelancer.send_message(&conversation, "Yes, Friday works.").await.unwrap();

    let history = freelancer.fetch_messages(&conversation, 0).await.unwrap();
    assert_eq!(
        texts(&history),
        vec!["Can you deliver the mockups by Friday?", "Yes, Friday works."]
    );

    // The freelancer moves to a phone with a backup of the same keys
    let backup = freelancer_keys.export_backup().unwrap();
    let phone_keys = manager(&server, phone.path(), FREELANCER, IdentityRole::Member);
    assert_eq!(phone_keys.status().unwrap(), KeyStatus::NoKeys);
    phone_keys.import_backup(&backup).unwrap();
    assert_eq!(phone_keys.status().unwrap(), KeyStatus::Locked);
    assert!(phone_keys.unlock("wrong-password").is_err());
    phone_keys.unlock("freelancer-pass").unwrap();

    let on_phone = service(&server, phone_keys);
    assert_eq!(
        texts(&on_phone.fetch_messages(&conversation, 0).await.unwrap()),
        texts(&history)
    );

    // Keys survive a restart on the laptop, locked until the password is given
    let restarted = manager(&server, laptop.path(), CLIENT, IdentityRole::Member);
    assert_eq!(restarted.status().unwrap(), KeyStatus::Locked);
    restarted.unlock("client-pass-1").unwrap();
    assert_eq!(restarted.public_key().unwrap(), client_keys.public_key().unwrap());

    let admin = service(&server, admin_keys);
    assert!(matches!(
        admin.admin_read("job-42", 0).await,
        Err(Error::AdminAccessDenied)
    ));

    let first = client.flag_dispute("job-42").await.unwrap();
    assert_eq!(first.status, DisputeStatus::ClientFlagged);
    assert!(matches!(
        admin.admin_read("job-42", 0).await,
        Err(Error::AdminAccessDenied)
    ));

    let second = on_phone.flag_dispute("job-42").await.unwrap();
    assert_eq!(second.status, DisputeStatus::BothFlagged);

    let read = admin.admin_read("job-42", 0).await.unwrap();
    assert_eq!(
        texts(&read),
        vec![
            "Can you deliver the mockups by Friday?",
            "Yes, Friday works.",
            DISPUTE_MARKER_CONTENT,
            DISPUTE_MARKER_CONTENT,
        ]
    );
}

#[tokio::test]
async fn test_locked_identity_cannot_read_or_send() {
    let server = Server {
        state: Arc::default(),
        user_id: String::new(),
    };
    let dir = tempfile::tempdir().unwrap();
    let conversation = Conversation::new("job-1", CLIENT, FREELANCER, false);
    server
        .state
        .lock()
        .conversations
        .insert(conversation.id.clone(), conversation.clone());

    let client_keys = manager(&server, dir.path(), CLIENT, IdentityRole::Member);
    let freelancer_keys = manager(&server, dir.path(), FREELANCER, IdentityRole::Member);
    client_keys.setup("client-pass-1").await.unwrap();
    freelancer_keys.setup("freelancer-pass").await.unwrap();

    let client = service(&server, client_keys.clone());
    client.send_message(&conversation, "hello").await.unwrap();

    client_keys.lock();
    assert!(matches!(
        client.send_message(&conversation, "again").await,
        Err(Error::SessionLocked)
    ));
    assert!(matches!(
        client.fetch_messages(&conversation, 0).await,
        Err(Error::SessionLocked)
    ));
    assert_eq!(server.state.lock().messages.len(), 1);
}
