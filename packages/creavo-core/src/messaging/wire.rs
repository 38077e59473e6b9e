//! Wire shapes exchanged with the message transport, and the boundary
//! checks applied to them.
//!
//! Every inbound message is checked here before any decryption is tried:
//!
//! | Field | Limit |
//! |-------|-------|
//! | `encryptedContent` | ≤ 20 000 bytes, canonical base64 |
//! | `nonce` | ≤ 100 bytes, canonical base64 |
//! | `senderPublicKey` | ≤ 100 bytes, canonical base64 |
//! | `encryptedForAdmin` (optional) | ≤ 20 000 bytes, canonical base64 |
//!
//! Decoded lengths (24-byte nonce, 32-byte key) are checked afterwards by the
//! typed parsers, at decryption time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{codec, MessageLimits};
use crate::error::{Error, Result};

/// Kind of entry in a conversation's message stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// An encrypted user message
    #[default]
    Text,
    /// Unencrypted marker recording a dispute flag
    DisputeFlag,
}

/// Payload handed to the transport when sending
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingPayload {
    /// Idempotency key; stays the same across retries of one send
    pub client_message_id: Uuid,
    /// Base64 ciphertext for the recipient
    pub encrypted_content: String,
    /// Base64 nonce shared by both ciphertexts
    pub nonce: String,
    /// Base64 public key of the sender
    pub sender_public_key: String,
    /// Base64 ciphertext for the admin key, when the conversation opted in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_for_admin: Option<String>,
}

impl OutgoingPayload {
    /// Check the payload against the wire limits
    pub fn validate(&self, limits: &MessageLimits) -> Result<()> {
        validate_fields(
            &self.encrypted_content,
            &self.nonce,
            &self.sender_public_key,
            self.encrypted_for_admin.as_deref(),
            limits,
        )
    }
}

/// A stored message as returned by fetch or pushed over realtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    /// Server-assigned id
    pub id: String,
    /// Conversation the message belongs to
    pub conversation_id: String,
    /// User id of the sender
    pub sender_id: String,
    /// Idempotency key supplied at send time
    #[serde(default)]
    pub client_message_id: Option<Uuid>,
    /// Base64 ciphertext, or a fixed sentinel for system markers
    pub encrypted_content: String,
    /// Base64 nonce, or a fixed sentinel for system markers
    pub nonce: String,
    /// Base64 sender public key
    #[serde(default)]
    pub sender_public_key: String,
    /// Base64 admin ciphertext, if one was prepared
    #[serde(default)]
    pub encrypted_for_admin: Option<String>,
    /// Message kind
    #[serde(default)]
    pub message_type: MessageKind,
    /// Server timestamp
    pub created_at: DateTime<Utc>,
}

impl WireMessage {
    /// Whether this entry is an unencrypted system marker
    pub fn is_system(&self) -> bool {
        self.message_type != MessageKind::Text
    }

    /// Check an inbound text message against the wire limits
    pub fn validate(&self, limits: &MessageLimits) -> Result<()> {
        validate_fields(
            &self.encrypted_content,
            &self.nonce,
            &self.sender_public_key,
            self.encrypted_for_admin.as_deref(),
            limits,
        )
    }
}

fn check_field(name: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidMessage(format!("{} is required", name)));
    }
    if value.len() > max_len {
        return Err(Error::InvalidMessage(format!(
            "{} is {} bytes; the limit is {}",
            name,
            value.len(),
            max_len
        )));
    }
    if !codec::is_valid(value) {
        return Err(Error::InvalidMessage(format!("{} is not valid base64", name)));
    }
    Ok(())
}

fn validate_fields(
    ciphertext: &str,
    nonce: &str,
    sender_public_key: &str,
    admin_ciphertext: Option<&str>,
    limits: &MessageLimits,
) -> Result<()> {
    check_field("encryptedContent", ciphertext, limits.max_ciphertext_len)?;
    check_field("nonce", nonce, limits.max_nonce_len)?;
    check_field("senderPublicKey", sender_public_key, limits.max_public_key_len)?;
    if let Some(admin) = admin_ciphertext {
        check_field("encryptedForAdmin", admin, limits.max_ciphertext_len)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> WireMessage {
        WireMessage {
            id: "m1".into(),
            conversation_id: "c1".into(),
            sender_id: "alice".into(),
            client_message_id: None,
            encrypted_content: codec::encode(&[1u8; 40]),
            nonce: codec::encode(&[2u8; 24]),
            sender_public_key: codec::encode(&[3u8; 32]),
            encrypted_for_admin: None,
            message_type: MessageKind::Text,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_message_passes() {
        assert!(message().validate(&MessageLimits::default()).is_ok());
    }

    #[test]
    fn test_ciphertext_limit() {
        let limits = MessageLimits::default();
        let mut msg = message();

        // 15_000 bytes encode to exactly 20_000 characters
        msg.encrypted_content = codec::encode(&vec![0u8; 15_000]);
        assert!(msg.validate(&limits).is_ok());

        msg.encrypted_content = codec::encode(&vec![0u8; 15_001]);
        let err = msg.validate(&limits).unwrap_err();
        assert!(matches!(err, Error::InvalidMessage(_)));
        assert!(err.to_string().contains("encryptedContent"));
    }

    #[test]
    fn test_short_field_limits() {
        let limits = MessageLimits::default();

        let mut msg = message();
        msg.nonce = codec::encode(&[0u8; 80]);
        assert!(msg.validate(&limits).unwrap_err().to_string().contains("nonce"));

        let mut msg = message();
        msg.sender_public_key = codec::encode(&[0u8; 80]);
        assert!(msg
            .validate(&limits)
            .unwrap_err()
            .to_string()
            .contains("senderPublicKey"));
    }

    #[test]
    fn test_non_base64_rejected() {
        let mut msg = message();
        msg.nonce = "not*base64".into();
        assert!(matches!(
            msg.validate(&MessageLimits::default()),
            Err(Error::InvalidMessage(_))
        ));

        let mut msg = message();
        msg.encrypted_for_admin = Some("???".into());
        assert!(msg.validate(&MessageLimits::default()).is_err());
    }

    #[test]
    fn test_wire_json_names() {
        let json = serde_json::json!({
            "id": "m9",
            "conversationId": "c1",
            "senderId": "bob",
            "encryptedContent": "AAAA",
            "nonce": "SYSTEM",
            "messageType": "dispute_flag",
            "createdAt": "2024-05-01T12:00:00Z"
        });
        let msg: WireMessage = serde_json::from_value(json).unwrap();
        assert!(msg.is_system());
        assert!(msg.sender_public_key.is_empty());
        assert!(msg.encrypted_for_admin.is_none());
    }

    #[test]
    fn test_outgoing_skips_missing_admin_copy() {
        let payload = OutgoingPayload {
            client_message_id: Uuid::new_v4(),
            encrypted_content: codec::encode(&[1u8; 20]),
            nonce: codec::encode(&[2u8; 24]),
            sender_public_key: codec::encode(&[3u8; 32]),
            encrypted_for_admin: None,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert!(json.get("encryptedForAdmin").is_none());
        assert!(json.get("clientMessageId").is_some());
        assert!(payload.validate(&MessageLimits::default()).is_ok());
    }
}
