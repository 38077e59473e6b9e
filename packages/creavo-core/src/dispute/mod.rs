//! # Dispute-Consent Gate
//!
//! Decides whether the admin may read a conversation, from conversation state
//! alone.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      DISPUTE STATES                                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │                   client flags                freelancer flags         │
//! │        NONE ─────────────────────► CLIENT_FLAGGED ──────────┐          │
//! │          │                                                   ▼          │
//! │          │  freelancer flags                          BOTH_FLAGGED     │
//! │          └─────────────────────► FREELANCER_FLAGGED ─────────▲          │
//! │                                               client flags             │
//! │                                                                         │
//! │  The status is computed from two flag timestamps. It is never stored  │
//! │  or set directly. Flagging twice only refreshes the timestamp.        │
//! │                                                                         │
//! │  Admin access ⇔ BOTH_FLAGGED                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each flag also produces a [`SystemMarker`], an unencrypted entry appended
//! to the message stream so both parties see the flag inline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::messaging::{MessageKind, WireMessage};

/// Content of every dispute marker
pub const DISPUTE_MARKER_CONTENT: &str = "SYSTEM_DISPUTE_FLAG";

/// Nonce placeholder carried by system markers
pub const SYSTEM_NONCE: &str = "SYSTEM";

/// One of the two participants of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Party {
    /// The client who posted the job (participant A)
    Client,
    /// The freelancer working on it (participant B)
    Freelancer,
}

/// When each party flagged the conversation, if they did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisputeFlags {
    /// Client flag timestamp
    pub client: Option<DateTime<Utc>>,
    /// Freelancer flag timestamp
    pub freelancer: Option<DateTime<Utc>>,
}

/// Derived dispute status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisputeStatus {
    /// Nobody flagged
    None,
    /// Only the client flagged
    ClientFlagged,
    /// Only the freelancer flagged
    FreelancerFlagged,
    /// Both flagged; admin access is open
    BothFlagged,
}

impl DisputeStatus {
    /// Compute the status from the two flags
    pub fn from_flags(flags: &DisputeFlags) -> Self {
        match (flags.client.is_some(), flags.freelancer.is_some()) {
            (true, true) => DisputeStatus::BothFlagged,
            (true, false) => DisputeStatus::ClientFlagged,
            (false, true) => DisputeStatus::FreelancerFlagged,
            (false, false) => DisputeStatus::None,
        }
    }

    /// Whether at least one party has flagged
    pub fn is_open(&self) -> bool {
        *self != DisputeStatus::None
    }
}

/// A two-party conversation as far as the messaging core cares
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Conversation id
    pub id: String,
    /// Job the conversation belongs to
    #[serde(default)]
    pub job_id: Option<String>,
    /// Client user id
    pub client_id: String,
    /// Freelancer user id
    pub freelancer_id: String,
    /// Whether messages carry an admin-readable copy; fixed at creation
    #[serde(default)]
    pub admin_access_enabled: bool,
    /// Flag timestamps
    #[serde(default)]
    pub dispute_flags: DisputeFlags,
}

impl Conversation {
    /// Create a conversation with no flags set
    pub fn new(
        id: impl Into<String>,
        client_id: impl Into<String>,
        freelancer_id: impl Into<String>,
        admin_access_enabled: bool,
    ) -> Self {
        Self {
            id: id.into(),
            job_id: None,
            client_id: client_id.into(),
            freelancer_id: freelancer_id.into(),
            admin_access_enabled,
            dispute_flags: DisputeFlags::default(),
        }
    }

    /// Which party `user_id` is, if a participant
    pub fn party_of(&self, user_id: &str) -> Option<Party> {
        if user_id == self.client_id {
            Some(Party::Client)
        } else if user_id == self.freelancer_id {
            Some(Party::Freelancer)
        } else {
            None
        }
    }

    /// The other participant's user id
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        match self.party_of(user_id)? {
            Party::Client => Some(self.freelancer_id.as_str()),
            Party::Freelancer => Some(self.client_id.as_str()),
        }
    }

    /// Current dispute status
    pub fn dispute_status(&self) -> DisputeStatus {
        DisputeStatus::from_flags(&self.dispute_flags)
    }

    /// Whether any party has flagged
    pub fn is_disputed(&self) -> bool {
        self.dispute_status().is_open()
    }

    /// Set the flag of `party` only; the other party's flag is untouched
    pub fn set_flag(&mut self, party: Party, at: DateTime<Utc>) {
        match party {
            Party::Client => self.dispute_flags.client = Some(at),
            Party::Freelancer => self.dispute_flags.freelancer = Some(at),
        }
    }

    /// Clear both flags (external resolution)
    pub fn reset_dispute(&mut self) {
        self.dispute_flags = DisputeFlags::default();
    }
}

/// An unencrypted entry recording a dispute flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMarker {
    /// Conversation the marker belongs to
    pub conversation_id: String,
    /// User who flagged
    pub sender_id: String,
    /// Always [`DISPUTE_MARKER_CONTENT`]
    pub content: String,
    /// Always [`SYSTEM_NONCE`]
    pub nonce: String,
    /// Always [`MessageKind::DisputeFlag`]
    pub message_type: MessageKind,
    /// When the flag was set
    pub created_at: DateTime<Utc>,
}

impl SystemMarker {
    /// Build the marker for a dispute flag
    pub fn dispute_flag(conversation_id: &str, sender_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            content: DISPUTE_MARKER_CONTENT.to_string(),
            nonce: SYSTEM_NONCE.to_string(),
            message_type: MessageKind::DisputeFlag,
            created_at: at,
        }
    }

    /// The marker as a stored message with the given id
    pub fn into_wire(self, id: impl Into<String>) -> WireMessage {
        WireMessage {
            id: id.into(),
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            client_message_id: None,
            encrypted_content: self.content,
            nonce: self.nonce,
            sender_public_key: String::new(),
            encrypted_for_admin: None,
            message_type: self.message_type,
            created_at: self.created_at,
        }
    }
}

/// Result of a flag action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagOutcome {
    /// Status after the flag
    pub status: DisputeStatus,
    /// Party that flagged
    pub party: Party,
    /// Marker to append to the message stream
    pub marker: SystemMarker,
}

/// Flag `conversation` for dispute on behalf of `actor_id`, now
pub fn flag(conversation: &mut Conversation, actor_id: &str) -> Result<FlagOutcome> {
    flag_at(conversation, actor_id, crate::time::now())
}

/// Flag `conversation` for dispute on behalf of `actor_id` at `at`
pub fn flag_at(
    conversation: &mut Conversation,
    actor_id: &str,
    at: DateTime<Utc>,
) -> Result<FlagOutcome> {
    let party = conversation.party_of(actor_id).ok_or_else(|| {
        Error::Unauthorized(format!(
            "{} is not a participant of conversation {}",
            actor_id, conversation.id
        ))
    })?;

    conversation.set_flag(party, at);

    let status = conversation.dispute_status();
    tracing::info!(
        conversation = %conversation.id,
        party = ?party,
        status = ?status,
        "Conversation flagged for dispute"
    );

    Ok(FlagOutcome {
        status,
        party,
        marker: SystemMarker::dispute_flag(&conversation.id, actor_id, at),
    })
}

/// Whether the admin may read this conversation
///
/// Call this on freshly loaded state at the moment of access; a cached
/// answer can be stale.
pub fn can_admin_access(conversation: &Conversation) -> bool {
    conversation.dispute_status() == DisputeStatus::BothFlagged
}
