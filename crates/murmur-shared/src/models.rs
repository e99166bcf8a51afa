//! Domain models observed from, and written to, the remote store.
//!
//! Every struct derives `Serialize` so it can be handed directly to the
//! presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::MESSAGE_KIND_TEXT;
use crate::types::{ConversationId, MessageId, ParticipantId};

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// A user profile.  Immutable once cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: ParticipantId,
    pub display_name: String,
    /// Contact address (e-mail) of the user.
    pub contact: Option<String>,
    /// Avatar source handed to the image decoder.
    pub avatar: Option<String>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// Preview of the most recent message of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    pub body: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub sender: Option<ParticipantId>,
}

/// A conversation record with its participant list already normalised.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    /// Unique participant ids in first-seen order.
    pub participants: Vec<ParticipantId>,
    /// Stored name; present for multi-party conversations.
    pub name: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_message: Option<LastMessage>,
}

impl Conversation {
    pub fn is_two_party(&self) -> bool {
        self.participants.len() == 2
    }

    /// The other participant of a two-party conversation.
    pub fn counterpart(&self, local: &ParticipantId) -> Option<&ParticipantId> {
        if !self.is_two_party() || !self.participants.contains(local) {
            return None;
        }
        self.participants.iter().find(|p| *p != local)
    }

    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().and_then(|m| m.timestamp)
    }
}

/// A conversation resolved for display in the roster.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    pub participants: Vec<ParticipantId>,
    pub last_message: Option<LastMessage>,
}

impl ConversationSummary {
    pub fn last_message_at(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().and_then(|m| m.timestamp)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    /// A kind tag this client does not know; rendered as text.
    Other(String),
}

impl MessageKind {
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            None | Some(MESSAGE_KIND_TEXT) => Self::Text,
            Some(other) => Self::Other(other.to_string()),
        }
    }

    pub fn as_tag(&self) -> &str {
        match self {
            Self::Text => MESSAGE_KIND_TEXT,
            Self::Other(tag) => tag,
        }
    }
}

/// A single chat message.  Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: ParticipantId,
    /// Sender name as written by the sending client.
    pub sender_name: Option<String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
}

/// A message ready for rendering, with the sender name resolved.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RenderedMessage {
    pub id: MessageId,
    pub sender_id: ParticipantId,
    pub sender_name: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub is_own: bool,
}

// ---------------------------------------------------------------------------
// Typing
// ---------------------------------------------------------------------------

/// Aggregate typing state of the other participants of a conversation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub enum TypingIndicator {
    Nobody,
    One { name: String },
    Several,
}
