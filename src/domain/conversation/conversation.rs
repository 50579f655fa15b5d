//! Conversation entity and identifiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::message::Message;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    /// Creates a new random ConversationId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ConversationId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// A conversation between a site visitor and the assistant.
///
/// Owns an append-only sequence of messages; `updated_at` is advanced only
/// by a successful message append and always equals the timestamp of the
/// most recent one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique ID of this conversation.
    pub id: ConversationId,
    /// Display title (defaults to "New chat").
    pub title: String,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the most recent message append.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Default title used when none is supplied.
    pub const DEFAULT_TITLE: &'static str = "New chat";

    /// Creates a new empty conversation with both timestamps set to now.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            title: title.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Listing view of a conversation: metadata plus its message count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    /// Conversation metadata.
    pub conversation: Conversation,
    /// Number of messages currently in the conversation.
    pub message_count: u64,
}

/// A conversation together with its full message history, ordered by
/// creation time ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRecord {
    /// Conversation metadata.
    pub conversation: Conversation,
    /// Messages ordered by creation time ascending.
    pub messages: Vec<Message>,
}

impl ConversationRecord {
    /// Number of messages already in the conversation; doubles as the turn
    /// counter for the next chat exchange.
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
