//! Conversation Store port - durable conversations and their messages.
//!
//! The store exclusively owns persisted conversation state. Appends on one
//! conversation are atomic and serialized: concurrent appends are never
//! lost, reordered relative to their true arrival order, or given
//! duplicate identifiers, and a successful append is the only operation
//! that advances a conversation's `updated_at`.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::conversation::{
    Conversation, ConversationId, ConversationRecord, ConversationSummary, Message, Role, TurnKey,
};

/// Port for conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates a new empty conversation with both timestamps set to now.
    async fn create_conversation(&self, title: &str) -> Result<Conversation, StoreError>;

    /// Lists conversations ordered by `updated_at` descending.
    async fn list_conversations(&self, limit: u32) -> Result<Vec<ConversationSummary>, StoreError>;

    /// Fetches a conversation and its messages ordered by creation time
    /// ascending.
    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationRecord, StoreError>;

    /// Appends one message, assigning a fresh identifier and timestamp and
    /// advancing the conversation's `updated_at` to that timestamp.
    ///
    /// If the message carries a turn key and a message with the same
    /// (conversation, key, role) already exists, nothing is written and
    /// the existing message is returned as
    /// [`AppendOutcome::AlreadyRecorded`].
    async fn append_message(
        &self,
        conversation_id: ConversationId,
        message: NewMessage,
    ) -> Result<AppendOutcome, StoreError>;

    /// Renames a conversation.
    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<(), StoreError>;

    /// Deletes a conversation and all of its messages.
    async fn delete_conversation(&self, id: ConversationId) -> Result<(), StoreError>;
}

/// A message to append; identifier and timestamp are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    /// Who authored the message.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Source citations.
    pub sources: Vec<String>,
    /// Optional idempotence key for the turn this message belongs to.
    pub turn_key: Option<TurnKey>,
}

impl NewMessage {
    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            sources: Vec::new(),
            turn_key: None,
        }
    }

    /// Creates an assistant message with its source citations.
    pub fn assistant(content: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            sources,
            turn_key: None,
        }
    }

    /// Attaches a turn idempotence key.
    pub fn with_turn_key(mut self, key: TurnKey) -> Self {
        self.turn_key = Some(key);
        self
    }
}

/// Result of an append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The message was written.
    Appended(Message),
    /// A message for the same (conversation, turn key, role) already
    /// existed; nothing was written.
    AlreadyRecorded(Message),
}

impl AppendOutcome {
    /// The persisted message, whether written now or earlier.
    pub fn message(&self) -> &Message {
        match self {
            Self::Appended(message) | Self::AlreadyRecorded(message) => message,
        }
    }

    /// Returns true if this append actually wrote a row.
    pub fn was_appended(&self) -> bool {
        matches!(self, Self::Appended(_))
    }
}

/// Store errors.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The referenced conversation does not exist.
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    /// The backend failed.
    #[error("database error: {0}")]
    Database(String),
}
