//! HTTP DTOs for conversation endpoints.
//!
//! These types decouple the HTTP API from domain types, allowing
//! independent evolution.

use serde::{Deserialize, Serialize};

use crate::domain::conversation::{
    Conversation, ConversationRecord, ConversationSummary, Message, Role,
};

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Listing view of a conversation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    /// Conversation ID.
    pub id: String,
    /// Display title.
    pub title: String,
    /// Total message count.
    pub message_count: u64,
    /// When the conversation was created (RFC 3339).
    pub created_at: String,
    /// When the conversation last received a message (RFC 3339).
    pub updated_at: String,
}

impl ConversationView {
    pub(super) fn from_summary(summary: &ConversationSummary) -> Self {
        Self::from_parts(&summary.conversation, summary.message_count)
    }

    pub(super) fn from_parts(conversation: &Conversation, message_count: u64) -> Self {
        Self {
            id: conversation.id.to_string(),
            title: conversation.title.clone(),
            message_count,
            created_at: conversation.created_at.to_rfc3339(),
            updated_at: conversation.updated_at.to_rfc3339(),
        }
    }
}

/// A conversation with its full message history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetailView {
    /// Conversation ID.
    pub id: String,
    /// Display title.
    pub title: String,
    /// When the conversation was created (RFC 3339).
    pub created_at: String,
    /// When the conversation last received a message (RFC 3339).
    pub updated_at: String,
    /// Messages ordered by creation time ascending.
    pub messages: Vec<MessageView>,
}

impl ConversationDetailView {
    pub(super) fn from_record(record: &ConversationRecord) -> Self {
        Self {
            id: record.conversation.id.to_string(),
            title: record.conversation.title.clone(),
            created_at: record.conversation.created_at.to_rfc3339(),
            updated_at: record.conversation.updated_at.to_rfc3339(),
            messages: record.messages.iter().map(MessageView::from_message).collect(),
        }
    }
}

/// View of a message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageView {
    /// Message ID.
    pub id: String,
    /// Role of the message author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// Source citations.
    pub sources: Vec<String>,
    /// When the message was appended (RFC 3339).
    pub created_at: String,
}

impl MessageView {
    pub(super) fn from_message(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            role: message.role,
            content: message.content.clone(),
            sources: message.sources.clone(),
            created_at: message.created_at.to_rfc3339(),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body for POST /api/conversations.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConversationRequest {
    /// Optional title; defaults to "New chat".
    pub title: Option<String>,
}

/// Body for PATCH /api/conversations/{id}.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameConversationRequest {
    /// New title.
    pub title: String,
}

/// Body for POST /api/conversations/{id}/messages.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendMessageRequest {
    /// "user" or "assistant"; validated in the handler so other values
    /// surface as a 400 rather than a deserialization failure.
    pub role: String,
    /// Message text.
    pub content: Option<String>,
    /// Source citations.
    pub sources: Option<Vec<String>>,
}

impl AppendMessageRequest {
    /// Validates the request, yielding the parsed role and content.
    pub fn validate(&self) -> Result<(Role, String, Vec<String>), &'static str> {
        let role: Role = self.role.parse().map_err(|_| "Invalid role")?;
        let content = self.content.clone().ok_or("Message content is required")?;
        Ok((role, content, self.sources.clone().unwrap_or_default()))
    }
}

/// Query parameters for GET /api/conversations.
#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    /// Maximum number of conversations to return.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl ListParams {
    /// Default listing limit.
    pub const DEFAULT_LIMIT: u32 = 100;
    /// Maximum allowed limit.
    pub const MAX_LIMIT: u32 = 500;

    /// Get the effective limit, capped at MAX_LIMIT.
    pub fn effective_limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod append_message_request {
        use super::*;

        #[test]
        fn accepts_user_and_assistant_roles() {
            for role in ["user", "assistant"] {
                let request = AppendMessageRequest {
                    role: role.to_string(),
                    content: Some("hi".to_string()),
                    sources: None,
                };
                assert!(request.validate().is_ok());
            }
        }

        #[test]
        fn rejects_other_roles() {
            let request = AppendMessageRequest {
                role: "system".to_string(),
                content: Some("hi".to_string()),
                sources: None,
            };
            assert_eq!(request.validate().err(), Some("Invalid role"));
        }

        #[test]
        fn rejects_missing_content() {
            let request = AppendMessageRequest {
                role: "user".to_string(),
                content: None,
                sources: None,
            };
            assert_eq!(request.validate().err(), Some("Message content is required"));
        }

        #[test]
        fn defaults_sources_to_empty() {
            let request = AppendMessageRequest {
                role: "assistant".to_string(),
                content: Some("hi".to_string()),
                sources: None,
            };
            let (_, _, sources) = request.validate().unwrap();
            assert!(sources.is_empty());
        }
    }

    mod list_params {
        use super::*;

        #[test]
        fn defaults_and_clamps_limit() {
            assert_eq!(ListParams { limit: None }.effective_limit(), 100);
            assert_eq!(ListParams { limit: Some(50) }.effective_limit(), 50);
            assert_eq!(ListParams { limit: Some(9999) }.effective_limit(), 500);
        }
    }

    mod views {
        use super::*;
        use crate::domain::conversation::{ConversationId, MessageId};
        use chrono::Utc;

        #[test]
        fn message_view_serializes_camel_case() {
            let view = MessageView::from_message(&Message {
                id: MessageId::new(),
                conversation_id: ConversationId::new(),
                role: Role::Assistant,
                content: "Hi".to_string(),
                sources: vec!["src1".to_string()],
                created_at: Utc::now(),
            });
            let json = serde_json::to_value(&view).unwrap();
            assert_eq!(json["role"], "assistant");
            assert!(json["createdAt"].is_string());
            assert_eq!(json["sources"][0], "src1");
        }
    }
}
