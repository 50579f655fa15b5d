//! Agent Client port - interface to the upstream reasoning agent.
//!
//! The agent is an opaque streaming service: it accepts the conversation
//! history plus the new user message and answers with an ordered event
//! stream (`status | delta | done | error`). Each stream item carries both
//! the parsed event (for the reducer) and the raw transport frame, so the
//! relay can forward upstream output downstream byte-for-byte.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use thiserror::Error;

use crate::domain::conversation::{Message, Role, TurnEvent};

/// Port for the upstream agent's streaming chat call.
#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Opens one streaming chat call.
    ///
    /// Fails fast with [`AgentError::Unreachable`] if the connection
    /// cannot be established; in that case no events are produced.
    async fn stream_chat(&self, request: ChatRequest) -> Result<AgentEventStream, AgentError>;

    /// Cheap reachability probe for the health surface.
    async fn probe(&self) -> Result<(), AgentError>;
}

/// Ordered stream of agent events for one turn.
pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentFrame, AgentError>> + Send>>;

/// One upstream event: the parsed form plus the verbatim transport frame
/// (without its blank-line terminator).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentFrame {
    /// The raw frame exactly as received.
    pub raw: String,
    /// The parsed event.
    pub event: TurnEvent,
}

/// Request body for the agent's `/chat/stream` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Prior messages of the conversation, oldest first.
    pub conversation_history: Vec<HistoryMessage>,
    /// The new user message for this turn.
    pub new_user_message: String,
}

impl ChatRequest {
    /// Builds a request from a conversation's history and the new content.
    pub fn new(history: &[Message], new_user_message: impl Into<String>) -> Self {
        Self {
            conversation_history: history.iter().map(HistoryMessage::from).collect(),
            new_user_message: new_user_message.into(),
        }
    }
}

/// A history entry as the agent expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryMessage {
    /// Who authored the message.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl From<&Message> for HistoryMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Agent client errors.
#[derive(Debug, Clone, Error)]
pub enum AgentError {
    /// The agent could not be reached at connection time; safe to retry.
    #[error("agent unreachable: {0}")]
    Unreachable(String),

    /// The agent sent something outside the event protocol.
    #[error("agent protocol error: {0}")]
    Protocol(String),

    /// The open stream failed at the transport level.
    #[error("agent stream error: {0}")]
    Stream(String),
}
