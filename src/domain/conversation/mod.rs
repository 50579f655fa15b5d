//! Conversations, their messages, and the streaming-turn reduction.

mod conversation;
mod message;
mod turn;

pub use conversation::{Conversation, ConversationId, ConversationRecord, ConversationSummary};
pub use message::{Message, MessageId, Role};
pub use turn::{ReducedMessage, StreamingTurn, TurnError, TurnEvent, TurnKey};
