//! Ports: async interfaces between the application core and the outside
//! world. Adapters implement them; the relay and HTTP surface depend only
//! on these traits.

mod agent_client;
mod conversation_store;

pub use agent_client::{
    AgentClient, AgentError, AgentEventStream, AgentFrame, ChatRequest, HistoryMessage,
};
pub use conversation_store::{AppendOutcome, ConversationStore, NewMessage, StoreError};
