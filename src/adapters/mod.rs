//! Adapters: concrete implementations of the ports plus the HTTP surface.

pub mod agent;
pub mod http;
pub mod memory;
pub mod postgres;

pub use agent::{HttpAgentClient, MockAgentClient};
pub use memory::InMemoryConversationStore;
pub use postgres::PostgresConversationStore;
