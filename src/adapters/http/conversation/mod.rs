//! Conversation CRUD surface: thin pass-throughs to the Conversation
//! Store.

mod dto;
mod handlers;
mod routes;

pub use dto::{
    AppendMessageRequest, ConversationDetailView, ConversationView, CreateConversationRequest,
    MessageView, RenameConversationRequest,
};
pub use routes::routes;
