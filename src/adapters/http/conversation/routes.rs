//! Axum routes for conversation CRUD endpoints.

use axum::routing::get;
use axum::Router;

use super::handlers::{
    append_message, create_conversation, delete_conversation, get_conversation, get_messages,
    list_conversations, rename_conversation,
};
use crate::adapters::http::AppState;

/// Creates the conversation CRUD routes.
///
/// - GET    /conversations              - List conversations
/// - POST   /conversations              - Create a conversation
/// - GET    /conversations/:id          - Conversation with messages
/// - PATCH  /conversations/:id          - Rename
/// - DELETE /conversations/:id          - Delete with messages
/// - GET    /conversations/:id/messages - Ordered message history
/// - POST   /conversations/:id/messages - Append a single message
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/conversations",
            get(list_conversations).post(create_conversation),
        )
        .route(
            "/conversations/:id",
            get(get_conversation)
                .patch(rename_conversation)
                .delete(delete_conversation),
        )
        .route(
            "/conversations/:id/messages",
            get(get_messages).post(append_message),
        )
}
