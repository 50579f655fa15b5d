//! HTTP handlers for conversation CRUD endpoints.
//!
//! Thin pass-throughs: parse and validate, delegate to the Conversation
//! Store, map the result.

use axum::extract::{Json, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::adapters::http::{ApiError, AppState};
use crate::domain::conversation::{Conversation, ConversationId};
use crate::ports::NewMessage;

use super::dto::{
    AppendMessageRequest, ConversationDetailView, ConversationView, CreateConversationRequest,
    ListParams, MessageView, RenameConversationRequest,
};

/// Response wrapper for GET /api/conversations.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationsResponse {
    pub conversations: Vec<ConversationView>,
}

/// Response wrapper for GET /api/conversations/{id}/messages.
#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageView>,
}

fn parse_id(raw: &str) -> Result<ConversationId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest("Invalid conversation ID format".to_string()))
}

/// POST /api/conversations - Create a conversation.
pub async fn create_conversation(
    State(state): State<AppState>,
    body: Option<Json<CreateConversationRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let title = request
        .title
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| Conversation::DEFAULT_TITLE.to_string());

    let conversation = state.store.create_conversation(&title).await?;
    let view = ConversationView::from_parts(&conversation, 0);
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /api/conversations - List conversations, most recently active
/// first.
pub async fn list_conversations(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let summaries = state
        .store
        .list_conversations(params.effective_limit())
        .await?;
    let conversations = summaries.iter().map(ConversationView::from_summary).collect();
    Ok(Json(ConversationsResponse { conversations }))
}

/// GET /api/conversations/{id} - Fetch a conversation with its messages.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let record = state.store.get_conversation(id).await?;
    Ok(Json(ConversationDetailView::from_record(&record)))
}

/// PATCH /api/conversations/{id} - Rename a conversation.
pub async fn rename_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<RenameConversationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    if request.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Title cannot be empty".to_string()));
    }
    state.store.rename_conversation(id, &request.title).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/conversations/{id} - Delete a conversation and its
/// messages.
pub async fn delete_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    state.store.delete_conversation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/conversations/{id}/messages - Messages ordered by creation
/// time.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let record = state.store.get_conversation(id).await?;
    let messages = record.messages.iter().map(MessageView::from_message).collect();
    Ok(Json(MessagesResponse { messages }))
}

/// POST /api/conversations/{id}/messages - Append a single message.
pub async fn append_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<AppendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_id(&id)?;
    let (role, content, sources) = request
        .validate()
        .map_err(|message| ApiError::BadRequest(message.to_string()))?;

    let message = NewMessage {
        role,
        content,
        sources,
        turn_key: None,
    };
    let outcome = state.store.append_message(id, message).await?;
    let view = MessageView::from_message(outcome.message());
    Ok((StatusCode::CREATED, Json(view)))
}
