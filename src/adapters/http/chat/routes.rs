//! Axum routes for the chat gateway.

use axum::routing::post;
use axum::Router;

use super::handlers::stream_chat;
use crate::adapters::http::AppState;

/// Creates the chat routes.
///
/// - POST /chat/stream - Run one chat turn, relaying agent events live
pub fn routes() -> Router<AppState> {
    Router::new().route("/chat/stream", post(stream_chat))
}
