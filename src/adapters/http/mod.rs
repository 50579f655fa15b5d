//! HTTP surface: request routing, shared state, and error mapping.

pub mod chat;
pub mod conversation;
mod error;
mod health;

pub use error::{ApiError, ErrorResponse};

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::timeout::TimeoutLayer;

use crate::application::handlers::StreamRelay;
use crate::ports::{AgentClient, ConversationStore};

/// Shared application state for all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Conversation persistence.
    pub store: Arc<dyn ConversationStore>,
    /// Upstream agent (used directly only by the health surface).
    pub agent: Arc<dyn AgentClient>,
    /// The stream relay driving chat turns.
    pub relay: Arc<StreamRelay>,
}

impl AppState {
    /// Creates the shared state.
    pub fn new(
        store: Arc<dyn ConversationStore>,
        agent: Arc<dyn AgentClient>,
        relay: Arc<StreamRelay>,
    ) -> Self {
        Self {
            store,
            agent,
            relay,
        }
    }
}

/// Builds the API router.
///
/// The request timeout applies to the CRUD and health routes only; the
/// chat stream stays open for as long as the agent is talking and is
/// bounded by the relay's idle timeout instead.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let bounded = Router::new()
        .merge(conversation::routes())
        .merge(health::routes())
        .layer(TimeoutLayer::new(request_timeout));

    let api = bounded.merge(chat::routes());

    Router::new().nest("/api", api).with_state(state)
}
