//! HTTP handler for the streaming chat gateway.
//!
//! Request lifecycle: received -> validating -> relaying -> completed or
//! failed. Failures before the stream opens surface as JSON error
//! responses; once streaming has begun the protocol is append-only, so
//! failures arrive as a terminal `error` event and nothing already sent
//! is retracted.

use std::convert::Infallible;

use axum::body::Body;
use axum::extract::{Json, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::adapters::agent::sse;
use crate::adapters::http::{ApiError, AppState};
use crate::application::handlers::{RelayError, RelayFrame};
use crate::domain::conversation::ConversationId;

use super::dto::ChatStreamRequest;

/// POST /api/chat/stream - Run one chat turn, relaying agent events live.
///
/// # Errors
/// - 400 Bad Request: empty/oversized content or malformed conversation ID
/// - 404 Not Found: conversation does not exist (never implicitly created)
/// - 502 Bad Gateway: agent unreachable at connection time
pub async fn stream_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatStreamRequest>,
) -> Result<Response, ApiError> {
    // received -> validating
    request
        .validate()
        .map_err(|message| ApiError::BadRequest(message.to_string()))?;
    let conversation_id: ConversationId = request
        .conversation_id
        .parse()
        .map_err(|_| ApiError::BadRequest("Invalid conversation ID format".to_string()))?;

    // This endpoint does not implicitly create conversations.
    let record = state.store.get_conversation(conversation_id).await?;

    // validating -> relaying
    let turn = state
        .relay
        .stream_turn(record, request.content)
        .await
        .map_err(|error| match error {
            RelayError::UpstreamUnreachable(message) => ApiError::UpstreamUnreachable(message),
            other => ApiError::Internal(other.to_string()),
        })?;

    debug!(%conversation_id, "relaying chat turn");

    let frames = ReceiverStream::new(turn.frames)
        .map(|frame| Ok::<_, Infallible>(encode_frame(&frame)));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache, no-transform")
        .body(Body::from_stream(frames))
        .map_err(|error| ApiError::Internal(error.to_string()))
}

/// Encodes one relay frame for the wire. Upstream frames go out exactly
/// as received; only the frame terminator is appended.
fn encode_frame(frame: &RelayFrame) -> String {
    match frame {
        RelayFrame::Upstream(raw) => format!("{raw}\n\n"),
        RelayFrame::Terminal(failure) => format!("{}\n\n", sse::encode_failure(failure)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::handlers::{FailureCode, RelayFailure};

    #[test]
    fn upstream_frames_are_forwarded_verbatim() {
        let raw = "event: delta\ndata: {\"text\":\"Hi\"}".to_string();
        let encoded = encode_frame(&RelayFrame::Upstream(raw.clone()));
        assert_eq!(encoded, format!("{raw}\n\n"));
    }

    #[test]
    fn terminal_frames_encode_as_error_events() {
        let encoded = encode_frame(&RelayFrame::Terminal(RelayFailure {
            code: FailureCode::Timeout,
            message: "agent idle for more than 60s".to_string(),
            user_recorded: false,
        }));
        assert!(encoded.starts_with("event: error\n"));
        assert!(encoded.ends_with("\n\n"));
    }
}
