//! HTTP implementation of the AgentClient port.
//!
//! Talks to the agent service over `POST {base_url}/chat/stream`, which
//! answers with an SSE event stream, and `GET {base_url}/health` for
//! reachability probes.

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use secrecy::ExposeSecret;

use super::sse::{self, SseFrameDecoder};
use crate::config::AgentConfig;
use crate::ports::{AgentClient, AgentError, AgentEventStream, AgentFrame, ChatRequest};

/// HTTP client for the upstream agent service.
pub struct HttpAgentClient {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpAgentClient {
    /// Creates a client from the agent configuration.
    pub fn new(config: &AgentConfig) -> Self {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            bearer_token: config
                .bearer_token
                .as_ref()
                .map(|token| token.expose_secret().clone()),
        }
    }

    fn chat_stream_url(&self) -> String {
        format!("{}/chat/stream", self.base_url)
    }

    fn health_url(&self) -> String {
        format!("{}/health", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn connection_error(&self, error: reqwest::Error) -> AgentError {
        if error.is_timeout() {
            AgentError::Unreachable(format!("agent connection timed out: {error}"))
        } else {
            AgentError::Unreachable(error.to_string())
        }
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<AgentEventStream, AgentError> {
        let response = self
            .authorize(self.client.post(self.chat_stream_url()))
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Unreachable(format!(
                "agent returned {status}: {body}"
            )));
        }

        Ok(decode_frames(response.bytes_stream()))
    }

    async fn probe(&self) -> Result<(), AgentError> {
        let response = self
            .authorize(self.client.get(self.health_url()))
            .send()
            .await
            .map_err(|e| self.connection_error(e))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AgentError::Unreachable(format!("agent returned {status}")))
        }
    }
}

/// Decodes an SSE byte stream into agent frames.
///
/// Keepalive/comment frames are dropped; a trailing partial frame at
/// end-of-stream is discarded (the relay treats the missing terminal
/// event as an abnormal close).
fn decode_frames<S>(bytes: S) -> AgentEventStream
where
    S: Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
{
    struct DecodeState<S> {
        bytes: Pin<Box<S>>,
        decoder: SseFrameDecoder,
        pending: VecDeque<String>,
    }

    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: SseFrameDecoder::new(),
        pending: VecDeque::new(),
    };

    Box::pin(futures::stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(raw) = state.pending.pop_front() {
                match sse::parse_frame(&raw)? {
                    Some(event) => return Ok(Some((AgentFrame { raw, event }, state))),
                    None => continue,
                }
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.pending.extend(state.decoder.push(&chunk)),
                Some(Err(error)) => return Err(AgentError::Stream(error.to_string())),
                None => return Ok(None),
            }
        }
    }))
}
