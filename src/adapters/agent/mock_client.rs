//! Mock agent client for testing.
//!
//! A scriptable implementation of the AgentClient port: tests queue
//! scripted streams (consumed in order) without running a real agent.
//!
//! # Example
//!
//! ```ignore
//! let agent = MockAgentClient::new()
//!     .with_events(vec![TurnEvent::delta("Hi"), TurnEvent::done()]);
//!
//! let stream = agent.stream_chat(request).await?;
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;

use super::sse;
use crate::domain::conversation::TurnEvent;
use crate::ports::{AgentClient, AgentError, AgentEventStream, AgentFrame, ChatRequest};

/// One scripted response stream.
#[derive(Debug, Clone)]
enum MockScript {
    /// Stream these events, then close (or stall instead of closing).
    Events { events: Vec<TurnEvent>, stall: bool },
    /// Fail at connection time.
    Unreachable(String),
}

/// Mock agent client; scripts are consumed in queue order.
#[derive(Debug, Default)]
pub struct MockAgentClient {
    scripts: Mutex<VecDeque<MockScript>>,
    calls: Mutex<Vec<ChatRequest>>,
    unhealthy: AtomicBool,
}

impl MockAgentClient {
    /// Creates a mock with no scripted streams.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a stream that emits `events` and then closes.
    pub fn with_events(self, events: Vec<TurnEvent>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push_back(MockScript::Events {
                events,
                stall: false,
            });
        self
    }

    /// Queues a stream that emits `events` and then never yields again,
    /// for idle-timeout and cancellation tests.
    pub fn with_stalled_stream(self, events: Vec<TurnEvent>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push_back(MockScript::Events {
                events,
                stall: true,
            });
        self
    }

    /// Queues a connection failure.
    pub fn with_unreachable(self, message: impl Into<String>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push_back(MockScript::Unreachable(message.into()));
        self
    }

    /// Makes `probe` report the agent as unreachable.
    pub fn set_unhealthy(&self) {
        self.unhealthy.store(true, Ordering::SeqCst);
    }

    /// Number of `stream_chat` calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All recorded `stream_chat` requests.
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }

    /// Next script, or a default single-delta stream.
    fn next_script(&self) -> MockScript {
        self.scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockScript::Events {
                events: vec![TurnEvent::delta("Mock response"), TurnEvent::done()],
                stall: false,
            })
    }
}

#[async_trait]
impl AgentClient for MockAgentClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<AgentEventStream, AgentError> {
        self.calls.lock().unwrap().push(request);

        match self.next_script() {
            MockScript::Unreachable(message) => Err(AgentError::Unreachable(message)),
            MockScript::Events { events, stall } => {
                let frames: Vec<Result<AgentFrame, AgentError>> = events
                    .into_iter()
                    .map(|event| {
                        Ok(AgentFrame {
                            raw: sse::encode_event(&event),
                            event,
                        })
                    })
                    .collect();
                let head = stream::iter(frames);
                if stall {
                    Ok(Box::pin(head.chain(stream::pending())))
                } else {
                    Ok(Box::pin(head))
                }
            }
        }
    }

    async fn probe(&self) -> Result<(), AgentError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            Err(AgentError::Unreachable("agent marked unhealthy".to_string()))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn request() -> ChatRequest {
        ChatRequest {
            conversation_history: Vec::new(),
            new_user_message: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn streams_scripted_events_in_order() {
        let agent = MockAgentClient::new()
            .with_events(vec![TurnEvent::delta("Hi"), TurnEvent::done()]);

        let mut stream = agent.stream_chat(request()).await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.event, TurnEvent::delta("Hi"));
        assert_eq!(first.raw, sse::encode_event(&TurnEvent::delta("Hi")));
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.event, TurnEvent::done());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn unreachable_script_fails_at_connection_time() {
        let agent = MockAgentClient::new().with_unreachable("refused");
        assert!(matches!(
            agent.stream_chat(request()).await,
            Err(AgentError::Unreachable(_))
        ));
    }

    #[tokio::test]
    async fn records_calls() {
        let agent = MockAgentClient::new().with_events(vec![TurnEvent::done()]);
        agent.stream_chat(request()).await.unwrap();
        assert_eq!(agent.call_count(), 1);
        assert_eq!(agent.calls()[0].new_user_message, "hello");
    }

    #[tokio::test]
    async fn probe_reflects_health_toggle() {
        let agent = MockAgentClient::new();
        assert!(agent.probe().await.is_ok());
        agent.set_unhealthy();
        assert!(agent.probe().await.is_err());
    }
}
