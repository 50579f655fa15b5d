//! Stream Relay - bridges one upstream agent stream to one downstream
//! caller while reducing the events into a persisted turn.
//!
//! One relay task runs per chat request. It multiplexes the upstream
//! event stream and the downstream sink: every upstream frame is
//! forwarded verbatim, in arrival order, while the same parsed event
//! feeds the [`StreamingTurn`] accumulator. On a clean `done` the relay
//! persists the user message and then the reduced assistant message,
//! both guarded by the turn's idempotence key; on any failure or on
//! downstream disconnect it persists nothing.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::domain::conversation::{
    ConversationId, ConversationRecord, Message, StreamingTurn, TurnEvent, TurnKey,
};
use crate::ports::{AgentClient, AgentError, AgentEventStream, ChatRequest, ConversationStore, NewMessage};

/// Configuration for the relay.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum idle time between upstream events; exceeding it is treated
    /// as an upstream error.
    pub idle_timeout: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Downstream frames emitted by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    /// An upstream frame, relayed verbatim (without its blank-line
    /// terminator).
    Upstream(String),
    /// A terminal failure synthesized by the relay itself. Upstream
    /// `error` events are never wrapped here; they arrive as
    /// [`RelayFrame::Upstream`] like any other frame.
    Terminal(RelayFailure),
}

/// A relay-synthesized terminal failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFailure {
    /// Error code for programmatic handling.
    pub code: FailureCode,
    /// Human-readable error message.
    pub message: String,
    /// Whether the turn's user message was persisted before the failure.
    pub user_recorded: bool,
}

impl RelayFailure {
    fn timeout(idle: Duration) -> Self {
        Self {
            code: FailureCode::Timeout,
            message: format!("agent idle for more than {}s", idle.as_secs()),
            user_recorded: false,
        }
    }

    fn upstream_closed(message: impl Into<String>) -> Self {
        Self {
            code: FailureCode::UpstreamClosed,
            message: message.into(),
            user_recorded: false,
        }
    }

    fn save_failed(message: impl Into<String>, user_recorded: bool) -> Self {
        Self {
            code: FailureCode::SaveFailed,
            message: message.into(),
            user_recorded,
        }
    }
}

/// Codes for relay-synthesized failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCode {
    /// The upstream stream closed or broke before a terminal event.
    UpstreamClosed,
    /// No upstream event arrived within the idle timeout.
    Timeout,
    /// The stream succeeded but persisting the turn failed.
    SaveFailed,
}

impl FailureCode {
    /// Stable wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UpstreamClosed => "upstream_closed",
            Self::Timeout => "timeout",
            Self::SaveFailed => "save_failed",
        }
    }

    /// Returns true if retrying the whole turn is sensible. `save_failed`
    /// is excluded: the user message may already be recorded, so only the
    /// save should be retried.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::UpstreamClosed | Self::Timeout)
    }
}

/// Errors terminating a relay turn.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// The agent could not be reached; no events were forwarded.
    #[error("agent unreachable: {0}")]
    UpstreamUnreachable(String),

    /// The agent reported failure or its stream broke mid-turn; nothing
    /// was persisted.
    #[error("agent stream failed: {0}")]
    UpstreamTerminal(String),

    /// No upstream event arrived within the idle timeout.
    #[error("agent idle for more than {0}s")]
    IdleTimeout(u64),

    /// The stream succeeded but a store append failed. `user_recorded`
    /// distinguishes the recoverable inconsistency where the user message
    /// was saved and only the assistant append should be retried.
    #[error("failed to save the turn: {message}")]
    Persistence {
        /// Whether the user message was persisted before the failure.
        user_recorded: bool,
        /// Store error description.
        message: String,
    },
}

/// Terminal outcome of one relay turn.
#[derive(Debug)]
pub enum TurnOutcome {
    /// Both messages were persisted.
    Completed {
        /// The persisted user message.
        user_message: Message,
        /// The persisted assistant message.
        assistant_message: Message,
    },
    /// The turn failed; the caller has received exactly one terminal
    /// failure event.
    Failed(RelayError),
    /// The downstream consumer disconnected; the upstream call was
    /// dropped and nothing was persisted.
    Cancelled,
}

/// A running chat turn: the frame stream for the response body plus a
/// handle resolving to the turn's terminal outcome.
pub struct ChatTurn {
    /// Frames to forward to the caller, in upstream arrival order.
    pub frames: mpsc::Receiver<RelayFrame>,
    /// Resolves once the relay task finishes.
    pub outcome: JoinHandle<TurnOutcome>,
}

/// Bridges upstream agent streams to downstream callers.
pub struct StreamRelay {
    agent: Arc<dyn AgentClient>,
    store: Arc<dyn ConversationStore>,
    config: RelayConfig,
}

impl StreamRelay {
    /// Creates a relay over the given ports.
    pub fn new(
        agent: Arc<dyn AgentClient>,
        store: Arc<dyn ConversationStore>,
        config: RelayConfig,
    ) -> Self {
        Self {
            agent,
            store,
            config,
        }
    }

    /// Starts one chat turn against an existing conversation.
    ///
    /// Opens exactly one upstream streaming call; if the connection cannot
    /// be established this fails fast with
    /// [`RelayError::UpstreamUnreachable`] and no events are produced.
    /// Otherwise the relay task runs to its terminal outcome independently
    /// of whether the caller keeps polling [`ChatTurn::frames`].
    pub async fn stream_turn(
        &self,
        record: ConversationRecord,
        content: String,
    ) -> Result<ChatTurn, RelayError> {
        let request = ChatRequest::new(&record.messages, content.as_str());
        let events = self.agent.stream_chat(request).await.map_err(|e| match e {
            AgentError::Unreachable(message) => RelayError::UpstreamUnreachable(message),
            other => RelayError::UpstreamUnreachable(other.to_string()),
        })?;

        let conversation_id = record.conversation.id;
        let turn_key = TurnKey::derive(conversation_id, &content, record.message_count());
        let (tx, rx) = mpsc::channel(32);

        let store = Arc::clone(&self.store);
        let idle_timeout = self.config.idle_timeout;
        let outcome = tokio::spawn(async move {
            let outcome = run_turn(
                events,
                tx,
                store,
                conversation_id,
                content,
                turn_key,
                idle_timeout,
            )
            .await;
            match &outcome {
                TurnOutcome::Completed { .. } => {
                    debug!(%conversation_id, "chat turn completed");
                }
                TurnOutcome::Failed(error) => {
                    warn!(%conversation_id, %error, "chat turn failed");
                }
                TurnOutcome::Cancelled => {
                    debug!(%conversation_id, "chat turn cancelled by caller");
                }
            }
            outcome
        });

        Ok(ChatTurn {
            frames: rx,
            outcome,
        })
    }
}

/// The per-turn relay loop: forward, reduce, then persist.
async fn run_turn(
    mut events: AgentEventStream,
    tx: mpsc::Sender<RelayFrame>,
    store: Arc<dyn ConversationStore>,
    conversation_id: ConversationId,
    content: String,
    turn_key: TurnKey,
    idle_timeout: Duration,
) -> TurnOutcome {
    let mut reducer = StreamingTurn::new();

    loop {
        let next = tokio::select! {
            // Downstream went away: drop the upstream call, persist nothing.
            _ = tx.closed() => return TurnOutcome::Cancelled,
            next = timeout(idle_timeout, events.next()) => next,
        };

        match next {
            Err(_) => {
                let _ = tx
                    .send(RelayFrame::Terminal(RelayFailure::timeout(idle_timeout)))
                    .await;
                return TurnOutcome::Failed(RelayError::IdleTimeout(idle_timeout.as_secs()));
            }
            Ok(None) => {
                let message = "agent stream closed before a terminal event";
                let _ = tx
                    .send(RelayFrame::Terminal(RelayFailure::upstream_closed(message)))
                    .await;
                return TurnOutcome::Failed(RelayError::UpstreamTerminal(message.to_string()));
            }
            Ok(Some(Err(error))) => {
                let _ = tx
                    .send(RelayFrame::Terminal(RelayFailure::upstream_closed(
                        error.to_string(),
                    )))
                    .await;
                return TurnOutcome::Failed(RelayError::UpstreamTerminal(error.to_string()));
            }
            Ok(Some(Ok(frame))) => {
                reducer.apply(&frame.event);
                let event = frame.event;
                if tx.send(RelayFrame::Upstream(frame.raw)).await.is_err() {
                    return TurnOutcome::Cancelled;
                }
                match event {
                    // The error frame was already forwarded; it is the
                    // turn's single caller-visible terminal event.
                    TurnEvent::Error { message } => {
                        return TurnOutcome::Failed(RelayError::UpstreamTerminal(message));
                    }
                    TurnEvent::Done { .. } => break,
                    _ => {}
                }
            }
        }
    }

    // Clean `done`: the upstream call is finished with; release it before
    // the store round-trips.
    drop(events);

    let reduced = match reducer.finish() {
        Ok(reduced) => reduced,
        Err(error) => {
            let _ = tx
                .send(RelayFrame::Terminal(RelayFailure::upstream_closed(
                    error.to_string(),
                )))
                .await;
            return TurnOutcome::Failed(RelayError::UpstreamTerminal(error.to_string()));
        }
    };

    // User message first, assistant second; both idempotent under the
    // turn key so a retried turn never double-appends.
    let user_message = match store
        .append_message(
            conversation_id,
            NewMessage::user(content.as_str()).with_turn_key(turn_key.clone()),
        )
        .await
    {
        Ok(outcome) => outcome.message().clone(),
        Err(error) => {
            let _ = tx
                .send(RelayFrame::Terminal(RelayFailure::save_failed(
                    error.to_string(),
                    false,
                )))
                .await;
            return TurnOutcome::Failed(RelayError::Persistence {
                user_recorded: false,
                message: error.to_string(),
            });
        }
    };

    let assistant_message = match store
        .append_message(
            conversation_id,
            NewMessage::assistant(reduced.content, reduced.sources).with_turn_key(turn_key),
        )
        .await
    {
        Ok(outcome) => outcome.message().clone(),
        Err(error) => {
            let _ = tx
                .send(RelayFrame::Terminal(RelayFailure::save_failed(
                    error.to_string(),
                    true,
                )))
                .await;
            return TurnOutcome::Failed(RelayError::Persistence {
                user_recorded: true,
                message: error.to_string(),
            });
        }
    };

    TurnOutcome::Completed {
        user_message,
        assistant_message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::agent::MockAgentClient;
    use crate::adapters::memory::InMemoryConversationStore;
    use crate::domain::conversation::Role;

    async fn setup() -> (Arc<InMemoryConversationStore>, ConversationRecord) {
        let store = Arc::new(InMemoryConversationStore::new());
        let conversation = store.create_conversation("Test chat").await.unwrap();
        let record = store.get_conversation(conversation.id).await.unwrap();
        (store, record)
    }

    fn relay(
        agent: MockAgentClient,
        store: Arc<InMemoryConversationStore>,
        idle_timeout: Duration,
    ) -> StreamRelay {
        StreamRelay::new(Arc::new(agent), store, RelayConfig { idle_timeout })
    }

    async fn drain(mut frames: mpsc::Receiver<RelayFrame>) -> Vec<RelayFrame> {
        let mut collected = Vec::new();
        while let Some(frame) = frames.recv().await {
            collected.push(frame);
        }
        collected
    }

    #[tokio::test]
    async fn clean_done_persists_user_then_assistant() {
        let (store, record) = setup().await;
        let agent = MockAgentClient::new().with_events(vec![
            TurnEvent::status("thinking"),
            TurnEvent::delta_with_sources("Hi", ["src1"]),
            TurnEvent::delta(" there"),
            TurnEvent::done(),
        ]);
        let relay = relay(agent, Arc::clone(&store), Duration::from_secs(5));

        let conversation_id = record.conversation.id;
        let turn = relay.stream_turn(record, "hello".to_string()).await.unwrap();
        let frames = drain(turn.frames).await;
        let outcome = turn.outcome.await.unwrap();

        assert_eq!(frames.len(), 4);
        assert!(frames
            .iter()
            .all(|f| matches!(f, RelayFrame::Upstream(_))));

        let (user_message, assistant_message) = match outcome {
            TurnOutcome::Completed {
                user_message,
                assistant_message,
            } => (user_message, assistant_message),
            other => panic!("expected completion, got {other:?}"),
        };
        assert_eq!(user_message.content, "hello");
        assert_eq!(assistant_message.content, "Hi there");
        assert_eq!(assistant_message.sources, vec!["src1"]);
        assert!(user_message.created_at < assistant_message.created_at);

        let record = store.get_conversation(conversation_id).await.unwrap();
        assert_eq!(record.messages.len(), 2);
        assert_eq!(record.messages[0].role, Role::User);
        assert_eq!(record.messages[1].role, Role::Assistant);
        assert_eq!(
            record.conversation.updated_at,
            record.messages[1].created_at
        );
    }

    #[tokio::test]
    async fn upstream_error_event_persists_nothing() {
        let (store, record) = setup().await;
        let agent = MockAgentClient::new().with_events(vec![
            TurnEvent::delta("partial"),
            TurnEvent::error("model overloaded"),
        ]);
        let relay = relay(agent, Arc::clone(&store), Duration::from_secs(5));

        let conversation_id = record.conversation.id;
        let turn = relay.stream_turn(record, "hello".to_string()).await.unwrap();
        let frames = drain(turn.frames).await;
        let outcome = turn.outcome.await.unwrap();

        // The upstream error frame is forwarded as-is; nothing extra is
        // synthesized.
        assert_eq!(frames.len(), 2);
        assert!(matches!(
            outcome,
            TurnOutcome::Failed(RelayError::UpstreamTerminal(_))
        ));
        let record = store.get_conversation(conversation_id).await.unwrap();
        assert!(record.messages.is_empty());
    }

    #[tokio::test]
    async fn abnormal_close_emits_one_terminal_frame_and_persists_nothing() {
        let (store, record) = setup().await;
        let agent = MockAgentClient::new().with_events(vec![TurnEvent::delta("partial")]);
        let relay = relay(agent, Arc::clone(&store), Duration::from_secs(5));

        let conversation_id = record.conversation.id;
        let turn = relay.stream_turn(record, "hello".to_string()).await.unwrap();
        let frames = drain(turn.frames).await;
        let outcome = turn.outcome.await.unwrap();

        assert_eq!(frames.len(), 2);
        match &frames[1] {
            RelayFrame::Terminal(failure) => {
                assert_eq!(failure.code, FailureCode::UpstreamClosed);
            }
            other => panic!("expected terminal frame, got {other:?}"),
        }
        assert!(matches!(
            outcome,
            TurnOutcome::Failed(RelayError::UpstreamTerminal(_))
        ));
        let record = store.get_conversation(conversation_id).await.unwrap();
        assert!(record.messages.is_empty());
    }

    #[tokio::test]
    async fn idle_timeout_is_a_terminal_error() {
        let (store, record) = setup().await;
        let agent = MockAgentClient::new().with_stalled_stream(vec![TurnEvent::delta("x")]);
        let relay = relay(agent, Arc::clone(&store), Duration::from_millis(50));

        let conversation_id = record.conversation.id;
        let turn = relay.stream_turn(record, "hello".to_string()).await.unwrap();
        let frames = drain(turn.frames).await;
        let outcome = turn.outcome.await.unwrap();

        match frames.last() {
            Some(RelayFrame::Terminal(failure)) => {
                assert_eq!(failure.code, FailureCode::Timeout);
            }
            other => panic!("expected timeout frame, got {other:?}"),
        }
        assert!(matches!(
            outcome,
            TurnOutcome::Failed(RelayError::IdleTimeout(_))
        ));
        let record = store.get_conversation(conversation_id).await.unwrap();
        assert!(record.messages.is_empty());
    }

    #[tokio::test]
    async fn downstream_disconnect_cancels_and_persists_nothing() {
        let (store, record) = setup().await;
        let agent = MockAgentClient::new().with_stalled_stream(vec![TurnEvent::delta("x")]);
        let relay = relay(agent, Arc::clone(&store), Duration::from_secs(30));

        let conversation_id = record.conversation.id;
        let mut turn = relay.stream_turn(record, "hello".to_string()).await.unwrap();
        let first = turn.frames.recv().await;
        assert!(first.is_some());
        drop(turn.frames);

        let outcome = turn.outcome.await.unwrap();
        assert!(matches!(outcome, TurnOutcome::Cancelled));
        let record = store.get_conversation(conversation_id).await.unwrap();
        assert!(record.messages.is_empty());
    }

    #[tokio::test]
    async fn unreachable_agent_fails_fast_with_no_events() {
        let (store, record) = setup().await;
        let agent = MockAgentClient::new().with_unreachable("connection refused");
        let relay = relay(agent, Arc::clone(&store), Duration::from_secs(5));

        let result = relay.stream_turn(record, "hello".to_string()).await;
        assert!(matches!(
            result,
            Err(RelayError::UpstreamUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn retried_turn_persists_each_message_at_most_once() {
        let (store, record) = setup().await;
        let script = vec![TurnEvent::delta("Hi there"), TurnEvent::done()];
        let agent = MockAgentClient::new()
            .with_events(script.clone())
            .with_events(script);
        let relay = relay(agent, Arc::clone(&store), Duration::from_secs(5));

        let conversation_id = record.conversation.id;
        // A client retry replays the same turn: same conversation snapshot,
        // same content, therefore the same turn key.
        for _ in 0..2 {
            let turn = relay
                .stream_turn(record.clone(), "hello".to_string())
                .await
                .unwrap();
            drain(turn.frames).await;
            turn.outcome.await.unwrap();
        }

        let stored = store.get_conversation(conversation_id).await.unwrap();
        assert_eq!(stored.messages.len(), 2);
    }

    #[tokio::test]
    async fn assistant_save_failure_is_reported_as_recoverable_inconsistency() {
        let (store, record) = setup().await;
        store.fail_after_appends(1);
        let agent =
            MockAgentClient::new().with_events(vec![TurnEvent::delta("Hi"), TurnEvent::done()]);
        let relay = relay(agent, Arc::clone(&store), Duration::from_secs(5));

        let conversation_id = record.conversation.id;
        let turn = relay.stream_turn(record, "hello".to_string()).await.unwrap();
        let frames = drain(turn.frames).await;
        let outcome = turn.outcome.await.unwrap();

        match frames.last() {
            Some(RelayFrame::Terminal(failure)) => {
                assert_eq!(failure.code, FailureCode::SaveFailed);
                assert!(failure.user_recorded);
            }
            other => panic!("expected save_failed frame, got {other:?}"),
        }
        assert!(matches!(
            outcome,
            TurnOutcome::Failed(RelayError::Persistence {
                user_recorded: true,
                ..
            })
        ));

        store.clear_failures();
        let stored = store.get_conversation(conversation_id).await.unwrap();
        assert_eq!(stored.messages.len(), 1);
        assert_eq!(stored.messages[0].role, Role::User);
    }
}
