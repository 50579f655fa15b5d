//! Streaming-turn events and their reduction into one final message.
//!
//! The agent answers a chat turn as an ordered stream of events. The
//! [`StreamingTurn`] accumulator folds that stream into a single
//! `{content, sources}` pair ready for persistence. The fold is pure:
//! no I/O, deterministic over a fixed event sequence, and owned by
//! exactly one in-flight task.

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::conversation::ConversationId;

/// One event in an agent's answer stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEvent {
    /// Informational progress note; not part of the final message.
    Status {
        /// Human-readable note (e.g. "thinking").
        note: String,
    },
    /// An incremental fragment of the assistant's response.
    Delta {
        /// Text to append to the content buffer.
        text: String,
        /// Source citations introduced by this fragment.
        sources: Vec<String>,
    },
    /// Clean end of the stream.
    Done {
        /// If present, the authoritative source list for the whole turn,
        /// overriding anything accumulated from deltas.
        sources: Option<Vec<String>>,
    },
    /// The agent failed mid-stream; no message is produced.
    Error {
        /// Failure description reported by the agent.
        message: String,
    },
}

impl TurnEvent {
    /// Creates a status event.
    pub fn status(note: impl Into<String>) -> Self {
        Self::Status { note: note.into() }
    }

    /// Creates a delta event without sources.
    pub fn delta(text: impl Into<String>) -> Self {
        Self::Delta {
            text: text.into(),
            sources: Vec::new(),
        }
    }

    /// Creates a delta event with sources.
    pub fn delta_with_sources(
        text: impl Into<String>,
        sources: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::Delta {
            text: text.into(),
            sources: sources.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a done event without a final source list.
    pub fn done() -> Self {
        Self::Done { sources: None }
    }

    /// Creates a done event carrying the authoritative source list.
    pub fn done_with_sources(sources: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self::Done {
            sources: Some(sources.into_iter().map(Into::into).collect()),
        }
    }

    /// Creates an error event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Returns true for `done` and `error`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// How a turn's stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Terminal {
    Done { final_sources: Option<Vec<String>> },
    Failed { message: String },
}

/// The reduced result of a successful turn, ready for persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducedMessage {
    /// Concatenation of all delta fragments in arrival order.
    pub content: String,
    /// Final source list (`done` override, else accumulated deltas).
    pub sources: Vec<String>,
}

/// Why a turn produced no message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    /// The agent reported failure via an `error` event.
    #[error("agent stream failed: {0}")]
    Upstream(String),

    /// The stream ended without a terminal event.
    #[error("agent stream ended before a terminal event")]
    Incomplete,
}

/// In-flight reduction state for one chat exchange.
///
/// Fed every upstream event via [`apply`](Self::apply) and consumed
/// exactly once via [`finish`](Self::finish). Events arriving after a
/// terminal event are ignored.
#[derive(Debug, Default)]
pub struct StreamingTurn {
    content: String,
    sources: Vec<String>,
    terminal: Option<Terminal>,
}

impl StreamingTurn {
    /// Creates an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the accumulator.
    pub fn apply(&mut self, event: &TurnEvent) {
        if self.terminal.is_some() {
            return;
        }
        match event {
            TurnEvent::Status { .. } => {}
            TurnEvent::Delta { text, sources } => {
                self.content.push_str(text);
                for source in sources {
                    if !self.sources.contains(source) {
                        self.sources.push(source.clone());
                    }
                }
            }
            TurnEvent::Done { sources } => {
                self.terminal = Some(Terminal::Done {
                    final_sources: sources.clone(),
                });
            }
            TurnEvent::Error { message } => {
                self.terminal = Some(Terminal::Failed {
                    message: message.clone(),
                });
            }
        }
    }

    /// Returns true once a terminal event has been applied.
    pub fn is_terminal(&self) -> bool {
        self.terminal.is_some()
    }

    /// Consumes the accumulator, yielding the final message.
    ///
    /// # Errors
    ///
    /// - [`TurnError::Upstream`] if the stream ended with an `error` event.
    /// - [`TurnError::Incomplete`] if no terminal event was applied
    ///   (abnormal close).
    pub fn finish(self) -> Result<ReducedMessage, TurnError> {
        match self.terminal {
            Some(Terminal::Done { final_sources }) => Ok(ReducedMessage {
                content: self.content,
                sources: final_sources.unwrap_or(self.sources),
            }),
            Some(Terminal::Failed { message }) => Err(TurnError::Upstream(message)),
            None => Err(TurnError::Incomplete),
        }
    }
}

/// Idempotence key identifying one logical turn.
///
/// Derived from the target conversation, the submitted user content, and
/// the conversation's message count when the turn began, so a client
/// retry of the same turn maps to the same key while the next genuine
/// turn (after the history grew) maps to a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TurnKey(String);

impl TurnKey {
    /// Derives the key for a turn.
    pub fn derive(conversation_id: ConversationId, content: &str, turn_counter: usize) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(conversation_id.as_uuid().as_bytes());
        hasher.update(b"\n");
        hasher.update(content.as_bytes());
        hasher.update(b"\n");
        hasher.update(turn_counter.to_be_bytes());
        let digest = hasher.finalize();
        Self(format!("{digest:x}"))
    }

    /// Returns the key as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TurnKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
