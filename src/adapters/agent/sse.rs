//! SSE codec for the agent event protocol.
//!
//! Frames are `event: <type>` / `data: <json>` pairs terminated by a blank
//! line. The decoder reassembles frames from arbitrary transport chunk
//! boundaries; the parser maps frames onto [`TurnEvent`]; the encoders are
//! used by the mock agent and for relay-synthesized terminal failures.
//! Decoded frames keep their raw text so the relay can forward them
//! downstream byte-for-byte.

use serde::Deserialize;
use serde_json::json;

use crate::application::handlers::{FailureCode, RelayFailure};
use crate::domain::conversation::TurnEvent;
use crate::ports::AgentError;

/// Incremental SSE frame decoder.
///
/// Buffers partial input across chunks and yields complete frames
/// (without their blank-line terminators) as they arrive.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: String,
}

impl SseFrameDecoder {
    /// Creates an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one transport chunk; returns the frames it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut frames = Vec::new();
        while let Some(boundary) = self.buffer.find("\n\n") {
            let frame = self.buffer[..boundary].to_string();
            self.buffer.drain(..boundary + 2);
            if !frame.is_empty() {
                frames.push(frame);
            }
        }
        frames
    }
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    #[serde(default)]
    note: String,
}

#[derive(Debug, Deserialize)]
struct DeltaPayload {
    text: String,
    #[serde(default)]
    sources: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct DonePayload {
    #[serde(default)]
    sources: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Parses one complete frame.
///
/// Frames without both an `event:` and a `data:` line (comments,
/// keepalives) yield `Ok(None)`; unknown event types and malformed
/// payloads are protocol errors.
pub fn parse_frame(raw: &str) -> Result<Option<TurnEvent>, AgentError> {
    let mut event_type = None;
    let mut data = None;
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("event: ") {
            event_type = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("data: ") {
            data = Some(rest);
        }
    }

    let (event_type, data) = match (event_type, data) {
        (Some(event_type), Some(data)) => (event_type, data),
        _ => return Ok(None),
    };

    let malformed =
        |e: serde_json::Error| AgentError::Protocol(format!("malformed {event_type} payload: {e}"));

    match event_type {
        "status" => {
            let payload: StatusPayload = serde_json::from_str(data).map_err(malformed)?;
            Ok(Some(TurnEvent::Status { note: payload.note }))
        }
        "delta" => {
            let payload: DeltaPayload = serde_json::from_str(data).map_err(malformed)?;
            Ok(Some(TurnEvent::Delta {
                text: payload.text,
                sources: payload.sources,
            }))
        }
        "done" => {
            let payload: DonePayload = serde_json::from_str(data).map_err(malformed)?;
            Ok(Some(TurnEvent::Done {
                sources: payload.sources,
            }))
        }
        "error" => {
            let payload: ErrorPayload = serde_json::from_str(data).map_err(malformed)?;
            Ok(Some(TurnEvent::Error {
                message: payload.message,
            }))
        }
        other => Err(AgentError::Protocol(format!("unknown event type: {other}"))),
    }
}

/// Encodes an event as a frame (without the blank-line terminator).
pub fn encode_event(event: &TurnEvent) -> String {
    let (name, data) = match event {
        TurnEvent::Status { note } => ("status", json!({ "note": note })),
        TurnEvent::Delta { text, sources } => {
            if sources.is_empty() {
                ("delta", json!({ "text": text }))
            } else {
                ("delta", json!({ "text": text, "sources": sources }))
            }
        }
        TurnEvent::Done { sources } => match sources {
            Some(sources) => ("done", json!({ "sources": sources })),
            None => ("done", json!({})),
        },
        TurnEvent::Error { message } => ("error", json!({ "message": message })),
    };
    format!("event: {name}\ndata: {data}")
}

/// Encodes a relay-synthesized terminal failure as an `error` frame.
pub fn encode_failure(failure: &RelayFailure) -> String {
    let data = if failure.code == FailureCode::SaveFailed {
        json!({
            "message": failure.message,
            "code": failure.code.as_str(),
            "recoverable": failure.code.is_recoverable(),
            "userRecorded": failure.user_recorded,
        })
    } else {
        json!({
            "message": failure.message,
            "code": failure.code.as_str(),
            "recoverable": failure.code.is_recoverable(),
        })
    };
    format!("event: error\ndata: {data}")
}
