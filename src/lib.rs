//! Atelier - personal site backend with an embedded conversational
//! assistant.
//!
//! Visitors chat with an upstream reasoning agent; the agent's streamed
//! answer is relayed to the caller live, reduced into one final message,
//! and appended to the conversation's history with ordering and
//! idempotence guarantees.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
