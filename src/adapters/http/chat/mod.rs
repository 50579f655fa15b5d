//! Chat gateway: the request boundary for streaming chat turns.

mod dto;
mod handlers;
mod routes;

pub use dto::{ChatStreamRequest, MAX_MESSAGE_LENGTH};
pub use routes::routes;
