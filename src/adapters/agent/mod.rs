//! Agent adapters: the HTTP client for the real agent service, the SSE
//! event codec it shares with the downstream relay, and a scriptable mock
//! for tests.

mod http_client;
mod mock_client;
pub mod sse;

pub use http_client::HttpAgentClient;
pub use mock_client::MockAgentClient;
