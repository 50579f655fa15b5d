//! Application handlers.

mod relay_turn;

pub use relay_turn::{
    ChatTurn, FailureCode, RelayConfig, RelayError, RelayFailure, RelayFrame, StreamRelay,
    TurnOutcome,
};
