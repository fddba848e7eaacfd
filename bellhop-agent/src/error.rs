//! Agent error types.

use thiserror::Error;

/// Agent-side error type.
///
/// None of these are fatal to the foreground pipeline: the session must
/// keep alerting on its own when the agent is unavailable.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Platform alert rendering failed.
    #[error("alert rendering failed: {0}")]
    Alert(String),

    /// Shell asset fetch/cache failure.
    #[error("cache error: {0}")]
    Cache(String),

    /// The message bridge has no live peer.
    #[error("agent bridge closed")]
    BridgeClosed,
}

/// Result type for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;
