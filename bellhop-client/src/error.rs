//! Pipeline error types.
//!
//! Every failure is represented as a structured kind so the UI layer
//! can react per-kind (degrade, warn, badge) instead of matching on raw
//! transport errors.

use thiserror::Error;

/// Pipeline error type.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Subscription drop, timeout, transport failure. Recovered locally
    /// by degrading to polling and retrying on a timer.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Backend rejected a read or write due to access rules. This is a
    /// configuration problem, not transient network loss: it is
    /// reported distinctly and never conflated with connectivity.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Audio playback or synthesis failure. Absorbed by the chime
    /// fallback chain; only total failure surfaces, as a badge.
    #[error("audio error: {0}")]
    Audio(String),

    /// Background agent registration/bridge failure. The foreground
    /// pipeline keeps working without the agent.
    #[error("worker error: {0}")]
    Worker(String),

    /// Local durable storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Malformed payload rejected at a boundary.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }

    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_))
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
