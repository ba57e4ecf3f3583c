// Error kinds surfaced by the detection core

use thiserror::Error;

/// Typed failures of the detection pipeline.
///
/// Only `LlmUnavailable` is recovered internally (the engine demotes the
/// call to heuristic mode); every other kind bubbles out to the caller.
#[derive(Debug, Error)]
pub enum DetectError {
    /// Empty text, text over the configured maximum, or an unsupported option.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The vector index or verse store could not serve the request. Retryable.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The LLM verifier failed (transport, auth, timeout, or unparseable body).
    /// Never surfaced to callers; triggers the heuristic fallback.
    #[error("llm unavailable: {0}")]
    LlmUnavailable(String),

    /// Invariant violation. Should never occur in a correct deployment.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for DetectError {
    fn from(e: rusqlite::Error) -> Self {
        DetectError::ServiceUnavailable(format!("verse store error: {}", e))
    }
}
