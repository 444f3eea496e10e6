//! Error taxonomy for the ingestion pipeline.

use thiserror::Error;

/// Errors surfaced by pipeline components.
///
/// The variants map onto distinct handling policies: configuration errors
/// fail fast, validation errors skip the offending document or chunk,
/// provider errors are transient and may be retried, and storage errors
/// leave the previously persisted index intact thanks to transactional
/// writes.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required credential or setting is missing. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A document or chunk failed a structural precondition.
    #[error("validation error for {source_id}: {reason}")]
    Validation { source_id: String, reason: String },

    /// A model provider call failed (network, non-2xx, timeout).
    #[error("{provider} request failed: {detail}")]
    Provider { provider: &'static str, detail: String },

    /// An LLM response could not be parsed by either parser stage.
    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    /// A sqlite operation failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    /// Shorthand for a provider failure.
    pub fn provider(provider: &'static str, detail: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            detail: detail.into(),
        }
    }

    /// True when the error is worth retrying.
    ///
    /// Only provider failures are transient; everything else is
    /// deterministic and retrying would just repeat the failure.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Provider { .. })
    }
}

impl From<tokio_rusqlite::Error> for PipelineError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
