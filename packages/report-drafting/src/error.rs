//! Typed errors for the drafting library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can match
//! on the failure class and decide whether to retry.

use thiserror::Error;

/// Errors that can occur while collecting evidence, retrieving exemplars,
/// assembling a request or synthesizing a draft.
#[derive(Debug, Error)]
pub enum DraftingError {
    /// Bad input shape or unknown enum value (caller bug, never retried)
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// A mandatory evidence item could not be collected
    #[error("evidence collection failed for {source_id}: {reason}")]
    Collection { source_id: String, reason: String },

    /// Document parser collaborator failed
    #[error("document parse error: {0}")]
    Parse(String),

    /// Vision collaborator failed
    #[error("vision service error: {0}")]
    VisionService(String),

    /// Embedding collaborator failed
    #[error("embedding service error: {0}")]
    EmbeddingService(String),

    /// Generation (LLM) collaborator failed
    #[error("generation service error: {reason}")]
    GenerationService { reason: String, retryable: bool },

    /// A collaborator call exceeded its deadline
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// The model returned something a draft cannot be built from
    #[error("synthesis failed: {reason}")]
    Synthesis { reason: String },

    /// No candidates for the requested section type.
    ///
    /// Only the raw index surfaces this; retrieval turns it into an empty
    /// result set.
    #[error("no indexed records for section type: {section_type}")]
    EmptyIndex { section_type: String },

    /// Image or document id unknown to the asset source
    #[error("asset not found: {id}")]
    AssetNotFound { id: String },

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// JSON parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl DraftingError {
    /// Shorthand for a validation failure.
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Whether a caller may retry the failed operation unchanged.
    ///
    /// Collaborator-boundary failures are retryable; caller bugs and
    /// cancellations are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Collection { .. }
            | Self::Parse(_)
            | Self::VisionService(_)
            | Self::EmbeddingService(_)
            | Self::Timeout { .. }
            | Self::Synthesis { .. }
            | Self::JsonParse(_) => true,
            Self::GenerationService { retryable, .. } => *retryable,
            Self::Validation { .. }
            | Self::EmptyIndex { .. }
            | Self::AssetNotFound { .. }
            | Self::Cancelled
            | Self::Config(_) => false,
        }
    }
}

/// Result type alias for drafting operations.
pub type Result<T> = std::result::Result<T, DraftingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_is_not_retryable() {
        assert!(!DraftingError::validation("bad section").is_retryable());
        assert!(!DraftingError::Cancelled.is_retryable());
    }

    #[test]
    fn test_collaborator_failures_are_retryable() {
        let timeout = DraftingError::Timeout {
            operation: "generate".into(),
            after_ms: 1000,
        };
        assert!(timeout.is_retryable());
        assert!(DraftingError::VisionService("503".into()).is_retryable());

        let rejected = DraftingError::GenerationService {
            reason: "400 bad request".into(),
            retryable: false,
        };
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn test_timeout_message() {
        let err = DraftingError::Timeout {
            operation: "vision analyze".into(),
            after_ms: 250,
        };
        assert_eq!(err.to_string(), "vision analyze timed out after 250ms");
    }
}
