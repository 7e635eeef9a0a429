/// Error Module
///
/// Failure kinds raised at the pipeline boundaries.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// Network or API failure while listing posts or comments
    #[error("source unavailable while {operation}: {cause:#}")]
    SourceUnavailable { operation: String, cause: anyhow::Error },

    /// A raw record had a shape the transformer cannot work with
    #[error("transform failed for post '{post_id}': {reason}")]
    TransformFailure { post_id: String, reason: String },

    /// Constraint violation or connectivity failure on the store
    #[error("store write failed: {0}")]
    StoreWriteFailure(#[from] sqlx::Error),
}

impl EtlError {
    pub fn source_unavailable(operation: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::SourceUnavailable { operation: operation.into(), cause }
    }

    pub fn transform(post_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransformFailure { post_id: post_id.into(), reason: reason.into() }
    }
}

pub type EtlResult<T> = Result<T, EtlError>;
