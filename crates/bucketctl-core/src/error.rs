//! Error types for the bucketctl core.

/// Core error type for bucketctl infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum BucketctlError {
    /// Invalid AWS account ID format.
    #[error("invalid AWS account ID: {0} (must be 12-digit numeric string)")]
    InvalidAccountId(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience result type for bucketctl core operations.
pub type BucketctlResult<T> = Result<T, BucketctlError>;
