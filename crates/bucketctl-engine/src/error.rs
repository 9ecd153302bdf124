//! Error types for the reconciliation engine.
//!
//! Three layers:
//!
//! - [`ApiError`]: what the remote collaborator reports. Each variant knows
//!   whether it is worth retrying.
//! - [`ValidationError`]: a rejected name or configuration shape, with every
//!   violated rule listed.
//! - [`ReconcileError`]: what an engine operation surfaces to its caller.

use std::fmt;
use std::time::Duration;

use crate::plan::SubResource;
use crate::reconciler::ReconcileState;

// ---------------------------------------------------------------------------
// ApiError
// ---------------------------------------------------------------------------

/// Error reported by the remote bucket API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// The bucket name is owned by another account.
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The contested bucket name.
        bucket: String,
    },

    /// The bucket already exists and is owned by the caller.
    #[error("Your previous request to create the named bucket succeeded and you already own it: {bucket}")]
    BucketAlreadyOwnedByYou {
        /// The bucket name.
        bucket: String,
    },

    /// The bucket still holds objects or versions.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name.
        bucket: String,
    },

    /// The caller is being throttled.
    #[error("Please reduce your request rate")]
    SlowDown,

    /// The service is temporarily unavailable.
    #[error("Service unavailable: {message}")]
    ServiceUnavailable {
        /// Detail from the remote.
        message: String,
    },

    /// The request was rejected as invalid.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Detail from the remote.
        message: String,
    },

    /// The policy document was rejected.
    #[error("Malformed policy: {message}")]
    MalformedPolicy {
        /// Detail from the remote.
        message: String,
    },

    /// The caller lacks permission.
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Detail from the remote.
        message: String,
    },

    /// An unexpected server-side failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Detail from the remote.
        message: String,
    },
}

impl ApiError {
    /// Whether the failure is transient and the call may be retried.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::SlowDown | Self::ServiceUnavailable { .. } | Self::Internal { .. }
        )
    }

    /// Whether the failure may clear on its own for a bucket created moments
    /// ago: any retryable failure, plus `NoSuchBucket` while the new bucket
    /// propagates.
    #[must_use]
    pub fn is_transient_after_create(&self) -> bool {
        self.is_retryable() || self.is_not_found()
    }

    /// Whether the failure means the bucket is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NoSuchBucket { .. })
    }

    /// The wire error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoSuchBucket { .. } => "NoSuchBucket",
            Self::BucketAlreadyExists { .. } => "BucketAlreadyExists",
            Self::BucketAlreadyOwnedByYou { .. } => "BucketAlreadyOwnedByYou",
            Self::BucketNotEmpty { .. } => "BucketNotEmpty",
            Self::SlowDown => "SlowDown",
            Self::ServiceUnavailable { .. } => "ServiceUnavailable",
            Self::InvalidArgument { .. } => "InvalidArgument",
            Self::MalformedPolicy { .. } => "MalformedPolicy",
            Self::AccessDenied { .. } => "AccessDenied",
            Self::Internal { .. } => "InternalError",
        }
    }

    /// Shorthand for [`ApiError::NoSuchBucket`].
    #[must_use]
    pub fn no_such_bucket(bucket: impl Into<String>) -> Self {
        Self::NoSuchBucket {
            bucket: bucket.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// A rejected input, listing every rule it violates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {subject}: {}", .reasons.join("; "))]
pub struct ValidationError {
    /// What was validated, e.g. `bucket name "Foo.Bar"`.
    pub subject: String,
    /// Every violated rule.
    pub reasons: Vec<String>,
}

impl ValidationError {
    /// A validation error with a single reason.
    #[must_use]
    pub fn single(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            reasons: vec![reason.into()],
        }
    }

    /// Turn collected reasons into a result.
    pub fn check(subject: impl Into<String>, reasons: Vec<String>) -> Result<(), Self> {
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(Self {
                subject: subject.into(),
                reasons,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// SubResourceFailure
// ---------------------------------------------------------------------------

/// Why a sub-resource did not converge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The remote rejected the change after local retries.
    Remote(ApiError),
    /// The change was not attempted because a prerequisite failed.
    Skipped(String),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(err) => write!(f, "{err}"),
            Self::Skipped(reason) => write!(f, "skipped: {reason}"),
        }
    }
}

/// One sub-resource that failed during convergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubResourceFailure {
    /// The sub-resource.
    pub sub_resource: SubResource,
    /// Why it failed.
    pub cause: FailureCause,
}

impl fmt::Display for SubResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.sub_resource, self.cause)
    }
}

fn list_failures(failures: &[SubResourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ---------------------------------------------------------------------------
// ReconcileError
// ---------------------------------------------------------------------------

/// Error surfaced by a reconciler operation.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Bad name or configuration shape. Raised before any remote call.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A cross-field requirement does not hold. Raised before any remote call.
    #[error("precondition failed for bucket {bucket}: {message}")]
    Precondition {
        /// The bucket.
        bucket: String,
        /// The unmet requirement.
        message: String,
    },

    /// The bucket does not exist.
    #[error("bucket not found: {bucket}")]
    NotFound {
        /// The bucket.
        bucket: String,
    },

    /// The name is taken, or the bucket is not empty on delete.
    #[error("conflict on bucket {bucket}: {reason}")]
    Conflict {
        /// The bucket.
        bucket: String,
        /// What conflicted.
        reason: String,
    },

    /// The remote did not reach the expected state within the retry budget.
    #[error("bucket {bucket} did not become {expectation} after {attempts} attempts")]
    EventualConsistencyTimeout {
        /// The bucket.
        bucket: String,
        /// The awaited condition, e.g. `visible`.
        expectation: String,
        /// Attempts made.
        attempts: u32,
    },

    /// One or more sub-resources failed to converge.
    #[error(
        "{} sub-resource(s) failed to converge on bucket {bucket}: {}",
        .failures.len(),
        list_failures(.failures)
    )]
    PartialConfigurationFailure {
        /// The bucket.
        bucket: String,
        /// Every failure, in application order.
        failures: Vec<SubResourceFailure>,
    },

    /// The remote holds a sub-resource configuration that cannot be
    /// interpreted, so it cannot be compared against the desired one.
    #[error("observed {sub_resource} on bucket {bucket} is malformed: {source}")]
    MalformedObserved {
        /// The bucket.
        bucket: String,
        /// The sub-resource.
        sub_resource: SubResource,
        /// What is wrong with it.
        #[source]
        source: ValidationError,
    },

    /// Draining the bucket did not finish before the deadline.
    #[error("draining bucket {bucket} did not finish within {deadline:?}")]
    Timeout {
        /// The bucket.
        bucket: String,
        /// The deadline that expired.
        deadline: Duration,
    },

    /// A remote call failed outside sub-resource convergence.
    #[error("{operation} failed for bucket {bucket}: {source}")]
    Remote {
        /// The bucket.
        bucket: String,
        /// The remote operation.
        operation: &'static str,
        /// The remote error.
        #[source]
        source: ApiError,
    },

    /// The state machine was asked to make an illegal move.
    #[error("invalid state transition for bucket {bucket}: {from} -> {to}")]
    InvalidTransition {
        /// The bucket.
        bucket: String,
        /// Current state.
        from: ReconcileState,
        /// Requested state.
        to: ReconcileState,
    },
}

impl ReconcileError {
    /// Whether the error was raised before any remote mutation.
    #[must_use]
    pub fn is_preflight(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Precondition { .. })
    }
}
