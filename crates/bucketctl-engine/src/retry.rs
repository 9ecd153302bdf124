//! Bounded retries with exponential backoff.
//!
//! By default only [`ApiError::is_retryable`] failures are retried and
//! everything else, including not-found, is returned on the first attempt.
//! [`RetryPolicy::run_when`] takes the transient predicate explicitly, which
//! lets calls against a freshly created bucket also ride out `NoSuchBucket`.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{ApiError, ReconcileError};

/// Attempt ceiling and backoff curve for one class of remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Create a policy. At least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff,
        }
    }

    /// Total attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff after the given (1-based) failed attempt: doubles each time,
    /// capped at the maximum.
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff)
    }

    /// Run `call` until it succeeds, fails permanently, or the attempt
    /// ceiling is reached. The last error is returned on exhaustion.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        bucket: &str,
        call: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.run_when(operation, bucket, ApiError::is_retryable, call)
            .await
    }

    /// Like [`RetryPolicy::run`], with `transient` deciding which errors are
    /// worth another attempt.
    pub async fn run_when<T, F, Fut, P>(
        &self,
        operation: &'static str,
        bucket: &str,
        transient: P,
        mut call: F,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        P: Fn(&ApiError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(bucket, operation, attempt, "remote call succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if transient(&err) && attempt < self.max_attempts => {
                    let backoff = self.backoff_for(attempt);
                    warn!(
                        bucket,
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "transient remote failure, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    if transient(&err) {
                        warn!(bucket, operation, attempt, error = %err, "retry budget exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Poll `check` until it reports `true`.
    ///
    /// A `false` result or a transient error counts as one attempt; a
    /// permanent error aborts immediately. Exhaustion yields
    /// [`ReconcileError::EventualConsistencyTimeout`].
    pub async fn wait_until<F, Fut>(
        &self,
        operation: &'static str,
        bucket: &str,
        expectation: &str,
        mut check: F,
    ) -> Result<(), ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, ApiError>>,
    {
        for attempt in 1..=self.max_attempts {
            match check().await {
                Ok(true) => {
                    debug!(bucket, expectation, attempt, "condition reached");
                    return Ok(());
                }
                Ok(false) => {
                    debug!(bucket, expectation, attempt, "condition not reached yet");
                }
                Err(err) if err.is_retryable() => {
                    warn!(
                        bucket,
                        expectation,
                        attempt,
                        error = %err,
                        "transient failure while polling"
                    );
                }
                Err(source) => {
                    return Err(ReconcileError::Remote {
                        bucket: bucket.to_owned(),
                        operation,
                        source,
                    });
                }
            }
            if attempt < self.max_attempts {
                sleep(self.backoff_for(attempt)).await;
            }
        }

        warn!(bucket, expectation, attempts = self.max_attempts, "gave up waiting");
        Err(ReconcileError::EventualConsistencyTimeout {
            bucket: bucket.to_owned(),
            expectation: expectation.to_owned(),
            attempts: self.max_attempts,
        })
    }
}
