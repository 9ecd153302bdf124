//! Reconciler configuration.
//!
//! Retry budgets, drain limits and the generated-name prefix. Loaded from
//! environment variables via [`ReconcilerConfig::from_env`], or built
//! explicitly with [`ReconcilerConfig::builder`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::retry::RetryPolicy;

/// Reconciler configuration.
///
/// # Examples
///
/// ```
/// use bucketctl_engine::ReconcilerConfig;
///
/// let config = ReconcilerConfig::default();
/// assert_eq!(config.retry_max_attempts, 5);
/// assert_eq!(config.name_prefix, "terraform-");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilerConfig {
    /// Attempts per remote call on transient errors.
    #[builder(default = 5)]
    pub retry_max_attempts: u32,

    /// Backoff before the first retry, in milliseconds.
    #[builder(default = 200)]
    pub retry_initial_backoff_ms: u64,

    /// Upper bound on any single backoff, in milliseconds.
    #[builder(default = 5_000)]
    pub retry_max_backoff_ms: u64,

    /// Existence checks after create before giving up.
    #[builder(default = 20)]
    pub existence_max_attempts: u32,

    /// Deadline for draining a bucket before forced deletion, in seconds.
    #[builder(default = 600)]
    pub drain_timeout_secs: u64,

    /// Objects removed per drain batch.
    #[builder(default = 1_000)]
    pub drain_batch_size: usize,

    /// Prefix for generated bucket names.
    #[builder(default = String::from("terraform-"))]
    pub name_prefix: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: 5,
            retry_initial_backoff_ms: 200,
            retry_max_backoff_ms: 5_000,
            existence_max_attempts: 20,
            drain_timeout_secs: 600,
            drain_batch_size: 1_000,
            name_prefix: String::from("terraform-"),
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `BUCKETCTL_RETRY_MAX_ATTEMPTS` | `5` |
    /// | `BUCKETCTL_RETRY_INITIAL_BACKOFF_MS` | `200` |
    /// | `BUCKETCTL_RETRY_MAX_BACKOFF_MS` | `5000` |
    /// | `BUCKETCTL_EXISTENCE_MAX_ATTEMPTS` | `20` |
    /// | `BUCKETCTL_DRAIN_TIMEOUT_SECS` | `600` |
    /// | `BUCKETCTL_DRAIN_BATCH_SIZE` | `1000` |
    /// | `BUCKETCTL_NAME_PREFIX` | `terraform-` |
    ///
    /// Unparseable numbers keep their default.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(n) = parse_env("BUCKETCTL_RETRY_MAX_ATTEMPTS") {
            config.retry_max_attempts = n;
        }
        if let Some(n) = parse_env("BUCKETCTL_RETRY_INITIAL_BACKOFF_MS") {
            config.retry_initial_backoff_ms = n;
        }
        if let Some(n) = parse_env("BUCKETCTL_RETRY_MAX_BACKOFF_MS") {
            config.retry_max_backoff_ms = n;
        }
        if let Some(n) = parse_env("BUCKETCTL_EXISTENCE_MAX_ATTEMPTS") {
            config.existence_max_attempts = n;
        }
        if let Some(n) = parse_env("BUCKETCTL_DRAIN_TIMEOUT_SECS") {
            config.drain_timeout_secs = n;
        }
        if let Some(n) = parse_env("BUCKETCTL_DRAIN_BATCH_SIZE") {
            config.drain_batch_size = n;
        }
        if let Ok(v) = std::env::var("BUCKETCTL_NAME_PREFIX") {
            config.name_prefix = v;
        }

        config
    }

    /// Retry policy for ordinary remote calls.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_max_attempts,
            Duration::from_millis(self.retry_initial_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
    }

    /// Retry policy for existence polling after create.
    #[must_use]
    pub fn existence_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.existence_max_attempts,
            Duration::from_millis(self.retry_initial_backoff_ms),
            Duration::from_millis(self.retry_max_backoff_ms),
        )
    }

    /// Drain deadline.
    #[must_use]
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
