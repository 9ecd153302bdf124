//! End-to-end reconciliation tests for bucketctl.
//!
//! Every test drives a [`BucketReconciler`] against a fresh
//! [`MemoryBucketApi`], so no network or credentials are needed:
//!
//! ```text
//! cargo test -p bucketctl-integration
//! ```

use std::sync::{Arc, Once};

use anyhow::Context;
use bucketctl_core::AwsRegion;
use bucketctl_engine::{BucketApi, BucketReconciler, MemoryBucketApi, ReconcilerConfig};
use bucketctl_model::{
    CorsRule, DesiredConfiguration, DestinationSpec, ReplicationConfigurationSpec,
    ReplicationRuleSpec, RuleStatus,
};

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Region used by every test unless it says otherwise.
pub const TEST_REGION: &str = "us-west-2";

/// Retry settings small enough to keep tests fast.
#[must_use]
pub fn fast_config() -> ReconcilerConfig {
    ReconcilerConfig::builder()
        .retry_max_attempts(3)
        .retry_initial_backoff_ms(1)
        .retry_max_backoff_ms(2)
        .existence_max_attempts(6)
        .drain_batch_size(10)
        .build()
}

/// A reconciler over `api`.
#[must_use]
pub fn reconciler_for(api: &Arc<MemoryBucketApi>) -> BucketReconciler {
    init_tracing();
    BucketReconciler::new(Arc::clone(api) as Arc<dyn BucketApi>, fast_config())
        .with_default_region(AwsRegion::new(TEST_REGION))
}

/// A fresh in-memory remote and a reconciler over it.
#[must_use]
pub fn harness() -> (Arc<MemoryBucketApi>, BucketReconciler) {
    let api = Arc::new(MemoryBucketApi::new());
    let reconciler = reconciler_for(&api);
    tracing::debug!("test harness ready");
    (api, reconciler)
}

/// Generate a unique, DNS-safe bucket name for testing.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("bucketctl-{prefix}-{}", &id[..8])
}

/// Parse a desired configuration from JSON.
///
/// # Errors
///
/// Returns an error if the document does not parse.
pub fn desired_from_json(json: &str) -> anyhow::Result<DesiredConfiguration> {
    serde_json::from_str(json).context("failed to parse desired configuration")
}

/// A CORS rule.
#[must_use]
pub fn cors_rule(methods: &[&str], origins: &[&str]) -> CorsRule {
    CorsRule {
        allowed_methods: methods.iter().map(|m| (*m).to_owned()).collect(),
        allowed_origins: origins.iter().map(|o| (*o).to_owned()).collect(),
        ..CorsRule::default()
    }
}

/// A legacy-schema replication rule.
#[must_use]
pub fn legacy_rule(id: &str, prefix: &str) -> ReplicationRuleSpec {
    ReplicationRuleSpec {
        id: Some(id.to_owned()),
        prefix: Some(prefix.to_owned()),
        status: RuleStatus::Enabled,
        destination: DestinationSpec::bucket("arn:aws:s3:::destination"),
        ..ReplicationRuleSpec::default()
    }
}

/// A replication configuration with the standard test role.
#[must_use]
pub fn replication(rules: Vec<ReplicationRuleSpec>) -> ReplicationConfigurationSpec {
    ReplicationConfigurationSpec {
        role: "arn:aws:iam::123456789012:role/tf-iam-role-replication".into(),
        rules,
    }
}

mod test_convergence;
mod test_destroy;
mod test_faults;
mod test_parallel;
mod test_replication;
