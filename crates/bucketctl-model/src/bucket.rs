//! Whole-bucket configuration: desired, observed and derived outputs.

use std::collections::BTreeMap;

use bucketctl_core::{AwsRegion, Partition};
use serde::{Deserialize, Serialize};

use crate::cors::CorsRule;
use crate::lifecycle::LifecycleRule;
use crate::reference::Deferred;
use crate::replication::ReplicationConfigurationSpec;
use crate::types::{AccelerateStatus, CannedAcl, Payer, SseAlgorithm, VersioningStatus};
use crate::website::WebsiteConfiguration;

/// Access logging target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Bucket receiving the access logs.
    pub target_bucket: Deferred,
    /// Key prefix for log objects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_prefix: Option<String>,
}

/// Default server-side encryption rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionRule {
    /// Encryption algorithm.
    pub sse_algorithm: SseAlgorithm,
    /// KMS key; only meaningful with `aws:kms`.
    #[serde(default, alias = "kmsKeyId", skip_serializing_if = "Option::is_none")]
    pub kms_master_key_id: Option<Deferred>,
}

/// The bucket the caller wants.
///
/// `None` on an optional sub-resource means "not managed, remove if present"
/// for collection-like sub-resources and "leave alone" for `acceleration_status`
/// and `request_payer`. `policy: Some("")` explicitly deletes the policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredConfiguration {
    /// Exact bucket name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Prefix for a generated unique name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    /// Target region; the configured default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<AwsRegion>,
    /// Canned ACL.
    #[serde(default)]
    pub acl: CannedAcl,
    /// Empty the bucket before deleting it.
    #[serde(default)]
    pub force_destroy: bool,
    /// Enable object versioning.
    #[serde(default)]
    pub versioning_enabled: bool,
    /// Transfer acceleration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_status: Option<AccelerateStatus>,
    /// Request payment mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_payer: Option<Payer>,
    /// Bucket policy JSON document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Access logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    /// CORS rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cors_rules: Vec<CorsRule>,
    /// Lifecycle rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lifecycle_rules: Vec<LifecycleRule>,
    /// Replication configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<ReplicationConfigurationSpec>,
    /// Default encryption rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encryption_rules: Vec<EncryptionRule>,
    /// Static website hosting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<WebsiteConfiguration>,
    /// Bucket tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl DesiredConfiguration {
    /// A desired configuration for an exact bucket name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set the region.
    #[must_use]
    pub fn in_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(AwsRegion::new(region));
        self
    }
}

/// The bucket as read back from the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedConfiguration {
    /// Bucket name.
    pub name: String,
    /// Bucket region.
    pub region: AwsRegion,
    /// Canned ACL, if the grants match one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl: Option<CannedAcl>,
    /// Versioning mode.
    #[serde(default)]
    pub versioning: VersioningStatus,
    /// Transfer acceleration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceleration_status: Option<AccelerateStatus>,
    /// Request payment mode.
    #[serde(default)]
    pub request_payer: Payer,
    /// Bucket policy JSON document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Access logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    /// CORS rules.
    #[serde(default)]
    pub cors_rules: Vec<CorsRule>,
    /// Lifecycle rules.
    #[serde(default)]
    pub lifecycle_rules: Vec<LifecycleRule>,
    /// Replication configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication: Option<ReplicationConfigurationSpec>,
    /// Default encryption rules.
    #[serde(default)]
    pub encryption_rules: Vec<EncryptionRule>,
    /// Static website hosting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<WebsiteConfiguration>,
    /// Bucket tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ObservedConfiguration {
    /// A freshly created bucket with every sub-resource at its default.
    #[must_use]
    pub fn empty(name: impl Into<String>, region: AwsRegion) -> Self {
        Self {
            name: name.into(),
            region,
            ..Self::default()
        }
    }
}

/// Name, region and partition of a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketIdentity {
    /// Bucket name.
    pub name: String,
    /// Bucket region.
    pub region: AwsRegion,
    /// Partition of the region.
    pub partition: Partition,
}

impl BucketIdentity {
    /// Build an identity, deriving the partition from the region.
    #[must_use]
    pub fn new(name: impl Into<String>, region: AwsRegion) -> Self {
        let partition = region.partition();
        Self {
            name: name.into(),
            region,
            partition,
        }
    }
}

/// Attributes derived from a bucket's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketOutputs {
    /// Bucket name.
    pub id: String,
    /// Bucket ARN.
    pub arn: String,
    /// Bucket region.
    pub region: String,
    /// Route 53 hosted zone of the website endpoint, for known regions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_zone_id: Option<String>,
    /// Global DNS name.
    pub bucket_domain_name: String,
    /// Region-specific DNS name.
    pub bucket_regional_domain_name: String,
    /// Website endpoint, when website hosting is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_endpoint: Option<String>,
    /// Website domain, when website hosting is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website_domain: Option<String>,
}
