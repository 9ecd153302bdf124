//! The remote bucket control-plane API consumed by the reconciler.
//!
//! One async method per remote operation. Getters return `None` or an
//! empty collection when the sub-resource is not configured; a missing
//! bucket is reported as [`ApiError::NoSuchBucket`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use bucketctl_core::AwsRegion;
use bucketctl_model::{
    AccelerateStatus, CannedAcl, CorsRule, EncryptionRule, LifecycleRule, LoggingConfig, Payer,
    ReplicationConfigurationSpec, VersioningStatus, WebsiteConfiguration,
};

use crate::error::ApiError;

/// Wire names of the remote operations, used in logs and call journals.
pub mod operation {
    /// `CreateBucket`.
    pub const CREATE_BUCKET: &str = "CreateBucket";
    /// `HeadBucket`.
    pub const HEAD_BUCKET: &str = "HeadBucket";
    /// `DeleteBucket`.
    pub const DELETE_BUCKET: &str = "DeleteBucket";
    /// `DeleteObjects`, used to drain a bucket.
    pub const DELETE_OBJECTS: &str = "DeleteObjects";
    /// `GetBucketAcl`.
    pub const GET_ACL: &str = "GetBucketAcl";
    /// `PutBucketAcl`.
    pub const PUT_ACL: &str = "PutBucketAcl";
    /// `GetBucketVersioning`.
    pub const GET_VERSIONING: &str = "GetBucketVersioning";
    /// `PutBucketVersioning`.
    pub const PUT_VERSIONING: &str = "PutBucketVersioning";
    /// `GetBucketAccelerateConfiguration`.
    pub const GET_ACCELERATE: &str = "GetBucketAccelerateConfiguration";
    /// `PutBucketAccelerateConfiguration`.
    pub const PUT_ACCELERATE: &str = "PutBucketAccelerateConfiguration";
    /// `GetBucketRequestPayment`.
    pub const GET_REQUEST_PAYMENT: &str = "GetBucketRequestPayment";
    /// `PutBucketRequestPayment`.
    pub const PUT_REQUEST_PAYMENT: &str = "PutBucketRequestPayment";
    /// `GetBucketLogging`.
    pub const GET_LOGGING: &str = "GetBucketLogging";
    /// `PutBucketLogging`.
    pub const PUT_LOGGING: &str = "PutBucketLogging";
    /// `PutBucketLogging` with an empty status.
    pub const DELETE_LOGGING: &str = "DeleteBucketLogging";
    /// `GetBucketPolicy`.
    pub const GET_POLICY: &str = "GetBucketPolicy";
    /// `PutBucketPolicy`.
    pub const PUT_POLICY: &str = "PutBucketPolicy";
    /// `DeleteBucketPolicy`.
    pub const DELETE_POLICY: &str = "DeleteBucketPolicy";
    /// `GetBucketWebsite`.
    pub const GET_WEBSITE: &str = "GetBucketWebsite";
    /// `PutBucketWebsite`.
    pub const PUT_WEBSITE: &str = "PutBucketWebsite";
    /// `DeleteBucketWebsite`.
    pub const DELETE_WEBSITE: &str = "DeleteBucketWebsite";
    /// `GetBucketReplication`.
    pub const GET_REPLICATION: &str = "GetBucketReplication";
    /// `PutBucketReplication`.
    pub const PUT_REPLICATION: &str = "PutBucketReplication";
    /// `DeleteBucketReplication`.
    pub const DELETE_REPLICATION: &str = "DeleteBucketReplication";
    /// `GetBucketLifecycleConfiguration`.
    pub const GET_LIFECYCLE: &str = "GetBucketLifecycleConfiguration";
    /// `PutBucketLifecycleConfiguration`.
    pub const PUT_LIFECYCLE: &str = "PutBucketLifecycleConfiguration";
    /// `DeleteBucketLifecycle`.
    pub const DELETE_LIFECYCLE: &str = "DeleteBucketLifecycle";
    /// `GetBucketCors`.
    pub const GET_CORS: &str = "GetBucketCors";
    /// `PutBucketCors`.
    pub const PUT_CORS: &str = "PutBucketCors";
    /// `DeleteBucketCors`.
    pub const DELETE_CORS: &str = "DeleteBucketCors";
    /// `GetBucketEncryption`.
    pub const GET_ENCRYPTION: &str = "GetBucketEncryption";
    /// `PutBucketEncryption`.
    pub const PUT_ENCRYPTION: &str = "PutBucketEncryption";
    /// `DeleteBucketEncryption`.
    pub const DELETE_ENCRYPTION: &str = "DeleteBucketEncryption";
    /// `GetBucketTagging`.
    pub const GET_TAGS: &str = "GetBucketTagging";
    /// `PutBucketTagging`.
    pub const PUT_TAGS: &str = "PutBucketTagging";
    /// `DeleteBucketTagging`.
    pub const DELETE_TAGS: &str = "DeleteBucketTagging";

    /// Whether the operation changes remote state.
    #[must_use]
    pub fn is_mutation(operation: &str) -> bool {
        !(operation.starts_with("Get") || operation.starts_with("Head"))
    }
}

/// Remote bucket control-plane operations.
#[async_trait]
pub trait BucketApi: Send + Sync + std::fmt::Debug {
    // -- bucket --------------------------------------------------------------

    /// Create a bucket.
    async fn create_bucket(
        &self,
        name: &str,
        region: &AwsRegion,
        acl: CannedAcl,
    ) -> Result<(), ApiError>;

    /// Look up a bucket. Returns its region, or `None` when absent.
    async fn head_bucket(&self, name: &str) -> Result<Option<AwsRegion>, ApiError>;

    /// Delete an empty bucket.
    async fn delete_bucket(&self, name: &str) -> Result<(), ApiError>;

    /// Delete up to `max` objects or object versions. Returns how many were
    /// deleted; zero means the bucket is empty.
    async fn delete_object_batch(&self, name: &str, max: usize) -> Result<usize, ApiError>;

    // -- scalar sub-resources -------------------------------------------------

    /// Read the canned ACL, if the grants match one.
    async fn get_acl(&self, name: &str) -> Result<Option<CannedAcl>, ApiError>;

    /// Apply a canned ACL.
    async fn put_acl(&self, name: &str, acl: CannedAcl) -> Result<(), ApiError>;

    /// Read the versioning mode.
    async fn get_versioning(&self, name: &str) -> Result<VersioningStatus, ApiError>;

    /// Set the versioning mode.
    async fn put_versioning(&self, name: &str, status: VersioningStatus) -> Result<(), ApiError>;

    /// Read the transfer acceleration status.
    async fn get_accelerate(&self, name: &str) -> Result<Option<AccelerateStatus>, ApiError>;

    /// Set the transfer acceleration status.
    async fn put_accelerate(&self, name: &str, status: AccelerateStatus) -> Result<(), ApiError>;

    /// Read the request payment mode.
    async fn get_request_payment(&self, name: &str) -> Result<Payer, ApiError>;

    /// Set the request payment mode.
    async fn put_request_payment(&self, name: &str, payer: Payer) -> Result<(), ApiError>;

    // -- documents ------------------------------------------------------------

    /// Read the access logging target.
    async fn get_logging(&self, name: &str) -> Result<Option<LoggingConfig>, ApiError>;

    /// Set the access logging target.
    async fn put_logging(&self, name: &str, logging: &LoggingConfig) -> Result<(), ApiError>;

    /// Disable access logging.
    async fn delete_logging(&self, name: &str) -> Result<(), ApiError>;

    /// Read the bucket policy.
    async fn get_policy(&self, name: &str) -> Result<Option<String>, ApiError>;

    /// Replace the bucket policy.
    async fn put_policy(&self, name: &str, policy: &str) -> Result<(), ApiError>;

    /// Remove the bucket policy.
    async fn delete_policy(&self, name: &str) -> Result<(), ApiError>;

    /// Read the website configuration.
    async fn get_website(&self, name: &str) -> Result<Option<WebsiteConfiguration>, ApiError>;

    /// Replace the website configuration.
    async fn put_website(&self, name: &str, website: &WebsiteConfiguration) -> Result<(), ApiError>;

    /// Remove the website configuration.
    async fn delete_website(&self, name: &str) -> Result<(), ApiError>;

    /// Read the replication configuration.
    async fn get_replication(
        &self,
        name: &str,
    ) -> Result<Option<ReplicationConfigurationSpec>, ApiError>;

    /// Replace the replication configuration.
    async fn put_replication(
        &self,
        name: &str,
        replication: &ReplicationConfigurationSpec,
    ) -> Result<(), ApiError>;

    /// Remove the replication configuration.
    async fn delete_replication(&self, name: &str) -> Result<(), ApiError>;

    // -- rule collections -----------------------------------------------------

    /// Read the lifecycle rules.
    async fn get_lifecycle(&self, name: &str) -> Result<Vec<LifecycleRule>, ApiError>;

    /// Replace the lifecycle rules.
    async fn put_lifecycle(&self, name: &str, rules: &[LifecycleRule]) -> Result<(), ApiError>;

    /// Remove every lifecycle rule.
    async fn delete_lifecycle(&self, name: &str) -> Result<(), ApiError>;

    /// Read the CORS rules.
    async fn get_cors(&self, name: &str) -> Result<Vec<CorsRule>, ApiError>;

    /// Replace the CORS rules.
    async fn put_cors(&self, name: &str, rules: &[CorsRule]) -> Result<(), ApiError>;

    /// Remove every CORS rule.
    async fn delete_cors(&self, name: &str) -> Result<(), ApiError>;

    /// Read the default encryption rules.
    async fn get_encryption(&self, name: &str) -> Result<Vec<EncryptionRule>, ApiError>;

    /// Replace the default encryption rules.
    async fn put_encryption(&self, name: &str, rules: &[EncryptionRule]) -> Result<(), ApiError>;

    /// Remove default encryption.
    async fn delete_encryption(&self, name: &str) -> Result<(), ApiError>;

    /// Read the bucket tags.
    async fn get_tags(&self, name: &str) -> Result<BTreeMap<String, String>, ApiError>;

    /// Replace the bucket tags.
    async fn put_tags(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<(), ApiError>;

    /// Remove every bucket tag.
    async fn delete_tags(&self, name: &str) -> Result<(), ApiError>;
}
