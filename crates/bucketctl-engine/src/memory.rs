//! In-memory implementation of [`BucketApi`].
//!
//! Backs the CLI `simulate` command and the test suites. Beyond storing
//! configuration it can:
//!
//! - hide a freshly created bucket from `HeadBucket` for a number of checks,
//!   imitating eventual consistency;
//! - fail the next N calls of an operation with a scripted [`ApiError`];
//! - reserve names as owned by another account;
//! - hold objects, so destroy has something to drain;
//! - record every call in a journal.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use bucketctl_core::AwsRegion;
use bucketctl_model::{
    AccelerateStatus, CannedAcl, CorsRule, EncryptionRule, LifecycleRule, LoggingConfig,
    ObservedConfiguration, Payer, ReplicationConfigurationSpec, VersioningStatus,
    WebsiteConfiguration,
};
use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, info};

use crate::api::{BucketApi, operation};
use crate::error::ApiError;
use crate::validate::check_policy;

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCall {
    /// Wire name of the operation.
    pub operation: &'static str,
    /// Target bucket.
    pub bucket: String,
}

impl ApiCall {
    /// Whether the call changes remote state.
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        operation::is_mutation(self.operation)
    }
}

// ---------------------------------------------------------------------------
// MemoryBucket
// ---------------------------------------------------------------------------

/// Stored state of one bucket. Interior fields use `RwLock` so a shared
/// map reference is enough to mutate them.
#[derive(Debug)]
struct MemoryBucket {
    region: AwsRegion,
    acl: RwLock<CannedAcl>,
    versioning: RwLock<VersioningStatus>,
    accelerate: RwLock<Option<AccelerateStatus>>,
    request_payer: RwLock<Payer>,
    logging: RwLock<Option<LoggingConfig>>,
    policy: RwLock<Option<String>>,
    website: RwLock<Option<WebsiteConfiguration>>,
    replication: RwLock<Option<ReplicationConfigurationSpec>>,
    lifecycle: RwLock<Vec<LifecycleRule>>,
    cors: RwLock<Vec<CorsRule>>,
    encryption: RwLock<Vec<EncryptionRule>>,
    tags: RwLock<BTreeMap<String, String>>,
    objects: RwLock<usize>,
}

impl MemoryBucket {
    fn new(region: AwsRegion, acl: CannedAcl) -> Self {
        Self {
            region,
            acl: RwLock::new(acl),
            versioning: RwLock::new(VersioningStatus::Unset),
            accelerate: RwLock::new(None),
            request_payer: RwLock::new(Payer::BucketOwner),
            logging: RwLock::new(None),
            policy: RwLock::new(None),
            website: RwLock::new(None),
            replication: RwLock::new(None),
            lifecycle: RwLock::new(Vec::new()),
            cors: RwLock::new(Vec::new()),
            encryption: RwLock::new(Vec::new()),
            tags: RwLock::new(BTreeMap::new()),
            objects: RwLock::new(0),
        }
    }

    fn from_observed(observed: &ObservedConfiguration) -> Self {
        Self {
            region: observed.region.clone(),
            acl: RwLock::new(observed.acl.unwrap_or_default()),
            versioning: RwLock::new(observed.versioning),
            accelerate: RwLock::new(observed.acceleration_status),
            request_payer: RwLock::new(observed.request_payer),
            logging: RwLock::new(observed.logging.clone()),
            policy: RwLock::new(observed.policy.clone()),
            website: RwLock::new(observed.website.clone()),
            replication: RwLock::new(observed.replication.clone()),
            lifecycle: RwLock::new(observed.lifecycle_rules.clone()),
            cors: RwLock::new(observed.cors_rules.clone()),
            encryption: RwLock::new(observed.encryption_rules.clone()),
            tags: RwLock::new(observed.tags.clone()),
            objects: RwLock::new(0),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryBucketApi
// ---------------------------------------------------------------------------

/// A [`BucketApi`] holding every bucket in process memory.
pub struct MemoryBucketApi {
    buckets: DashMap<String, MemoryBucket>,
    foreign: DashSet<String>,
    faults: DashMap<&'static str, VecDeque<ApiError>>,
    hidden: DashMap<String, u32>,
    visibility_lag: RwLock<u32>,
    drain_delay: RwLock<Duration>,
    journal: Mutex<Vec<ApiCall>>,
}

impl std::fmt::Debug for MemoryBucketApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBucketApi")
            .field("bucket_count", &self.buckets.len())
            .field("pending_faults", &self.faults.len())
            .finish_non_exhaustive()
    }
}

impl Default for MemoryBucketApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBucketApi {
    /// Create an empty store with immediate visibility and no faults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: DashMap::new(),
            foreign: DashSet::new(),
            faults: DashMap::new(),
            hidden: DashMap::new(),
            visibility_lag: RwLock::new(0),
            drain_delay: RwLock::new(Duration::ZERO),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Hide each newly created bucket from the next `checks` `HeadBucket` calls.
    #[must_use]
    pub fn with_visibility_lag(self, checks: u32) -> Self {
        *self.visibility_lag.write() = checks;
        self
    }

    /// Sleep this long inside every `DeleteObjects` call.
    #[must_use]
    pub fn with_drain_delay(self, delay: Duration) -> Self {
        *self.drain_delay.write() = delay;
        self
    }

    /// Fail the next call of `operation` with `error`.
    pub fn inject_failure(&self, operation: &'static str, error: ApiError) {
        self.inject_failures(operation, error, 1);
    }

    /// Fail the next `times` calls of `operation` with `error`.
    pub fn inject_failures(&self, operation: &'static str, error: ApiError, times: usize) {
        let mut queue = self.faults.entry(operation).or_default();
        queue.extend(std::iter::repeat_n(error, times));
    }

    /// Mark a name as owned by another account.
    pub fn reserve_foreign_name(&self, name: impl Into<String>) {
        self.foreign.insert(name.into());
    }

    /// Install an existing bucket with the given configuration.
    pub fn seed(&self, observed: &ObservedConfiguration) {
        self.buckets
            .insert(observed.name.clone(), MemoryBucket::from_observed(observed));
    }

    /// Add objects to a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NoSuchBucket`] if the bucket does not exist.
    pub fn put_objects(&self, name: &str, count: usize) -> Result<(), ApiError> {
        let bucket = self.buckets.get(name).ok_or_else(|| ApiError::no_such_bucket(name))?;
        *bucket.objects.write() += count;
        Ok(())
    }

    /// Objects currently stored, or `None` if the bucket does not exist.
    #[must_use]
    pub fn object_count(&self, name: &str) -> Option<usize> {
        self.buckets.get(name).map(|b| *b.objects.read())
    }

    /// Whether the bucket exists, bypassing visibility lag and the journal.
    #[must_use]
    pub fn bucket_exists(&self, name: &str) -> bool {
        self.buckets.contains_key(name)
    }

    /// Every recorded call, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiCall> {
        self.journal.lock().clone()
    }

    /// How many times `operation` was called.
    #[must_use]
    pub fn calls_for(&self, operation: &str) -> usize {
        self.journal
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Recorded calls that change remote state.
    #[must_use]
    pub fn mutations(&self) -> Vec<ApiCall> {
        self.journal
            .lock()
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Forget every recorded call.
    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }

    /// Record the call and pop a scripted failure, if one is queued.
    fn begin(&self, operation: &'static str, name: &str) -> Result<(), ApiError> {
        self.journal.lock().push(ApiCall {
            operation,
            bucket: name.to_owned(),
        });
        let scripted = self
            .faults
            .get_mut(operation)
            .and_then(|mut queue| queue.pop_front());
        match scripted {
            Some(err) => {
                debug!(bucket = name, operation, error = %err, "injected failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn with_bucket<T>(
        &self,
        operation: &'static str,
        name: &str,
        f: impl FnOnce(&MemoryBucket) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        self.begin(operation, name)?;
        let bucket = self.buckets.get(name).ok_or_else(|| ApiError::no_such_bucket(name))?;
        f(&bucket)
    }
}

#[async_trait]
impl BucketApi for MemoryBucketApi {
    async fn create_bucket(
        &self,
        name: &str,
        region: &AwsRegion,
        acl: CannedAcl,
    ) -> Result<(), ApiError> {
        self.begin(operation::CREATE_BUCKET, name)?;
        if self.foreign.contains(name) {
            return Err(ApiError::BucketAlreadyExists {
                bucket: name.to_owned(),
            });
        }
        if self.buckets.contains_key(name) {
            return Err(ApiError::BucketAlreadyOwnedByYou {
                bucket: name.to_owned(),
            });
        }
        self.buckets
            .insert(name.to_owned(), MemoryBucket::new(region.clone(), acl));
        let lag = *self.visibility_lag.read();
        if lag > 0 {
            self.hidden.insert(name.to_owned(), lag);
        }
        info!(bucket = name, region = %region, "bucket created");
        Ok(())
    }

    async fn head_bucket(&self, name: &str) -> Result<Option<AwsRegion>, ApiError> {
        self.begin(operation::HEAD_BUCKET, name)?;
        if let Some(mut remaining) = self.hidden.get_mut(name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(None);
            }
        }
        Ok(self.buckets.get(name).map(|b| b.region.clone()))
    }

    async fn delete_bucket(&self, name: &str) -> Result<(), ApiError> {
        self.begin(operation::DELETE_BUCKET, name)?;
        let bucket = self.buckets.get(name).ok_or_else(|| ApiError::no_such_bucket(name))?;
        if *bucket.objects.read() > 0 {
            return Err(ApiError::BucketNotEmpty {
                bucket: name.to_owned(),
            });
        }
        drop(bucket);
        self.buckets.remove(name);
        self.hidden.remove(name);
        info!(bucket = name, "bucket deleted");
        Ok(())
    }

    async fn delete_object_batch(&self, name: &str, max: usize) -> Result<usize, ApiError> {
        self.begin(operation::DELETE_OBJECTS, name)?;
        let delay = *self.drain_delay.read();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let bucket = self.buckets.get(name).ok_or_else(|| ApiError::no_such_bucket(name))?;
        let mut objects = bucket.objects.write();
        let deleted = (*objects).min(max);
        *objects -= deleted;
        Ok(deleted)
    }

    // -- scalar sub-resources -------------------------------------------------

    async fn get_acl(&self, name: &str) -> Result<Option<CannedAcl>, ApiError> {
        self.with_bucket(operation::GET_ACL, name, |b| Ok(Some(*b.acl.read())))
    }

    async fn put_acl(&self, name: &str, acl: CannedAcl) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_ACL, name, |b| {
            *b.acl.write() = acl;
            Ok(())
        })
    }

    async fn get_versioning(&self, name: &str) -> Result<VersioningStatus, ApiError> {
        self.with_bucket(operation::GET_VERSIONING, name, |b| Ok(*b.versioning.read()))
    }

    async fn put_versioning(&self, name: &str, status: VersioningStatus) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_VERSIONING, name, |b| {
            if status == VersioningStatus::Unset {
                return Err(ApiError::InvalidArgument {
                    message: "versioning status must be Enabled or Suspended".to_owned(),
                });
            }
            *b.versioning.write() = status;
            Ok(())
        })
    }

    async fn get_accelerate(&self, name: &str) -> Result<Option<AccelerateStatus>, ApiError> {
        self.with_bucket(operation::GET_ACCELERATE, name, |b| Ok(*b.accelerate.read()))
    }

    async fn put_accelerate(&self, name: &str, status: AccelerateStatus) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_ACCELERATE, name, |b| {
            *b.accelerate.write() = Some(status);
            Ok(())
        })
    }

    async fn get_request_payment(&self, name: &str) -> Result<Payer, ApiError> {
        self.with_bucket(operation::GET_REQUEST_PAYMENT, name, |b| Ok(*b.request_payer.read()))
    }

    async fn put_request_payment(&self, name: &str, payer: Payer) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_REQUEST_PAYMENT, name, |b| {
            *b.request_payer.write() = payer;
            Ok(())
        })
    }

    // -- documents ------------------------------------------------------------

    async fn get_logging(&self, name: &str) -> Result<Option<LoggingConfig>, ApiError> {
        self.with_bucket(operation::GET_LOGGING, name, |b| Ok(b.logging.read().clone()))
    }

    async fn put_logging(&self, name: &str, logging: &LoggingConfig) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_LOGGING, name, |b| {
            *b.logging.write() = Some(logging.clone());
            Ok(())
        })
    }

    async fn delete_logging(&self, name: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::DELETE_LOGGING, name, |b| {
            *b.logging.write() = None;
            Ok(())
        })
    }

    async fn get_policy(&self, name: &str) -> Result<Option<String>, ApiError> {
        self.with_bucket(operation::GET_POLICY, name, |b| Ok(b.policy.read().clone()))
    }

    async fn put_policy(&self, name: &str, policy: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_POLICY, name, |b| {
            if policy.is_empty() {
                return Err(ApiError::MalformedPolicy {
                    message: "policies must not be empty".to_owned(),
                });
            }
            check_policy(policy).map_err(|message| ApiError::MalformedPolicy { message })?;
            *b.policy.write() = Some(policy.to_owned());
            Ok(())
        })
    }

    async fn delete_policy(&self, name: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::DELETE_POLICY, name, |b| {
            *b.policy.write() = None;
            Ok(())
        })
    }

    async fn get_website(&self, name: &str) -> Result<Option<WebsiteConfiguration>, ApiError> {
        self.with_bucket(operation::GET_WEBSITE, name, |b| Ok(b.website.read().clone()))
    }

    async fn put_website(
        &self,
        name: &str,
        website: &WebsiteConfiguration,
    ) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_WEBSITE, name, |b| {
            *b.website.write() = Some(website.clone());
            Ok(())
        })
    }

    async fn delete_website(&self, name: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::DELETE_WEBSITE, name, |b| {
            *b.website.write() = None;
            Ok(())
        })
    }

    async fn get_replication(
        &self,
        name: &str,
    ) -> Result<Option<ReplicationConfigurationSpec>, ApiError> {
        self.with_bucket(operation::GET_REPLICATION, name, |b| Ok(b.replication.read().clone()))
    }

    async fn put_replication(
        &self,
        name: &str,
        replication: &ReplicationConfigurationSpec,
    ) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_REPLICATION, name, |b| {
            if *b.versioning.read() != VersioningStatus::Enabled {
                return Err(ApiError::InvalidArgument {
                    message: "Versioning must be 'Enabled' on the bucket to apply \
                              a replication configuration"
                        .to_owned(),
                });
            }
            *b.replication.write() = Some(replication.clone());
            Ok(())
        })
    }

    async fn delete_replication(&self, name: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::DELETE_REPLICATION, name, |b| {
            *b.replication.write() = None;
            Ok(())
        })
    }

    // -- rule collections -----------------------------------------------------

    async fn get_lifecycle(&self, name: &str) -> Result<Vec<LifecycleRule>, ApiError> {
        self.with_bucket(operation::GET_LIFECYCLE, name, |b| Ok(b.lifecycle.read().clone()))
    }

    async fn put_lifecycle(&self, name: &str, rules: &[LifecycleRule]) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_LIFECYCLE, name, |b| {
            *b.lifecycle.write() = rules.to_vec();
            Ok(())
        })
    }

    async fn delete_lifecycle(&self, name: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::DELETE_LIFECYCLE, name, |b| {
            b.lifecycle.write().clear();
            Ok(())
        })
    }

    async fn get_cors(&self, name: &str) -> Result<Vec<CorsRule>, ApiError> {
        self.with_bucket(operation::GET_CORS, name, |b| Ok(b.cors.read().clone()))
    }

    async fn put_cors(&self, name: &str, rules: &[CorsRule]) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_CORS, name, |b| {
            *b.cors.write() = rules.to_vec();
            Ok(())
        })
    }

    async fn delete_cors(&self, name: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::DELETE_CORS, name, |b| {
            b.cors.write().clear();
            Ok(())
        })
    }

    async fn get_encryption(&self, name: &str) -> Result<Vec<EncryptionRule>, ApiError> {
        self.with_bucket(operation::GET_ENCRYPTION, name, |b| Ok(b.encryption.read().clone()))
    }

    async fn put_encryption(&self, name: &str, rules: &[EncryptionRule]) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_ENCRYPTION, name, |b| {
            *b.encryption.write() = rules.to_vec();
            Ok(())
        })
    }

    async fn delete_encryption(&self, name: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::DELETE_ENCRYPTION, name, |b| {
            b.encryption.write().clear();
            Ok(())
        })
    }

    async fn get_tags(&self, name: &str) -> Result<BTreeMap<String, String>, ApiError> {
        self.with_bucket(operation::GET_TAGS, name, |b| Ok(b.tags.read().clone()))
    }

    async fn put_tags(&self, name: &str, tags: &BTreeMap<String, String>) -> Result<(), ApiError> {
        self.with_bucket(operation::PUT_TAGS, name, |b| {
            *b.tags.write() = tags.clone();
            Ok(())
        })
    }

    async fn delete_tags(&self, name: &str) -> Result<(), ApiError> {
        self.with_bucket(operation::DELETE_TAGS, name, |b| {
            b.tags.write().clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn west() -> AwsRegion {
        AwsRegion::new("us-west-2")
    }

    #[tokio::test]
    async fn test_should_create_and_head_bucket() {
        let api = MemoryBucketApi::new();
        api.create_bucket("b", &west(), CannedAcl::Private).await.unwrap();
        assert_eq!(api.head_bucket("b").await.unwrap(), Some(west()));
        assert_eq!(api.head_bucket("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_should_report_ownership_on_duplicate_create() {
        let api = MemoryBucketApi::new();
        api.reserve_foreign_name("taken");
        api.create_bucket("mine", &west(), CannedAcl::Private).await.unwrap();

        let err = api.create_bucket("taken", &west(), CannedAcl::Private).await.unwrap_err();
        assert_eq!(err.code(), "BucketAlreadyExists");
        let err = api.create_bucket("mine", &west(), CannedAcl::Private).await.unwrap_err();
        assert_eq!(err.code(), "BucketAlreadyOwnedByYou");
    }

    #[tokio::test]
    async fn test_should_hide_new_bucket_for_lag_checks() {
        let api = MemoryBucketApi::new().with_visibility_lag(2);
        api.create_bucket("b", &west(), CannedAcl::Private).await.unwrap();
        assert_eq!(api.head_bucket("b").await.unwrap(), None);
        assert_eq!(api.head_bucket("b").await.unwrap(), None);
        assert!(api.head_bucket("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_should_pop_injected_failures_in_order() {
        let api = MemoryBucketApi::new();
        api.create_bucket("b", &west(), CannedAcl::Private).await.unwrap();
        api.inject_failures(operation::PUT_CORS, ApiError::SlowDown, 2);

        assert_eq!(api.put_cors("b", &[]).await.unwrap_err(), ApiError::SlowDown);
        assert_eq!(api.put_cors("b", &[]).await.unwrap_err(), ApiError::SlowDown);
        assert!(api.put_cors("b", &[]).await.is_ok());
        assert_eq!(api.calls_for(operation::PUT_CORS), 3);
    }

    #[tokio::test]
    async fn test_should_refuse_to_delete_non_empty_bucket() {
        let api = MemoryBucketApi::new();
        api.create_bucket("b", &west(), CannedAcl::Private).await.unwrap();
        api.put_objects("b", 3).unwrap();

        assert_eq!(api.delete_bucket("b").await.unwrap_err().code(), "BucketNotEmpty");
        assert_eq!(api.delete_object_batch("b", 2).await.unwrap(), 2);
        assert_eq!(api.delete_object_batch("b", 2).await.unwrap(), 1);
        assert_eq!(api.delete_object_batch("b", 2).await.unwrap(), 0);
        api.delete_bucket("b").await.unwrap();
        assert!(!api.bucket_exists("b"));
    }

    #[tokio::test]
    async fn test_should_require_versioning_for_replication() {
        let api = MemoryBucketApi::new();
        api.create_bucket("b", &west(), CannedAcl::Private).await.unwrap();
        let replication = ReplicationConfigurationSpec {
            role: "arn:aws:iam::123456789012:role/r".into(),
            rules: Vec::new(),
        };
        let err = api.put_replication("b", &replication).await.unwrap_err();
        assert_eq!(err.code(), "InvalidArgument");

        api.put_versioning("b", VersioningStatus::Enabled).await.unwrap();
        api.put_replication("b", &replication).await.unwrap();
        assert!(api.get_replication("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_should_reject_malformed_policy() {
        let api = MemoryBucketApi::new();
        api.create_bucket("b", &west(), CannedAcl::Private).await.unwrap();
        let err = api.put_policy("b", "not json").await.unwrap_err();
        assert_eq!(err.code(), "MalformedPolicy");
        assert!(api.get_policy("b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_journal_only_mutations_as_mutations() {
        let api = MemoryBucketApi::new();
        api.create_bucket("b", &west(), CannedAcl::Private).await.unwrap();
        api.get_tags("b").await.unwrap();
        api.head_bucket("b").await.unwrap();
        let mutations = api.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].operation, operation::CREATE_BUCKET);
        assert_eq!(api.calls().len(), 3);
    }
}
