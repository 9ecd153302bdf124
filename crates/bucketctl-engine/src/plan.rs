//! Pure planning: desired vs observed to an ordered list of changes.
//!
//! Changes are emitted in a fixed sub-resource order so that replication
//! is always applied after versioning.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bucketctl_core::AwsRegion;
use bucketctl_model::{
    AccelerateStatus, CannedAcl, CorsRule, Deferred, DesiredConfiguration, EncryptionRule,
    LifecycleRule, LoggingConfig, ObservedConfiguration, Payer, ReferenceLookup,
    ReplicationConfiguration, ReplicationConfigurationSpec, ResourceRef, VersioningStatus,
    WebsiteConfiguration,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::operation;
use crate::canonical::{Canonical, content_id};
use crate::error::{ReconcileError, ValidationError};
use crate::naming::validate_bucket_name;
use crate::replication::{ReplicationNormalizer, to_spec};
use crate::set::{SetPlan, SetReconciler};
use crate::validate::validate_configuration;

/// Prefix of content-derived lifecycle rule ids.
const LIFECYCLE_ID_PREFIX: &str = "tf-s3-lifecycle-";

// ---------------------------------------------------------------------------
// SubResource
// ---------------------------------------------------------------------------

/// A separately configured part of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SubResource {
    /// Canned ACL.
    Acl,
    /// Versioning mode.
    Versioning,
    /// Access logging.
    Logging,
    /// Lifecycle rules.
    Lifecycle,
    /// CORS rules.
    Cors,
    /// Default encryption.
    Encryption,
    /// Static website hosting.
    Website,
    /// Transfer acceleration.
    Accelerate,
    /// Request payment mode.
    RequestPayment,
    /// Bucket policy.
    Policy,
    /// Bucket tags.
    Tags,
    /// Cross-region replication.
    Replication,
}

impl SubResource {
    /// Every sub-resource in application order.
    pub const APPLY_ORDER: [Self; 12] = [
        Self::Acl,
        Self::Versioning,
        Self::Logging,
        Self::Lifecycle,
        Self::Cors,
        Self::Encryption,
        Self::Website,
        Self::Accelerate,
        Self::RequestPayment,
        Self::Policy,
        Self::Tags,
        Self::Replication,
    ];

    /// Lowercase name used in messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acl => "acl",
            Self::Versioning => "versioning",
            Self::Logging => "logging",
            Self::Lifecycle => "lifecycle",
            Self::Cors => "cors",
            Self::Encryption => "encryption",
            Self::Website => "website",
            Self::Accelerate => "accelerate",
            Self::RequestPayment => "requestPayment",
            Self::Policy => "policy",
            Self::Tags => "tags",
            Self::Replication => "replication",
        }
    }
}

impl fmt::Display for SubResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Change / BucketPlan
// ---------------------------------------------------------------------------

/// One remote mutation. Collection sub-resources are always replaced whole.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", content = "value", rename_all = "camelCase")]
pub enum Change {
    /// Apply a canned ACL.
    PutAcl(CannedAcl),
    /// Set the versioning mode.
    PutVersioning(VersioningStatus),
    /// Set access logging.
    PutLogging(LoggingConfig),
    /// Disable access logging.
    DeleteLogging,
    /// Replace lifecycle rules.
    PutLifecycle(Vec<LifecycleRule>),
    /// Remove lifecycle rules.
    DeleteLifecycle,
    /// Replace CORS rules.
    PutCors(Vec<CorsRule>),
    /// Remove CORS rules.
    DeleteCors,
    /// Replace default encryption.
    PutEncryption(Vec<EncryptionRule>),
    /// Remove default encryption.
    DeleteEncryption,
    /// Replace the website configuration.
    PutWebsite(WebsiteConfiguration),
    /// Remove the website configuration.
    DeleteWebsite,
    /// Set transfer acceleration.
    PutAccelerate(AccelerateStatus),
    /// Set the request payment mode.
    PutRequestPayment(Payer),
    /// Replace the bucket policy.
    PutPolicy(String),
    /// Remove the bucket policy.
    DeletePolicy,
    /// Replace the bucket tags.
    PutTags(BTreeMap<String, String>),
    /// Remove the bucket tags.
    DeleteTags,
    /// Replace the replication configuration.
    PutReplication(ReplicationConfigurationSpec),
    /// Remove the replication configuration.
    DeleteReplication,
}

impl Change {
    /// The sub-resource the change touches.
    #[must_use]
    pub fn sub_resource(&self) -> SubResource {
        match self {
            Self::PutAcl(_) => SubResource::Acl,
            Self::PutVersioning(_) => SubResource::Versioning,
            Self::PutLogging(_) | Self::DeleteLogging => SubResource::Logging,
            Self::PutLifecycle(_) | Self::DeleteLifecycle => SubResource::Lifecycle,
            Self::PutCors(_) | Self::DeleteCors => SubResource::Cors,
            Self::PutEncryption(_) | Self::DeleteEncryption => SubResource::Encryption,
            Self::PutWebsite(_) | Self::DeleteWebsite => SubResource::Website,
            Self::PutAccelerate(_) => SubResource::Accelerate,
            Self::PutRequestPayment(_) => SubResource::RequestPayment,
            Self::PutPolicy(_) | Self::DeletePolicy => SubResource::Policy,
            Self::PutTags(_) | Self::DeleteTags => SubResource::Tags,
            Self::PutReplication(_) | Self::DeleteReplication => SubResource::Replication,
        }
    }

    /// The remote operation that carries the change.
    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::PutAcl(_) => operation::PUT_ACL,
            Self::PutVersioning(_) => operation::PUT_VERSIONING,
            Self::PutLogging(_) => operation::PUT_LOGGING,
            Self::DeleteLogging => operation::DELETE_LOGGING,
            Self::PutLifecycle(_) => operation::PUT_LIFECYCLE,
            Self::DeleteLifecycle => operation::DELETE_LIFECYCLE,
            Self::PutCors(_) => operation::PUT_CORS,
            Self::DeleteCors => operation::DELETE_CORS,
            Self::PutEncryption(_) => operation::PUT_ENCRYPTION,
            Self::DeleteEncryption => operation::DELETE_ENCRYPTION,
            Self::PutWebsite(_) => operation::PUT_WEBSITE,
            Self::DeleteWebsite => operation::DELETE_WEBSITE,
            Self::PutAccelerate(_) => operation::PUT_ACCELERATE,
            Self::PutRequestPayment(_) => operation::PUT_REQUEST_PAYMENT,
            Self::PutPolicy(_) => operation::PUT_POLICY,
            Self::DeletePolicy => operation::DELETE_POLICY,
            Self::PutTags(_) => operation::PUT_TAGS,
            Self::DeleteTags => operation::DELETE_TAGS,
            Self::PutReplication(_) => operation::PUT_REPLICATION,
            Self::DeleteReplication => operation::DELETE_REPLICATION,
        }
    }
}

/// Block-level counts for one collection sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDiffSummary {
    /// The sub-resource.
    pub sub_resource: SubResource,
    /// Blocks added.
    pub created: usize,
    /// Blocks replaced under the same key.
    pub updated: usize,
    /// Blocks removed.
    pub deleted: usize,
    /// Blocks left alone.
    pub unchanged: usize,
}

impl BlockDiffSummary {
    fn of<T: Clone>(sub_resource: SubResource, plan: &SetPlan<T>) -> Self {
        Self {
            sub_resource,
            created: plan.to_create.len(),
            updated: plan.to_update.len(),
            deleted: plan.to_delete.len(),
            unchanged: plan.unchanged.len(),
        }
    }
}

/// Everything needed to converge one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPlan {
    /// Bucket name.
    pub bucket: String,
    /// Changes in application order.
    pub changes: Vec<Change>,
    /// Block-level detail for collection sub-resources.
    pub block_diffs: Vec<BlockDiffSummary>,
}

impl BucketPlan {
    /// Whether the bucket already matches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Sub-resources touched, in application order.
    #[must_use]
    pub fn sub_resources(&self) -> Vec<SubResource> {
        self.changes.iter().map(Change::sub_resource).collect()
    }

    /// The change for `sub_resource`, if any.
    #[must_use]
    pub fn change_for(&self, sub_resource: SubResource) -> Option<&Change> {
        self.changes.iter().find(|c| c.sub_resource() == sub_resource)
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Computes [`BucketPlan`]s. Never talks to the remote.
#[derive(Debug, Clone)]
pub struct Planner {
    lookup: Arc<dyn ReferenceLookup>,
    sets: SetReconciler,
    replication: ReplicationNormalizer,
}

impl Planner {
    /// Create a planner resolving references through `lookup`.
    #[must_use]
    pub fn new(lookup: Arc<dyn ReferenceLookup>, sets: SetReconciler) -> Self {
        let replication = ReplicationNormalizer::new(Arc::clone(&lookup), sets.clone());
        Self {
            lookup,
            sets,
            replication,
        }
    }

    /// The replication normalizer in use.
    #[must_use]
    pub fn replication(&self) -> &ReplicationNormalizer {
        &self.replication
    }

    /// Every check that must pass before a remote call is made: the bucket
    /// name, the configuration shape, the replication precondition and
    /// reference resolution.
    pub fn preflight(
        &self,
        name: &str,
        region: &AwsRegion,
        desired: &DesiredConfiguration,
    ) -> Result<(), ReconcileError> {
        validate_bucket_name(name, region)?;
        // Planning against an empty bucket surfaces unresolved references.
        self.plan(name, desired, &ObservedConfiguration::empty(name, region.clone()))
            .map(|_| ())
    }

    /// Diff `desired` against `observed`.
    ///
    /// References are resolved first; any that cannot be resolved fail the
    /// plan with a [`ValidationError`].
    pub fn plan(
        &self,
        name: &str,
        desired: &DesiredConfiguration,
        observed: &ObservedConfiguration,
    ) -> Result<BucketPlan, ReconcileError> {
        validate_configuration(desired)?;
        if desired.replication.is_some() {
            ReplicationNormalizer::check_precondition(name, desired.versioning_enabled)?;
        }

        let mut unresolved = Vec::new();
        let logging = desired
            .logging
            .as_ref()
            .map(|l| self.resolve_logging(l, &mut unresolved));
        let encryption: Vec<EncryptionRule> = desired
            .encryption_rules
            .iter()
            .map(|r| self.resolve_encryption(r, &mut unresolved))
            .collect();
        let reasons: Vec<String> = unresolved
            .into_iter()
            .map(|r| format!("unresolved reference ${{{r}}}"))
            .collect();
        ValidationError::check("bucket configuration", reasons)?;

        let mut changes = Vec::new();
        let mut block_diffs = Vec::new();

        if observed.acl != Some(desired.acl) {
            changes.push(Change::PutAcl(desired.acl));
        }
        if let Some(status) = versioning_change(desired.versioning_enabled, observed.versioning) {
            changes.push(Change::PutVersioning(status));
        }
        match (logging, &observed.logging) {
            (Some(l), Some(o)) if &l == o => {}
            (Some(l), _) => changes.push(Change::PutLogging(l)),
            (None, Some(_)) => changes.push(Change::DeleteLogging),
            (None, None) => {}
        }

        let lifecycle: Vec<LifecycleRule> = desired
            .lifecycle_rules
            .iter()
            .map(|r| self.with_lifecycle_id(r))
            .collect();
        let diff = self.sets.diff(&lifecycle, &observed.lifecycle_rules);
        block_diffs.push(BlockDiffSummary::of(SubResource::Lifecycle, &diff));
        push_collection(&mut changes, &diff, Change::PutLifecycle, Change::DeleteLifecycle);

        let diff = self.sets.diff(&desired.cors_rules, &observed.cors_rules);
        block_diffs.push(BlockDiffSummary::of(SubResource::Cors, &diff));
        push_collection(&mut changes, &diff, Change::PutCors, Change::DeleteCors);

        let diff = self.sets.diff(&encryption, &observed.encryption_rules);
        block_diffs.push(BlockDiffSummary::of(SubResource::Encryption, &diff));
        push_collection(&mut changes, &diff, Change::PutEncryption, Change::DeleteEncryption);

        match (&desired.website, &observed.website) {
            (Some(d), Some(o)) if d == o => {}
            (Some(d), _) => changes.push(Change::PutWebsite(d.clone())),
            (None, Some(_)) => changes.push(Change::DeleteWebsite),
            (None, None) => {}
        }
        if let Some(status) = desired.acceleration_status {
            if observed.acceleration_status != Some(status) {
                changes.push(Change::PutAccelerate(status));
            }
        }
        if let Some(payer) = desired.request_payer {
            if observed.request_payer != payer {
                changes.push(Change::PutRequestPayment(payer));
            }
        }
        if let Some(change) = policy_change(desired.policy.as_deref(), observed.policy.as_deref()) {
            changes.push(change);
        }
        if desired.tags != observed.tags {
            changes.push(if desired.tags.is_empty() {
                Change::DeleteTags
            } else {
                Change::PutTags(desired.tags.clone())
            });
        }

        match &desired.replication {
            Some(spec) => {
                let wanted = self.replication.normalize(spec)?;
                let current = observed
                    .replication
                    .as_ref()
                    .map(|o| self.observed_replication(name, o))
                    .transpose()?;
                let diff = self.replication.compare(&wanted, current.as_ref());
                block_diffs.push(BlockDiffSummary::of(SubResource::Replication, &diff.rules));
                if !diff.is_empty() {
                    changes.push(Change::PutReplication(to_spec(&wanted)));
                }
            }
            None if observed.replication.is_some() => changes.push(Change::DeleteReplication),
            None => {}
        }

        debug!(bucket = name, changes = changes.len(), "computed bucket plan");
        Ok(BucketPlan {
            bucket: name.to_owned(),
            changes,
            block_diffs,
        })
    }

    /// Interpret the remote replication configuration. A shape the remote
    /// should never hold is an error, not an absent configuration.
    fn observed_replication(
        &self,
        bucket: &str,
        spec: &ReplicationConfigurationSpec,
    ) -> Result<ReplicationConfiguration, ReconcileError> {
        ReplicationNormalizer::validate(spec)
            .and_then(|()| self.replication.normalize(spec))
            .map_err(|source| {
                warn!(bucket, error = %source, "observed replication configuration is malformed");
                ReconcileError::MalformedObserved {
                    bucket: bucket.to_owned(),
                    sub_resource: SubResource::Replication,
                    source,
                }
            })
    }

    fn resolve(&self, value: &Deferred, unresolved: &mut Vec<ResourceRef>) -> Deferred {
        match value.resolve(self.lookup.as_ref()) {
            Ok(v) => Deferred::Value(v),
            Err(r) => {
                unresolved.push(r);
                value.clone()
            }
        }
    }

    fn resolve_logging(
        &self,
        logging: &LoggingConfig,
        unresolved: &mut Vec<ResourceRef>,
    ) -> LoggingConfig {
        LoggingConfig {
            target_bucket: self.resolve(&logging.target_bucket, unresolved),
            target_prefix: logging.target_prefix.clone().filter(|p| !p.is_empty()),
        }
    }

    fn resolve_encryption(
        &self,
        rule: &EncryptionRule,
        unresolved: &mut Vec<ResourceRef>,
    ) -> EncryptionRule {
        EncryptionRule {
            sse_algorithm: rule.sse_algorithm,
            kms_master_key_id: rule
                .kms_master_key_id
                .as_ref()
                .map(|k| self.resolve(k, unresolved))
                .filter(|k| k.known() != Some("")),
        }
    }

    fn with_lifecycle_id(&self, rule: &LifecycleRule) -> LifecycleRule {
        match rule.id.as_deref() {
            Some(id) if !id.is_empty() => rule.clone(),
            _ => LifecycleRule {
                id: Some(content_id(LIFECYCLE_ID_PREFIX, rule, self.sets.hasher())),
                ..rule.clone()
            },
        }
    }
}

fn versioning_change(enabled: bool, observed: VersioningStatus) -> Option<VersioningStatus> {
    match (enabled, observed) {
        (true, VersioningStatus::Enabled) => None,
        (true, _) => Some(VersioningStatus::Enabled),
        (false, VersioningStatus::Enabled) => Some(VersioningStatus::Suspended),
        (false, _) => None,
    }
}

/// `None` leaves the policy unmanaged; `Some("")` removes it. Documents are
/// compared as parsed JSON, so whitespace and key order do not matter.
fn policy_change(desired: Option<&str>, observed: Option<&str>) -> Option<Change> {
    match (desired, observed) {
        (None, _) => None,
        (Some(""), Some(_)) => Some(Change::DeletePolicy),
        (Some(""), None) => None,
        (Some(d), Some(o)) if policies_equivalent(d, o) => None,
        (Some(d), _) => Some(Change::PutPolicy(d.to_owned())),
    }
}

fn policies_equivalent(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn push_collection<T: Canonical + Clone>(
    changes: &mut Vec<Change>,
    diff: &SetPlan<T>,
    put: impl FnOnce(Vec<T>) -> Change,
    delete: Change,
) {
    if diff.is_empty() {
        return;
    }
    let target = diff.target();
    changes.push(if target.is_empty() { delete } else { put(target) });
}
