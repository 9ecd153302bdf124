//! The bucket lifecycle state machine.
//!
//! ```text
//! Absent -> Creating -> Converging -> Stable -> Deleting -> Absent
//!              |            |   ^        |          ^
//!              v            v   |        |          |
//!            Failed <-------+   +--------+          |
//!              |                                    |
//!              +------------------------------------+
//! ```
//!
//! [`BucketReconciler::ensure`] drives a bucket to its desired configuration;
//! [`BucketReconciler::destroy`] removes it. Validation and preconditions
//! are checked before the first remote call. Sub-resource failures do not
//! stop their siblings; they are collected and reported together.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bucketctl_core::AwsRegion;
use bucketctl_model::{
    BucketIdentity, BucketOutputs, DesiredConfiguration, NoReferences, ObservedConfiguration,
    ReferenceLookup,
};
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::api::{BucketApi, operation};
use crate::canonical::BlockHasher;
use crate::config::ReconcilerConfig;
use crate::domain;
use crate::error::{ApiError, FailureCause, ReconcileError, SubResourceFailure};
use crate::naming::{generate_name, validate_bucket_name};
use crate::plan::{BucketPlan, Change, Planner, SubResource};
use crate::retry::RetryPolicy;
use crate::set::SetReconciler;

// ---------------------------------------------------------------------------
// ReconcileState
// ---------------------------------------------------------------------------

/// Lifecycle state of a bucket under reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileState {
    /// The bucket does not exist.
    Absent,
    /// Create issued; waiting for the bucket to become visible.
    Creating,
    /// Sub-resources are being applied.
    Converging,
    /// Every sub-resource matches the desired configuration.
    Stable,
    /// Deletion in progress.
    Deleting,
    /// Creation or convergence did not complete.
    Failed,
}

impl ReconcileState {
    /// Lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Converging => "converging",
            Self::Stable => "stable",
            Self::Deleting => "deleting",
            Self::Failed => "failed",
        }
    }

    /// Whether the machine may move from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Absent, Self::Creating)
                | (Self::Creating, Self::Converging | Self::Failed)
                | (Self::Converging, Self::Stable | Self::Failed)
                | (Self::Stable | Self::Failed, Self::Converging | Self::Deleting)
                | (Self::Deleting, Self::Absent)
        )
    }
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last known state of every bucket a reconciler has touched.
type StateTable = Arc<DashMap<String, ReconcileState>>;

/// Current state plus every state visited, for one operation on one bucket.
/// Each transition is also recorded in the shared [`StateTable`].
#[derive(Debug)]
struct StateTracker {
    bucket: String,
    history: Vec<ReconcileState>,
    table: StateTable,
}

impl StateTracker {
    fn new(bucket: &str, initial: ReconcileState, table: &StateTable) -> Self {
        table.insert(bucket.to_owned(), initial);
        Self {
            bucket: bucket.to_owned(),
            history: vec![initial],
            table: Arc::clone(table),
        }
    }

    fn current(&self) -> ReconcileState {
        self.history
            .last()
            .copied()
            .unwrap_or(ReconcileState::Absent)
    }

    fn advance(&mut self, next: ReconcileState) -> Result<(), ReconcileError> {
        let from = self.current();
        if !from.can_transition_to(next) {
            return Err(ReconcileError::InvalidTransition {
                bucket: self.bucket.clone(),
                from,
                to: next,
            });
        }
        debug!(bucket = %self.bucket, %from, to = %next, "state transition");
        self.table.insert(self.bucket.clone(), next);
        self.history.push(next);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ReconcileOutcome
// ---------------------------------------------------------------------------

/// Result of a successful [`BucketReconciler::ensure`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    /// Bucket name, generated when the desired configuration used a prefix.
    pub name: String,
    /// Bucket region.
    pub region: AwsRegion,
    /// Final state; always [`ReconcileState::Stable`].
    pub state: ReconcileState,
    /// Whether this call created the bucket.
    pub created: bool,
    /// Sub-resources changed, in application order.
    pub applied: Vec<SubResource>,
    /// The plan that was applied.
    pub plan: BucketPlan,
    /// Derived attributes.
    pub outputs: BucketOutputs,
    /// Every state visited.
    pub transitions: Vec<ReconcileState>,
}

// ---------------------------------------------------------------------------
// BucketReconciler
// ---------------------------------------------------------------------------

/// Drives buckets to their desired configuration through a [`BucketApi`].
///
/// One reconciler may serve many buckets concurrently. It remembers the last
/// state of each bucket it touched; clones share that record.
#[derive(Debug, Clone)]
pub struct BucketReconciler {
    api: Arc<dyn BucketApi>,
    config: ReconcilerConfig,
    lookup: Arc<dyn ReferenceLookup>,
    sets: SetReconciler,
    planner: Planner,
    default_region: AwsRegion,
    states: StateTable,
}

impl BucketReconciler {
    /// Create a reconciler with no reference bindings and the SHA-256 hasher.
    #[must_use]
    pub fn new(api: Arc<dyn BucketApi>, config: ReconcilerConfig) -> Self {
        let lookup: Arc<dyn ReferenceLookup> = Arc::new(NoReferences);
        let sets = SetReconciler::default();
        Self {
            api,
            config,
            planner: Planner::new(Arc::clone(&lookup), sets.clone()),
            lookup,
            sets,
            default_region: AwsRegion::default(),
            states: StateTable::default(),
        }
    }

    /// Resolve deferred references through `lookup`.
    #[must_use]
    pub fn with_references(mut self, lookup: Arc<dyn ReferenceLookup>) -> Self {
        self.lookup = lookup;
        self.planner = Planner::new(Arc::clone(&self.lookup), self.sets.clone());
        self
    }

    /// Fingerprint nested blocks with `hasher`.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn BlockHasher>) -> Self {
        self.sets = SetReconciler::new(hasher);
        self.planner = Planner::new(Arc::clone(&self.lookup), self.sets.clone());
        self
    }

    /// Region used when the desired configuration names none.
    #[must_use]
    pub fn with_default_region(mut self, region: AwsRegion) -> Self {
        self.default_region = region;
        self
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// The state `name` was left in by the last operation on it, if any.
    #[must_use]
    pub fn state(&self, name: &str) -> Option<ReconcileState> {
        self.states.get(name).map(|entry| *entry)
    }

    /// Starting state for an operation on a bucket that exists: `Failed` if
    /// the last attempt failed, `Stable` otherwise.
    fn settled_state(&self, name: &str) -> ReconcileState {
        match self.state(name) {
            Some(ReconcileState::Failed) => ReconcileState::Failed,
            _ => ReconcileState::Stable,
        }
    }

    /// The bucket name for `desired`: the explicit name, or a fresh one
    /// generated from the prefix.
    #[must_use]
    pub fn resolve_name(&self, desired: &DesiredConfiguration) -> String {
        match (&desired.name, &desired.name_prefix) {
            (Some(name), _) => name.clone(),
            (None, Some(prefix)) => generate_name(prefix),
            (None, None) => generate_name(&self.config.name_prefix),
        }
    }

    /// The region for `desired`.
    #[must_use]
    pub fn resolve_region(&self, desired: &DesiredConfiguration) -> AwsRegion {
        desired
            .region
            .clone()
            .unwrap_or_else(|| self.default_region.clone())
    }

    // -- ensure ---------------------------------------------------------------

    /// Create the bucket if needed and converge every sub-resource.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Validation`] or [`ReconcileError::Precondition`]
    ///   before any remote call.
    /// - [`ReconcileError::Conflict`] if the name belongs to someone else or
    ///   the bucket lives in another region.
    /// - [`ReconcileError::EventualConsistencyTimeout`] if a new bucket never
    ///   becomes visible.
    /// - [`ReconcileError::PartialConfigurationFailure`] listing every
    ///   sub-resource that failed; the others stay applied.
    pub async fn ensure(
        &self,
        desired: &DesiredConfiguration,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let name = self.resolve_name(desired);
        let region = self.resolve_region(desired);
        self.planner.preflight(&name, &region, desired)?;

        let retry = self.config.retry_policy();
        let existing = retry
            .run(operation::HEAD_BUCKET, &name, || self.api.head_bucket(&name))
            .await
            .map_err(|source| remote(&name, operation::HEAD_BUCKET, source))?;
        let fresh = existing.is_none();

        let (mut tracker, created) = match existing {
            Some(actual) if actual != region => {
                return Err(ReconcileError::Conflict {
                    bucket: name,
                    reason: format!("bucket exists in region {actual}, not {region}"),
                });
            }
            Some(_) => (self.tracker(&name, self.settled_state(&name)), false),
            None => {
                let mut tracker = self.tracker(&name, ReconcileState::Absent);
                tracker.advance(ReconcileState::Creating)?;
                match self.create(&name, &region, desired, &retry).await {
                    Ok(created) => (tracker, created),
                    Err(err) => {
                        tracker.advance(ReconcileState::Failed)?;
                        error!(bucket = %name, error = %err, "bucket creation failed");
                        return Err(err);
                    }
                }
            }
        };

        tracker.advance(ReconcileState::Converging)?;
        let (plan, applied) = match self.converge(&name, &region, desired, fresh).await {
            Ok(converged) => converged,
            Err(err) => {
                tracker.advance(ReconcileState::Failed)?;
                error!(bucket = %name, error = %err, "bucket did not converge");
                return Err(err);
            }
        };

        tracker.advance(ReconcileState::Stable)?;
        let identity = BucketIdentity::new(&name, region.clone());
        let outputs = domain::outputs(&identity, desired.website.is_some())?;
        info!(bucket = %name, created, changes = applied.len(), "bucket converged");

        Ok(ReconcileOutcome {
            name,
            region,
            state: tracker.current(),
            created,
            applied,
            plan,
            outputs,
            transitions: tracker.history,
        })
    }

    fn tracker(&self, name: &str, initial: ReconcileState) -> StateTracker {
        StateTracker::new(name, initial, &self.states)
    }

    /// Read, plan and apply.
    ///
    /// A bucket created by this call may still answer `NoSuchBucket` for a
    /// while, so for a `fresh` bucket that error is retried like a throttle.
    async fn converge(
        &self,
        name: &str,
        region: &AwsRegion,
        desired: &DesiredConfiguration,
        fresh: bool,
    ) -> Result<(BucketPlan, Vec<SubResource>), ReconcileError> {
        let transient: Transient = if fresh {
            ApiError::is_transient_after_create
        } else {
            ApiError::is_retryable
        };
        let observed = self.read_observed(name, region, transient).await?;
        let plan = self.planner.plan(name, desired, &observed)?;
        let (applied, failures) = self.apply(name, &plan, transient).await;

        if failures.is_empty() {
            Ok((plan, applied))
        } else {
            warn!(
                bucket = %name,
                failed = failures.len(),
                applied = applied.len(),
                "sub-resources failed to converge"
            );
            Err(ReconcileError::PartialConfigurationFailure {
                bucket: name.to_owned(),
                failures,
            })
        }
    }

    /// Issue the create and wait until the bucket is visible. Returns
    /// whether this call created it.
    async fn create(
        &self,
        name: &str,
        region: &AwsRegion,
        desired: &DesiredConfiguration,
        retry: &RetryPolicy,
    ) -> Result<bool, ReconcileError> {
        info!(bucket = %name, region = %region, "creating bucket");
        let created = match retry
            .run(operation::CREATE_BUCKET, name, || {
                self.api.create_bucket(name, region, desired.acl)
            })
            .await
        {
            Ok(()) => true,
            Err(ApiError::BucketAlreadyOwnedByYou { .. }) => {
                warn!(bucket = %name, "bucket already owned by caller, adopting it");
                false
            }
            Err(ApiError::BucketAlreadyExists { .. }) => {
                return Err(ReconcileError::Conflict {
                    bucket: name.to_owned(),
                    reason: "bucket name is already owned by another account".to_owned(),
                });
            }
            Err(source) => return Err(remote(name, operation::CREATE_BUCKET, source)),
        };

        self.config
            .existence_policy()
            .wait_until(operation::HEAD_BUCKET, name, "visible", || async {
                self.api.head_bucket(name).await.map(|r| r.is_some())
            })
            .await?;
        Ok(created)
    }

    /// Apply every change, continuing past failures. Replication is skipped
    /// when the versioning change before it failed.
    async fn apply(
        &self,
        name: &str,
        plan: &BucketPlan,
        transient: Transient,
    ) -> (Vec<SubResource>, Vec<SubResourceFailure>) {
        let retry = self.config.retry_policy();
        let mut applied = Vec::new();
        let mut failures: Vec<SubResourceFailure> = Vec::new();

        for change in &plan.changes {
            let sub_resource = change.sub_resource();
            let versioning_failed = failures
                .iter()
                .any(|f| f.sub_resource == SubResource::Versioning);
            if sub_resource == SubResource::Replication && versioning_failed {
                warn!(bucket = %name, "skipping replication because versioning failed");
                failures.push(SubResourceFailure {
                    sub_resource,
                    cause: FailureCause::Skipped("versioning was not applied".to_owned()),
                });
                continue;
            }

            let result = retry
                .run_when(change.operation(), name, transient, || self.send(name, change))
                .await;
            match result {
                Ok(()) => {
                    debug!(bucket = %name, %sub_resource, "applied");
                    applied.push(sub_resource);
                }
                Err(err) => {
                    warn!(bucket = %name, %sub_resource, error = %err, "sub-resource failed");
                    failures.push(SubResourceFailure {
                        sub_resource,
                        cause: FailureCause::Remote(err),
                    });
                }
            }
        }

        (applied, failures)
    }

    /// Issue the remote call for one change.
    async fn send(&self, name: &str, change: &Change) -> Result<(), ApiError> {
        let api = self.api.as_ref();
        match change {
            Change::PutAcl(acl) => api.put_acl(name, *acl).await,
            Change::PutVersioning(status) => api.put_versioning(name, *status).await,
            Change::PutLogging(logging) => api.put_logging(name, logging).await,
            Change::DeleteLogging => api.delete_logging(name).await,
            Change::PutLifecycle(rules) => api.put_lifecycle(name, rules).await,
            Change::DeleteLifecycle => api.delete_lifecycle(name).await,
            Change::PutCors(rules) => api.put_cors(name, rules).await,
            Change::DeleteCors => api.delete_cors(name).await,
            Change::PutEncryption(rules) => api.put_encryption(name, rules).await,
            Change::DeleteEncryption => api.delete_encryption(name).await,
            Change::PutWebsite(website) => api.put_website(name, website).await,
            Change::DeleteWebsite => api.delete_website(name).await,
            Change::PutAccelerate(status) => api.put_accelerate(name, *status).await,
            Change::PutRequestPayment(payer) => api.put_request_payment(name, *payer).await,
            Change::PutPolicy(policy) => api.put_policy(name, policy).await,
            Change::DeletePolicy => api.delete_policy(name).await,
            Change::PutTags(tags) => api.put_tags(name, tags).await,
            Change::DeleteTags => api.delete_tags(name).await,
            Change::PutReplication(replication) => api.put_replication(name, replication).await,
            Change::DeleteReplication => api.delete_replication(name).await,
        }
    }

    // -- read / plan ----------------------------------------------------------

    /// Read the bucket's current configuration.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::NotFound`] if the bucket does not exist.
    pub async fn read(&self, name: &str) -> Result<ObservedConfiguration, ReconcileError> {
        let region = self
            .config
            .retry_policy()
            .run(operation::HEAD_BUCKET, name, || self.api.head_bucket(name))
            .await
            .map_err(|source| remote(name, operation::HEAD_BUCKET, source))?
            .ok_or_else(|| ReconcileError::NotFound {
                bucket: name.to_owned(),
            })?;
        self.read_observed(name, &region, ApiError::is_retryable)
            .await
    }

    async fn read_observed(
        &self,
        name: &str,
        region: &AwsRegion,
        transient: Transient,
    ) -> Result<ObservedConfiguration, ReconcileError> {
        let reader = ConfigReader {
            retry: self.config.retry_policy(),
            bucket: name,
            transient,
        };
        let api = self.api.as_ref();

        let observed = ObservedConfiguration {
            name: name.to_owned(),
            region: region.clone(),
            acl: reader.get(operation::GET_ACL, || api.get_acl(name)).await?,
            versioning: reader
                .get(operation::GET_VERSIONING, || api.get_versioning(name))
                .await?,
            acceleration_status: reader
                .get(operation::GET_ACCELERATE, || api.get_accelerate(name))
                .await?,
            request_payer: reader
                .get(operation::GET_REQUEST_PAYMENT, || api.get_request_payment(name))
                .await?,
            policy: reader.get(operation::GET_POLICY, || api.get_policy(name)).await?,
            logging: reader.get(operation::GET_LOGGING, || api.get_logging(name)).await?,
            cors_rules: reader.get(operation::GET_CORS, || api.get_cors(name)).await?,
            lifecycle_rules: reader
                .get(operation::GET_LIFECYCLE, || api.get_lifecycle(name))
                .await?,
            replication: reader
                .get(operation::GET_REPLICATION, || api.get_replication(name))
                .await?,
            encryption_rules: reader
                .get(operation::GET_ENCRYPTION, || api.get_encryption(name))
                .await?,
            website: reader.get(operation::GET_WEBSITE, || api.get_website(name)).await?,
            tags: reader.get(operation::GET_TAGS, || api.get_tags(name)).await?,
        };
        debug!(bucket = %name, "read bucket configuration");
        Ok(observed)
    }

    /// Compute the plan for `desired` without calling the remote. A missing
    /// `observed` stands for a bucket about to be created.
    ///
    /// # Errors
    ///
    /// Validation and precondition failures.
    pub fn plan(
        &self,
        desired: &DesiredConfiguration,
        observed: Option<&ObservedConfiguration>,
    ) -> Result<BucketPlan, ReconcileError> {
        let name = observed.map_or_else(|| self.resolve_name(desired), |o| o.name.clone());
        let region = self.resolve_region(desired);
        validate_bucket_name(&name, &region)?;
        match observed {
            Some(observed) => self.planner.plan(&name, desired, observed),
            None => {
                let fresh = ObservedConfiguration {
                    acl: Some(desired.acl),
                    ..ObservedConfiguration::empty(&name, region)
                };
                self.planner.plan(&name, desired, &fresh)
            }
        }
    }

    // -- destroy --------------------------------------------------------------

    /// Delete the bucket within the configured drain deadline.
    ///
    /// # Errors
    ///
    /// See [`BucketReconciler::destroy_with_deadline`].
    pub async fn destroy(&self, name: &str, force_destroy: bool) -> Result<(), ReconcileError> {
        self.destroy_with_deadline(name, force_destroy, self.config.drain_timeout())
            .await
    }

    /// Delete the bucket. With `force_destroy`, every object and version is
    /// removed first, bounded by `deadline`. A bucket that is already gone
    /// counts as deleted.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Timeout`] if draining outlives `deadline`; objects
    ///   deleted so far stay deleted.
    /// - [`ReconcileError::Conflict`] if the bucket is not empty and
    ///   `force_destroy` is off.
    pub async fn destroy_with_deadline(
        &self,
        name: &str,
        force_destroy: bool,
        deadline: Duration,
    ) -> Result<(), ReconcileError> {
        let mut tracker = self.tracker(name, self.settled_state(name));
        tracker.advance(ReconcileState::Deleting)?;
        let retry = self.config.retry_policy();

        if force_destroy {
            match tokio::time::timeout(deadline, self.drain(name, &retry)).await {
                Err(_) => {
                    warn!(bucket = %name, ?deadline, "drain deadline expired");
                    return Err(ReconcileError::Timeout {
                        bucket: name.to_owned(),
                        deadline,
                    });
                }
                Ok(Err(err)) if err.is_not_found() => {
                    debug!(bucket = %name, "bucket vanished while draining");
                    tracker.advance(ReconcileState::Absent)?;
                    return Ok(());
                }
                Ok(Err(source)) => return Err(remote(name, operation::DELETE_OBJECTS, source)),
                Ok(Ok(deleted)) => info!(bucket = %name, deleted, "bucket drained"),
            }
        }

        match retry
            .run(operation::DELETE_BUCKET, name, || self.api.delete_bucket(name))
            .await
        {
            Ok(()) => info!(bucket = %name, "bucket deleted"),
            Err(ApiError::NoSuchBucket { .. }) => debug!(bucket = %name, "bucket already absent"),
            Err(ApiError::BucketNotEmpty { .. }) => {
                return Err(ReconcileError::Conflict {
                    bucket: name.to_owned(),
                    reason: "bucket is not empty; enable forceDestroy to delete its objects first"
                        .to_owned(),
                });
            }
            Err(source) => return Err(remote(name, operation::DELETE_BUCKET, source)),
        }
        tracker.advance(ReconcileState::Absent)?;
        Ok(())
    }

    /// Delete objects in batches until the bucket is empty. Returns how many
    /// were deleted.
    async fn drain(&self, name: &str, retry: &RetryPolicy) -> Result<usize, ApiError> {
        let batch = self.config.drain_batch_size.max(1);
        let mut total = 0;
        loop {
            let deleted = retry
                .run(operation::DELETE_OBJECTS, name, || {
                    self.api.delete_object_batch(name, batch)
                })
                .await?;
            if deleted == 0 {
                return Ok(total);
            }
            total += deleted;
            debug!(bucket = %name, deleted, total, "deleted object batch");
        }
    }
}

fn remote(bucket: &str, operation: &'static str, source: ApiError) -> ReconcileError {
    if source.is_not_found() {
        ReconcileError::NotFound {
            bucket: bucket.to_owned(),
        }
    } else {
        ReconcileError::Remote {
            bucket: bucket.to_owned(),
            operation,
            source,
        }
    }
}

/// Decides which remote errors are worth another attempt.
type Transient = fn(&ApiError) -> bool;

/// Reads configuration sub-resources of one bucket under one retry rule.
struct ConfigReader<'a> {
    retry: RetryPolicy,
    bucket: &'a str,
    transient: Transient,
}

impl ConfigReader<'_> {
    /// Run one read. A `NoSuchBucket` that outlasts the retry budget while
    /// it counts as transient means the bucket never became readable.
    async fn get<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, ReconcileError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let bucket = self.bucket;
        self.retry
            .run_when(operation, bucket, self.transient, call)
            .await
            .map_err(|source| {
                if source.is_not_found() && (self.transient)(&source) {
                    warn!(bucket, operation, "bucket still not readable after create");
                    ReconcileError::EventualConsistencyTimeout {
                        bucket: bucket.to_owned(),
                        expectation: "readable".to_owned(),
                        attempts: self.retry.max_attempts(),
                    }
                } else {
                    remote(bucket, operation, source)
                }
            })
    }
}
