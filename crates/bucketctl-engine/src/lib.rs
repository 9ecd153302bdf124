//! Reconciliation engine for declaratively managed buckets.
//!
//! The engine takes a [`DesiredConfiguration`](bucketctl_model::DesiredConfiguration),
//! reads the remote bucket through a [`BucketApi`], and converges one
//! sub-resource at a time. The pieces, bottom-up:
//!
//! - [`naming`]: bucket name rules, which differ between the legacy default
//!   region and everywhere else.
//! - [`domain`]: derived DNS names, ARNs and website endpoints.
//! - [`canonical`]: order-independent encoding and fingerprinting of
//!   nested configuration blocks.
//! - [`set`]: content-addressed diffing of unordered block collections.
//! - [`replication`]: unification of the legacy and filter replication
//!   schemas into one canonical form.
//! - [`plan`]: the per-sub-resource change list for one bucket.
//! - [`reconciler`]: the create/converge/delete state machine.
//!
//! [`MemoryBucketApi`] is a complete in-memory remote with fault injection,
//! used by the tests and by the CLI's `simulate` command.

pub mod api;
pub mod canonical;
pub mod config;
pub mod domain;
pub mod error;
pub mod memory;
pub mod naming;
pub mod plan;
pub mod reconciler;
pub mod replication;
pub mod retry;
pub mod set;
pub mod validate;

pub use api::BucketApi;
pub use canonical::{BlockHasher, BlockKey, Canonical, CanonicalForm, Sha256BlockHasher};
pub use config::ReconcilerConfig;
pub use error::{ApiError, FailureCause, ReconcileError, SubResourceFailure, ValidationError};
pub use memory::{ApiCall, MemoryBucketApi};
pub use plan::{BlockDiffSummary, BucketPlan, Change, Planner, SubResource};
pub use reconciler::{BucketReconciler, ReconcileOutcome, ReconcileState};
pub use replication::{ReplicationNormalizer, ReplicationPlan};
pub use retry::RetryPolicy;
pub use set::{BlockChange, KeyedBlock, SetPlan, SetReconciler};
