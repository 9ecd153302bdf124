//! Bucket configuration model for bucketctl.
//!
//! Every configurable sub-resource of a bucket is expressed as a closed,
//! serde-serializable type. Collections that have no natural order (CORS
//! rules, lifecycle rules, replication rules, encryption rules) are kept as
//! plain vectors here; identity and ordering are decided later by content
//! hashing in the engine.
//!
//! Replication rules exist in two shapes: the raw [`ReplicationRuleSpec`]
//! accepting both the legacy prefix schema and the filter schema, and the
//! canonical [`ReplicationRule`] with a single [`ReplicationSelector`].

pub mod bucket;
pub mod cors;
pub mod error;
pub mod lifecycle;
pub mod reference;
pub mod replication;
pub mod types;
pub mod website;

pub use bucket::{
    BucketIdentity, BucketOutputs, DesiredConfiguration, EncryptionRule, LoggingConfig,
    ObservedConfiguration,
};
pub use cors::CorsRule;
pub use error::ModelError;
pub use lifecycle::{
    LifecycleExpiration, LifecycleRule, NoncurrentVersionExpiration, NoncurrentVersionTransition,
    Transition,
};
pub use reference::{Deferred, NoReferences, ReferenceLookup, ResourceRef};
pub use replication::{
    AccessControlTranslation, DestinationSpec, ReplicationAndOperator,
    ReplicationConfiguration, ReplicationConfigurationSpec, ReplicationDestination,
    ReplicationFilterSpec, ReplicationRule, ReplicationRuleSpec, ReplicationSchema,
    ReplicationSelector, SourceSelectionCriteria, Tag,
};
pub use types::{
    AccelerateStatus, CannedAcl, OwnerOverride, Payer, Protocol, RuleStatus, SseAlgorithm,
    StorageClass, VersioningStatus,
};
pub use website::{Condition, Redirect, RedirectAllRequestsTo, RoutingRule, WebsiteConfiguration};
