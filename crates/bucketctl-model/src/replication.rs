//! Cross-region replication configuration.
//!
//! The raw [`ReplicationConfigurationSpec`] accepts both rule schemas as
//! they are written or read back from the remote. The engine normalizes it
//! into a [`ReplicationConfiguration`] whose rules carry exactly one
//! [`ReplicationSelector`], which is the form that gets diffed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::reference::Deferred;
use crate::types::{OwnerOverride, RuleStatus, StorageClass};

// ---------------------------------------------------------------------------
// Raw form
// ---------------------------------------------------------------------------

/// Replication configuration as declared or as read from the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfigurationSpec {
    /// IAM role assumed for replication.
    pub role: Deferred,
    /// Replication rules, in no particular order.
    pub rules: Vec<ReplicationRuleSpec>,
}

/// A replication rule in either the legacy or the filter schema.
///
/// A rule with a `filter` is a filter-schema rule. A rule without one is a
/// legacy rule, whose bare `prefix` defaults to the empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationRuleSpec {
    /// Rule identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Legacy key prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Whether the rule is active.
    pub status: RuleStatus,
    /// Precedence among overlapping filter-schema rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Filter-schema predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ReplicationFilterSpec>,
    /// Where replicas go.
    pub destination: DestinationSpec,
    /// Which encrypted source objects are eligible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_selection_criteria: Option<SourceSelectionCriteria>,
    /// Whether delete markers replicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_marker_replication: Option<RuleStatus>,
}

impl ReplicationRuleSpec {
    /// Whether the rule uses the filter schema.
    #[must_use]
    pub fn is_filter_schema(&self) -> bool {
        self.filter.is_some()
    }
}

/// Filter-schema predicate.
///
/// Declared configurations may use `prefix` and `tags` directly; the remote
/// reports compound predicates through `and`, and single-tag predicates
/// through `tag`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationFilterSpec {
    /// Key prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// A single tag predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
    /// Tag predicates as a map.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Conjunction of a prefix and tags.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and: Option<ReplicationAndOperator>,
}

/// Conjunction of a prefix and tag predicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationAndOperator {
    /// Key prefix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Tags, in the order they were written or returned.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// A single object tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Create a tag.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Destination as declared, possibly with deferred values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationSpec {
    /// Destination bucket ARN.
    pub bucket: Deferred,
    /// Storage class for replicas; the source class when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<StorageClass>,
    /// Destination account.
    #[serde(default, alias = "accountId", skip_serializing_if = "Option::is_none")]
    pub account: Option<Deferred>,
    /// KMS key used to encrypt replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica_kms_key_id: Option<Deferred>,
    /// Replica ownership override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_control_translation: Option<AccessControlTranslation>,
}

impl DestinationSpec {
    /// A destination with only a bucket.
    #[must_use]
    pub fn bucket(bucket: impl Into<Deferred>) -> Self {
        Self {
            bucket: bucket.into(),
            storage_class: None,
            account: None,
            replica_kms_key_id: None,
            access_control_translation: None,
        }
    }
}

/// Replica ownership translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlTranslation {
    /// New owner of replicas.
    pub owner: OwnerOverride,
}

/// Source object selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSelectionCriteria {
    /// Replicate only objects encrypted with SSE-KMS.
    #[serde(default)]
    pub sse_kms_encrypted_objects: bool,
}

// ---------------------------------------------------------------------------
// Canonical form
// ---------------------------------------------------------------------------

/// Replication configuration with every rule normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationConfiguration {
    /// Resolved IAM role ARN.
    pub role: String,
    /// Canonical rules.
    pub rules: Vec<ReplicationRule>,
    /// Schema the rules were written in. Not part of comparison.
    #[serde(default)]
    pub schema: ReplicationSchema,
}

impl PartialEq for ReplicationConfiguration {
    fn eq(&self, other: &Self) -> bool {
        self.role == other.role && self.rules == other.rules
    }
}

impl Eq for ReplicationConfiguration {}

/// Which schema a replication configuration is written in.
///
/// Only used to write rules back in the shape the remote expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplicationSchema {
    /// Bare prefix, no priority.
    #[default]
    Legacy,
    /// Filter predicate with priority and delete-marker control.
    Filter,
}

/// A canonical replication rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationRule {
    /// Rule identifier.
    pub id: String,
    /// Whether the rule is active.
    pub status: RuleStatus,
    /// Precedence; 0 for legacy rules.
    pub priority: i32,
    /// Which objects the rule matches.
    pub selector: ReplicationSelector,
    /// Where replicas go.
    pub destination: ReplicationDestination,
    /// Replicate only SSE-KMS encrypted objects.
    pub sse_kms_encrypted_objects_only: bool,
    /// Whether delete markers replicate.
    pub delete_marker_replication: RuleStatus,
}

/// Object selector of a canonical rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ReplicationSelector {
    /// Match by key prefix only.
    Prefix {
        /// Key prefix, possibly empty.
        prefix: String,
    },
    /// Match by key prefix and every listed tag.
    TagAnd {
        /// Key prefix, possibly empty.
        prefix: String,
        /// Required tags, ordered by key.
        tags: BTreeMap<String, String>,
    },
}

impl ReplicationSelector {
    /// The key prefix of either selector shape.
    #[must_use]
    pub fn prefix(&self) -> &str {
        match self {
            Self::Prefix { prefix } | Self::TagAnd { prefix, .. } => prefix,
        }
    }
}

/// A resolved replication destination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationDestination {
    /// Destination bucket ARN.
    pub bucket: String,
    /// Storage class for replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<StorageClass>,
    /// Destination account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// KMS key ARN used for replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
    /// Replica ownership override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_override: Option<OwnerOverride>,
}
