//! Replication configuration normalization.
//!
//! Replication rules arrive in one of two schemas:
//!
//! - **Legacy**: a bare `prefix`, no `filter`. Normalized to a prefix
//!   selector with priority 0 and delete-marker replication disabled.
//! - **Filter**: a `filter` block with a prefix, tags, or an `and`
//!   conjunction, plus explicit priority and delete-marker control.
//!   A prefix-only filter becomes a prefix selector; anything with tags,
//!   or an `and` block, becomes a tag-and selector with tags sorted by key.
//!
//! Deferred references (destination bucket, account, replica KMS key, role)
//! are resolved before canonicalization, so a rule written with a reference
//! compares equal to the same rule written with the resolved value.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use bucketctl_core::AccountId;
use bucketctl_model::{
    AccessControlTranslation, Deferred, DestinationSpec, ReferenceLookup,
    ReplicationAndOperator, ReplicationConfiguration, ReplicationConfigurationSpec,
    ReplicationDestination, ReplicationFilterSpec, ReplicationRule, ReplicationRuleSpec,
    ReplicationSchema, ReplicationSelector, ResourceRef, RuleStatus, SourceSelectionCriteria, Tag,
};
use serde::Serialize;
use tracing::debug;

use crate::canonical::content_id;
use crate::error::{ReconcileError, ValidationError};
use crate::set::{SetPlan, SetReconciler};

/// Reported when replication is requested without versioning.
pub const VERSIONING_REQUIRED: &str = "versioning must be enabled to allow S3 bucket replication";

/// Prefix of content-derived replication rule ids.
const RULE_ID_PREFIX: &str = "tf-s3-replication-";

/// Maximum length of a replication rule id.
const MAX_RULE_ID_LEN: usize = 255;

/// Difference between a desired and an observed replication configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationPlan {
    /// Whether the replication role changes.
    pub role_changed: bool,
    /// Rule-level diff.
    pub rules: SetPlan<ReplicationRule>,
}

impl ReplicationPlan {
    /// Whether nothing changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.role_changed && self.rules.is_empty()
    }
}

/// Normalizes and compares replication configurations.
#[derive(Debug, Clone)]
pub struct ReplicationNormalizer {
    lookup: Arc<dyn ReferenceLookup>,
    sets: SetReconciler,
}

impl ReplicationNormalizer {
    /// Create a normalizer resolving references through `lookup`.
    #[must_use]
    pub fn new(lookup: Arc<dyn ReferenceLookup>, sets: SetReconciler) -> Self {
        Self { lookup, sets }
    }

    /// Fail unless versioning is enabled on the bucket.
    pub fn check_precondition(
        bucket: &str,
        versioning_enabled: bool,
    ) -> Result<(), ReconcileError> {
        if versioning_enabled {
            Ok(())
        } else {
            Err(ReconcileError::Precondition {
                bucket: bucket.to_owned(),
                message: VERSIONING_REQUIRED.to_owned(),
            })
        }
    }

    /// Check the raw configuration for shape errors that do not depend on
    /// reference resolution.
    pub fn validate(spec: &ReplicationConfigurationSpec) -> Result<(), ValidationError> {
        let mut reasons = Vec::new();

        if spec.rules.is_empty() {
            reasons.push("at least one replication rule is required".to_owned());
        }
        let filter_rules = spec.rules.iter().filter(|r| r.is_filter_schema()).count();
        if filter_rules > 0 && filter_rules < spec.rules.len() {
            reasons.push(
                "rules using a filter cannot be mixed with rules using a bare prefix".to_owned(),
            );
        }

        let mut ids = HashSet::new();
        let mut priorities = HashSet::new();
        for (index, rule) in spec.rules.iter().enumerate() {
            let label = rule
                .id
                .clone()
                .unwrap_or_else(|| format!("#{}", index + 1));
            if let Some(id) = rule.id.as_deref() {
                if id.len() > MAX_RULE_ID_LEN {
                    reasons.push(format!(
                        "rule {label}: id must be at most {MAX_RULE_ID_LEN} characters"
                    ));
                }
                if !ids.insert(id) {
                    reasons.push(format!("rule {label}: duplicate rule id"));
                }
            }
            if rule.is_filter_schema() {
                if rule.prefix.is_some() {
                    reasons.push(format!("rule {label}: prefix must be set inside the filter"));
                }
                if !priorities.insert(rule.priority.unwrap_or(0)) {
                    reasons.push(format!(
                        "rule {label}: priority must be unique among filter rules"
                    ));
                }
            } else {
                if rule.priority.is_some() {
                    reasons.push(format!("rule {label}: priority requires a filter"));
                }
                if rule.delete_marker_replication.is_some() {
                    reasons.push(format!(
                        "rule {label}: delete marker replication requires a filter"
                    ));
                }
            }
            let destination = &rule.destination;
            if let Some(account) = destination.account.as_ref().and_then(Deferred::known) {
                if let Err(err) = AccountId::new(account) {
                    reasons.push(format!("rule {label}: destination {err}"));
                }
            }
            if destination.access_control_translation.is_some() && destination.account.is_none() {
                reasons.push(format!(
                    "rule {label}: access control translation requires a destination account"
                ));
            }
            let kms_only = rule
                .source_selection_criteria
                .is_some_and(|c| c.sse_kms_encrypted_objects);
            if destination.replica_kms_key_id.is_some() && !kms_only {
                reasons.push(format!(
                    "rule {label}: a replica KMS key requires SSE-KMS encrypted source selection"
                ));
            }
        }

        ValidationError::check("replication configuration", reasons)
    }

    /// Normalize a raw configuration into canonical form.
    ///
    /// Every unresolved reference is reported in one error.
    pub fn normalize(
        &self,
        spec: &ReplicationConfigurationSpec,
    ) -> Result<ReplicationConfiguration, ValidationError> {
        let mut unresolved = Vec::new();
        let role = self.resolve(&spec.role, &mut unresolved);

        let mut rules = Vec::with_capacity(spec.rules.len());
        for rule in &spec.rules {
            rules.push(self.normalize_rule(rule, &mut unresolved));
        }

        let reasons: Vec<String> = unresolved
            .into_iter()
            .map(|r| format!("unresolved reference ${{{r}}}"))
            .collect();
        ValidationError::check("replication configuration", reasons)?;

        let schema = if spec.rules.iter().any(ReplicationRuleSpec::is_filter_schema) {
            ReplicationSchema::Filter
        } else {
            ReplicationSchema::Legacy
        };
        debug!(rules = rules.len(), ?schema, "normalized replication configuration");
        Ok(ReplicationConfiguration {
            role,
            rules,
            schema,
        })
    }

    /// Diff two canonical configurations.
    #[must_use]
    pub fn compare(
        &self,
        desired: &ReplicationConfiguration,
        observed: Option<&ReplicationConfiguration>,
    ) -> ReplicationPlan {
        let observed_rules = observed.map_or(&[][..], |o| o.rules.as_slice());
        ReplicationPlan {
            role_changed: observed.is_none_or(|o| o.role != desired.role),
            rules: self.sets.diff(&desired.rules, observed_rules),
        }
    }

    fn resolve(&self, value: &Deferred, unresolved: &mut Vec<ResourceRef>) -> String {
        value.resolve(self.lookup.as_ref()).unwrap_or_else(|r| {
            unresolved.push(r);
            String::new()
        })
    }

    fn resolve_opt(
        &self,
        value: Option<&Deferred>,
        unresolved: &mut Vec<ResourceRef>,
    ) -> Option<String> {
        value
            .map(|v| self.resolve(v, unresolved))
            .filter(|v| !v.is_empty())
    }

    fn normalize_rule(
        &self,
        rule: &ReplicationRuleSpec,
        unresolved: &mut Vec<ResourceRef>,
    ) -> ReplicationRule {
        let (selector, priority, delete_marker_replication) = match &rule.filter {
            None => (
                ReplicationSelector::Prefix {
                    prefix: rule.prefix.clone().unwrap_or_default(),
                },
                0,
                RuleStatus::Disabled,
            ),
            Some(filter) => (
                selector_from_filter(filter),
                rule.priority.unwrap_or(0),
                rule.delete_marker_replication.unwrap_or_default(),
            ),
        };

        let destination = ReplicationDestination {
            bucket: self.resolve(&rule.destination.bucket, unresolved),
            storage_class: rule.destination.storage_class,
            account: self.resolve_opt(rule.destination.account.as_ref(), unresolved),
            encryption_key: self
                .resolve_opt(rule.destination.replica_kms_key_id.as_ref(), unresolved),
            owner_override: rule.destination.access_control_translation.map(|t| t.owner),
        };

        let mut normalized = ReplicationRule {
            id: String::new(),
            status: rule.status,
            priority,
            selector,
            destination,
            sse_kms_encrypted_objects_only: rule
                .source_selection_criteria
                .is_some_and(|c| c.sse_kms_encrypted_objects),
            delete_marker_replication,
        };
        normalized.id = match rule.id.as_deref() {
            Some(id) if !id.is_empty() => id.to_owned(),
            _ => content_id(RULE_ID_PREFIX, &normalized, self.sets.hasher()),
        };
        normalized
    }
}

fn selector_from_filter(filter: &ReplicationFilterSpec) -> ReplicationSelector {
    let mut tags: BTreeMap<String, String> = filter.tags.clone();
    if let Some(tag) = &filter.tag {
        tags.insert(tag.key.clone(), tag.value.clone());
    }
    match &filter.and {
        Some(and) => {
            for tag in &and.tags {
                tags.insert(tag.key.clone(), tag.value.clone());
            }
            ReplicationSelector::TagAnd {
                prefix: and
                    .prefix
                    .clone()
                    .or_else(|| filter.prefix.clone())
                    .unwrap_or_default(),
                tags,
            }
        }
        None if !tags.is_empty() => ReplicationSelector::TagAnd {
            prefix: filter.prefix.clone().unwrap_or_default(),
            tags,
        },
        None => ReplicationSelector::Prefix {
            prefix: filter.prefix.clone().unwrap_or_default(),
        },
    }
}

/// Render a canonical configuration in the wire shape of its schema.
#[must_use]
pub fn to_spec(config: &ReplicationConfiguration) -> ReplicationConfigurationSpec {
    let rules = config
        .rules
        .iter()
        .map(|rule| rule_to_spec(rule, config.schema))
        .collect();
    ReplicationConfigurationSpec {
        role: Deferred::value(config.role.clone()),
        rules,
    }
}

fn rule_to_spec(rule: &ReplicationRule, schema: ReplicationSchema) -> ReplicationRuleSpec {
    let destination = DestinationSpec {
        bucket: Deferred::value(rule.destination.bucket.clone()),
        storage_class: rule.destination.storage_class,
        account: rule.destination.account.clone().map(Deferred::Value),
        replica_kms_key_id: rule.destination.encryption_key.clone().map(Deferred::Value),
        access_control_translation: rule
            .destination
            .owner_override
            .map(|owner| AccessControlTranslation { owner }),
    };
    let source_selection_criteria =
        rule.sse_kms_encrypted_objects_only
            .then_some(SourceSelectionCriteria {
                sse_kms_encrypted_objects: true,
            });

    match schema {
        ReplicationSchema::Legacy => ReplicationRuleSpec {
            id: Some(rule.id.clone()),
            prefix: Some(rule.selector.prefix().to_owned()),
            status: rule.status,
            priority: None,
            filter: None,
            destination,
            source_selection_criteria,
            delete_marker_replication: None,
        },
        ReplicationSchema::Filter => ReplicationRuleSpec {
            id: Some(rule.id.clone()),
            prefix: None,
            status: rule.status,
            priority: Some(rule.priority),
            filter: Some(filter_for(&rule.selector)),
            destination,
            source_selection_criteria,
            delete_marker_replication: Some(rule.delete_marker_replication),
        },
    }
}

fn filter_for(selector: &ReplicationSelector) -> ReplicationFilterSpec {
    match selector {
        ReplicationSelector::Prefix { prefix } => ReplicationFilterSpec {
            prefix: Some(prefix.clone()),
            ..ReplicationFilterSpec::default()
        },
        ReplicationSelector::TagAnd { prefix, tags } if prefix.is_empty() && tags.len() == 1 => {
            ReplicationFilterSpec {
                tag: tags.iter().next().map(|(k, v)| Tag::new(k, v)),
                ..ReplicationFilterSpec::default()
            }
        }
        ReplicationSelector::TagAnd { prefix, tags } => ReplicationFilterSpec {
            and: Some(ReplicationAndOperator {
                prefix: Some(prefix.clone()),
                tags: tags.iter().map(|(k, v)| Tag::new(k, v)).collect(),
            }),
            ..ReplicationFilterSpec::default()
        },
    }
}
