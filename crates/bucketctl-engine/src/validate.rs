//! Shape validation of a desired configuration.
//!
//! Runs before any remote call. Every problem across every sub-resource is
//! collected into a single [`ValidationError`].

use std::collections::{BTreeMap, HashSet};

use bucketctl_model::{
    CorsRule, DesiredConfiguration, EncryptionRule, LifecycleRule, SseAlgorithm,
    WebsiteConfiguration,
};

use crate::error::ValidationError;
use crate::replication::ReplicationNormalizer;

/// Maximum number of tags on a bucket.
const MAX_TAGS: usize = 50;

/// Maximum length of a tag key in characters.
const MAX_TAG_KEY_LEN: usize = 128;

/// Maximum length of a tag value in characters.
const MAX_TAG_VALUE_LEN: usize = 256;

/// Maximum number of lifecycle rules.
const MAX_LIFECYCLE_RULES: usize = 1_000;

/// Maximum number of CORS rules.
const MAX_CORS_RULES: usize = 100;

/// Maximum length of a lifecycle rule id.
const MAX_RULE_ID_LEN: usize = 255;

/// Validate everything about a desired configuration except its name.
pub fn validate_configuration(desired: &DesiredConfiguration) -> Result<(), ValidationError> {
    let mut reasons = Vec::new();

    if desired.name.is_some() && desired.name_prefix.is_some() {
        reasons.push("name and namePrefix are mutually exclusive".to_owned());
    }
    if let Some(logging) = &desired.logging {
        if logging.target_bucket.known() == Some("") {
            reasons.push("logging: target bucket must not be empty".to_owned());
        }
    }
    if let Some(policy) = desired.policy.as_deref() {
        if let Err(reason) = check_policy(policy) {
            reasons.push(format!("policy: {reason}"));
        }
    }
    tag_violations(&desired.tags, &mut reasons);
    cors_violations(&desired.cors_rules, &mut reasons);
    lifecycle_violations(&desired.lifecycle_rules, &mut reasons);
    encryption_violations(&desired.encryption_rules, &mut reasons);
    if let Some(website) = &desired.website {
        website_violations(website, &mut reasons);
    }
    if let Some(replication) = &desired.replication {
        if let Err(err) = ReplicationNormalizer::validate(replication) {
            reasons.extend(err.reasons.into_iter().map(|r| format!("replication: {r}")));
        }
    }

    ValidationError::check("bucket configuration", reasons)
}

/// Check a policy document. An empty document means "delete the policy"
/// and is accepted.
pub fn check_policy(policy: &str) -> Result<(), String> {
    if policy.is_empty() {
        return Ok(());
    }
    match serde_json::from_str::<serde_json::Value>(policy) {
        Ok(serde_json::Value::Object(_)) => Ok(()),
        Ok(_) => Err("document must be a JSON object".to_owned()),
        Err(e) => Err(format!("document is not valid JSON: {e}")),
    }
}

fn tag_violations(tags: &BTreeMap<String, String>, reasons: &mut Vec<String>) {
    if tags.len() > MAX_TAGS {
        reasons.push(format!(
            "tags: at most {MAX_TAGS} tags are allowed, got {}",
            tags.len()
        ));
    }
    for (key, value) in tags {
        let key_len = key.chars().count();
        if key_len == 0 || key_len > MAX_TAG_KEY_LEN {
            reasons.push(format!(
                "tags: key {key:?} must be between 1 and {MAX_TAG_KEY_LEN} characters"
            ));
        }
        if key.starts_with("aws:") {
            reasons.push(format!("tags: key {key:?} uses the reserved aws: prefix"));
        }
        if value.chars().count() > MAX_TAG_VALUE_LEN {
            reasons.push(format!(
                "tags: value of {key:?} must be at most {MAX_TAG_VALUE_LEN} characters"
            ));
        }
    }
}

fn cors_violations(rules: &[CorsRule], reasons: &mut Vec<String>) {
    if rules.len() > MAX_CORS_RULES {
        reasons.push(format!("cors: at most {MAX_CORS_RULES} rules are allowed"));
    }
    for (index, rule) in rules.iter().enumerate() {
        let label = format!("cors rule #{}", index + 1);
        if rule.allowed_methods.is_empty() {
            reasons.push(format!("{label}: at least one allowed method is required"));
        }
        for method in &rule.allowed_methods {
            if !CorsRule::METHODS.contains(&method.as_str()) {
                reasons.push(format!("{label}: unsupported method {method:?}"));
            }
        }
        if rule.allowed_origins.is_empty() {
            reasons.push(format!("{label}: at least one allowed origin is required"));
        }
        if rule.max_age_seconds.is_some_and(|s| s < 0) {
            reasons.push(format!("{label}: max age must not be negative"));
        }
    }
}

fn lifecycle_violations(rules: &[LifecycleRule], reasons: &mut Vec<String>) {
    if rules.len() > MAX_LIFECYCLE_RULES {
        reasons.push(format!(
            "lifecycle: at most {MAX_LIFECYCLE_RULES} rules are allowed"
        ));
    }
    let mut ids = HashSet::new();
    for (index, rule) in rules.iter().enumerate() {
        let label = match rule.id.as_deref() {
            Some(id) if !id.is_empty() => format!("lifecycle rule {id:?}"),
            _ => format!("lifecycle rule #{}", index + 1),
        };
        if let Some(id) = rule.id.as_deref().filter(|id| !id.is_empty()) {
            if id.len() > MAX_RULE_ID_LEN {
                reasons.push(format!("{label}: id must be at most {MAX_RULE_ID_LEN} characters"));
            }
            if !ids.insert(id) {
                reasons.push(format!("{label}: duplicate rule id"));
            }
        }
        if !rule.has_action() {
            reasons.push(format!("{label}: at least one action is required"));
        }
        if let Some(expiration) = &rule.expiration {
            if expiration.set_field_count() != 1 {
                reasons.push(format!(
                    "{label}: expiration must set exactly one of days, date, \
                     or expiredObjectDeleteMarker"
                ));
            }
            if expiration.days.is_some_and(|d| d <= 0) {
                reasons.push(format!("{label}: expiration days must be positive"));
            }
        }
        for transition in &rule.transitions {
            match (transition.days, transition.date) {
                (Some(_), Some(_)) => reasons.push(format!(
                    "{label}: a transition sets either days or date, not both"
                )),
                (None, None) => reasons.push(format!(
                    "{label}: a transition requires days or date"
                )),
                (Some(d), None) if d < 0 => {
                    reasons.push(format!("{label}: transition days must not be negative"));
                }
                _ => {}
            }
        }
        if rule.noncurrent_version_expiration.is_some_and(|e| e.days <= 0) {
            reasons.push(format!("{label}: noncurrent version expiration days must be positive"));
        }
        if rule.noncurrent_version_transitions.iter().any(|t| t.days < 0) {
            reasons.push(format!(
                "{label}: noncurrent version transition days must not be negative"
            ));
        }
        if rule.abort_incomplete_multipart_upload_days.is_some_and(|d| d <= 0) {
            reasons.push(format!(
                "{label}: abort incomplete multipart upload days must be positive"
            ));
        }
    }
}

fn encryption_violations(rules: &[EncryptionRule], reasons: &mut Vec<String>) {
    if rules.len() > 1 {
        reasons.push("encryption: at most one rule is allowed".to_owned());
    }
    for rule in rules {
        if rule.kms_master_key_id.is_some() && rule.sse_algorithm != SseAlgorithm::AwsKms {
            reasons.push(format!(
                "encryption: a KMS master key is only allowed with {}, not {}",
                SseAlgorithm::AwsKms,
                rule.sse_algorithm
            ));
        }
    }
}

fn website_violations(website: &WebsiteConfiguration, reasons: &mut Vec<String>) {
    let index = website.index_document.as_deref().filter(|s| !s.is_empty());
    match &website.redirect_all_requests_to {
        Some(redirect) => {
            if index.is_some()
                || website.error_document.as_deref().is_some_and(|s| !s.is_empty())
                || !website.routing_rules.is_empty()
            {
                reasons.push(
                    "website: redirectAllRequestsTo cannot be combined with documents \
                     or routing rules"
                        .to_owned(),
                );
            }
            if redirect.host_name.is_empty() {
                reasons.push("website: redirect host name must not be empty".to_owned());
            }
        }
        None if index.is_none() => {
            reasons.push(
                "website: indexDocument is required unless redirecting all requests".to_owned(),
            );
        }
        None => {}
    }
}
