//! Canonical encoding and fingerprinting of nested configuration blocks.
//!
//! A nested block (CORS rule, lifecycle rule, replication rule, encryption
//! rule) has no identity beyond its content. [`Canonical`] turns a block into
//! a [`CanonicalForm`]: a JSON value with sorted object keys, sorted
//! set-like sub-fields, and absent/empty/default values removed. A
//! [`BlockHasher`] fingerprints that form into a [`BlockKey`].

use std::collections::BTreeMap;
use std::fmt;

use bucketctl_model::{CorsRule, EncryptionRule, LifecycleRule, ReplicationRule};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a [`BlockKey`].
const KEY_BYTES: usize = 8;

// ---------------------------------------------------------------------------
// CanonicalForm
// ---------------------------------------------------------------------------

/// Deterministic, order-independent encoding of a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalForm(Value);

impl CanonicalForm {
    /// Encode any serializable value, pruning empty and absent fields.
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Self {
        let raw = serde_json::to_value(value).unwrap_or_default();
        Self(prune(raw).unwrap_or(Value::Object(serde_json::Map::new())))
    }

    /// The encoded JSON value.
    #[must_use]
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Bytes fed to the hasher: compact JSON with sorted keys.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_string().into_bytes()
    }
}

impl fmt::Display for CanonicalForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Drop nulls, empty strings, empty arrays and empty objects from object
/// fields, recursively, and rebuild objects in sorted key order. Array
/// elements are kept as-is, so `[""]` stays distinct from `[]`.
fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::Array(items) => {
            let items: Vec<Value> = items.into_iter().map(prune_element).collect();
            (!items.is_empty()).then_some(Value::Array(items))
        }
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| prune(v).map(|v| (k, v)))
                .collect();
            (!sorted.is_empty()).then(|| Value::Object(sorted.into_iter().collect()))
        }
        other => Some(other),
    }
}

fn prune_element(value: Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => prune(value).unwrap_or(Value::Null),
        other => other,
    }
}

// ---------------------------------------------------------------------------
// BlockKey / BlockHasher
// ---------------------------------------------------------------------------

/// Fingerprint of a canonical form. Rendered as 16 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockKey(u64);

impl BlockKey {
    /// Wrap a raw fingerprint.
    #[must_use]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw fingerprint.
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

impl Serialize for BlockKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Fingerprints canonical forms.
///
/// Equal forms must yield equal keys. The engine only relies on distinct
/// forms yielding distinct keys with overwhelming probability.
pub trait BlockHasher: Send + Sync + fmt::Debug {
    /// Fingerprint a canonical form.
    fn key(&self, form: &CanonicalForm) -> BlockKey;
}

/// The default hasher: the first eight bytes of a SHA-256 digest.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256BlockHasher;

impl BlockHasher for Sha256BlockHasher {
    fn key(&self, form: &CanonicalForm) -> BlockKey {
        let digest = Sha256::digest(form.to_bytes());
        let raw = digest
            .iter()
            .take(KEY_BYTES)
            .fold(0_u64, |acc, b| (acc << 8) | u64::from(*b));
        BlockKey(raw)
    }
}

// ---------------------------------------------------------------------------
// Canonical
// ---------------------------------------------------------------------------

/// A block with a canonical encoding.
pub trait Canonical {
    /// Encode the block canonically.
    fn canonical_form(&self) -> CanonicalForm;
}

/// A deterministic id derived from a block's content, for blocks declared
/// without one.
pub fn content_id<T: Canonical>(prefix: &str, block: &T, hasher: &dyn BlockHasher) -> String {
    format!("{prefix}{}", hasher.key(&block.canonical_form()))
}

fn sorted_unique(items: &[String]) -> Vec<String> {
    let mut items = items.to_vec();
    items.sort();
    items.dedup();
    items
}

fn sorted_by_form<T: Serialize>(items: &[T]) -> Vec<Value> {
    let mut forms: Vec<Value> = items
        .iter()
        .map(|item| CanonicalForm::of(item).0)
        .collect();
    forms.sort_by_key(ToString::to_string);
    forms.dedup();
    forms
}

impl Canonical for CorsRule {
    fn canonical_form(&self) -> CanonicalForm {
        let methods: Vec<String> = self
            .allowed_methods
            .iter()
            .map(|m| m.to_ascii_uppercase())
            .collect();
        CanonicalForm::of(&serde_json::json!({
            "id": self.id,
            "allowedHeaders": sorted_unique(&self.allowed_headers),
            "allowedMethods": sorted_unique(&methods),
            "allowedOrigins": sorted_unique(&self.allowed_origins),
            "exposeHeaders": sorted_unique(&self.expose_headers),
            "maxAgeSeconds": self.max_age_seconds.filter(|s| *s != 0),
        }))
    }
}

impl Canonical for LifecycleRule {
    fn canonical_form(&self) -> CanonicalForm {
        let expiration = self.expiration.as_ref().map(|e| {
            serde_json::json!({
                "days": e.days,
                "date": e.date,
                "expiredObjectDeleteMarker": e.expired_object_delete_marker.filter(|m| *m),
            })
        });
        CanonicalForm::of(&serde_json::json!({
            "id": self.id,
            "prefix": self.prefix,
            "tags": self.tags,
            "enabled": self.enabled,
            "expiration": expiration,
            "transitions": sorted_by_form(&self.transitions),
            "noncurrentVersionExpiration": self.noncurrent_version_expiration,
            "noncurrentVersionTransitions": sorted_by_form(&self.noncurrent_version_transitions),
            "abortIncompleteMultipartUploadDays": self.abort_incomplete_multipart_upload_days,
        }))
    }
}

impl Canonical for EncryptionRule {
    fn canonical_form(&self) -> CanonicalForm {
        CanonicalForm::of(self)
    }
}

impl Canonical for ReplicationRule {
    fn canonical_form(&self) -> CanonicalForm {
        CanonicalForm::of(self)
    }
}

#[cfg(test)]
mod tests {
    use bucketctl_model::{LifecycleExpiration, StorageClass, Transition};

    use super::*;

    fn cors(methods: &[&str], origins: &[&str]) -> CorsRule {
        CorsRule {
            allowed_methods: methods.iter().map(|s| (*s).to_owned()).collect(),
            allowed_origins: origins.iter().map(|s| (*s).to_owned()).collect(),
            ..CorsRule::default()
        }
    }

    #[test]
    fn test_should_ignore_member_order_in_set_fields() {
        let a = cors(&["PUT", "POST"], &["https://a", "https://b"]);
        let b = cors(&["POST", "PUT"], &["https://b", "https://a"]);
        assert_eq!(a.canonical_form(), b.canonical_form());
        assert_eq!(
            Sha256BlockHasher.key(&a.canonical_form()),
            Sha256BlockHasher.key(&b.canonical_form())
        );
    }

    #[test]
    fn test_should_keep_empty_origin_distinct_from_none() {
        let empty_origin = cors(&["PUT"], &[""]);
        let no_origin = cors(&["PUT"], &[]);
        assert_ne!(empty_origin.canonical_form(), no_origin.canonical_form());
    }

    #[test]
    fn test_should_treat_absent_and_empty_alike() {
        let absent = LifecycleRule {
            enabled: true,
            expiration: Some(LifecycleExpiration {
                days: Some(30),
                ..LifecycleExpiration::default()
            }),
            ..LifecycleRule::default()
        };
        let empty = LifecycleRule {
            id: Some(String::new()),
            prefix: Some(String::new()),
            ..absent.clone()
        };
        assert_eq!(absent.canonical_form(), empty.canonical_form());
    }

    #[test]
    fn test_should_sort_transitions() {
        let t30 = Transition {
            days: Some(30),
            date: None,
            storage_class: StorageClass::StandardIa,
        };
        let t60 = Transition {
            days: Some(60),
            date: None,
            storage_class: StorageClass::Glacier,
        };
        let a = LifecycleRule {
            enabled: true,
            transitions: vec![t30.clone(), t60.clone()],
            ..LifecycleRule::default()
        };
        let b = LifecycleRule {
            transitions: vec![t60, t30],
            ..a.clone()
        };
        assert_eq!(a.canonical_form(), b.canonical_form());
    }

    #[test]
    fn test_should_distinguish_different_content() {
        let a = cors(&["GET"], &["*"]);
        let b = cors(&["PUT"], &["*"]);
        assert_ne!(
            Sha256BlockHasher.key(&a.canonical_form()),
            Sha256BlockHasher.key(&b.canonical_form())
        );
    }

    #[test]
    fn test_should_render_key_as_sixteen_hex_chars() {
        let key = BlockKey::new(0xab);
        assert_eq!(key.to_string(), "00000000000000ab");
        let derived = content_id("tf-s3-lifecycle-", &cors(&["GET"], &["*"]), &Sha256BlockHasher);
        assert_eq!(derived.len(), "tf-s3-lifecycle-".len() + 16);
    }

    #[test]
    fn test_should_emit_sorted_compact_json() {
        let form =
            CanonicalForm::of(&serde_json::json!({"b": 1, "a": {"d": null, "c": ""}, "e": [""]}));
        assert_eq!(form.to_string(), r#"{"b":1,"e":[""]}"#);
    }
}
