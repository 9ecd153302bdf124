//! Deferred values that refer to attributes of other resources.
//!
//! Replication destinations, KMS keys and logging targets are frequently
//! written as references such as `aws_kms_key.replica.arn`. They are kept
//! symbolic in the desired configuration and resolved through a
//! [`ReferenceLookup`] right before normalization.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::ModelError;

/// A reference to an attribute of another resource, written
/// `<resource>.<attribute>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceRef {
    resource: String,
    attribute: String,
}

impl ResourceRef {
    /// Create a reference from its two halves.
    #[must_use]
    pub fn new(resource: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            attribute: attribute.into(),
        }
    }

    /// The referenced resource address, e.g. `aws_kms_key.replica`.
    #[must_use]
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The referenced attribute, e.g. `arn`.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource, self.attribute)
    }
}

impl FromStr for ResourceRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
            .unwrap_or(s);
        match trimmed.rsplit_once('.') {
            Some((resource, attribute)) if !resource.is_empty() && !attribute.is_empty() => {
                Ok(Self::new(resource, attribute))
            }
            _ => Err(ModelError::MalformedReference(s.to_owned())),
        }
    }
}

impl serde::Serialize for ResourceRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ResourceRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A string value that is either known now or deferred to another resource.
///
/// Serialized as a bare string, or as `{"ref": "resource.attribute"}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Deferred {
    /// A value known at plan time.
    Value(String),
    /// A value supplied by another resource.
    Reference {
        /// The referenced attribute.
        #[serde(rename = "ref")]
        reference: ResourceRef,
    },
}

impl Deferred {
    /// Wrap a known value.
    #[must_use]
    pub fn value(v: impl Into<String>) -> Self {
        Self::Value(v.into())
    }

    /// Wrap a reference.
    #[must_use]
    pub fn reference(reference: ResourceRef) -> Self {
        Self::Reference { reference }
    }

    /// The known value, if any.
    #[must_use]
    pub fn known(&self) -> Option<&str> {
        match self {
            Self::Value(v) => Some(v),
            Self::Reference { .. } => None,
        }
    }

    /// Resolve against `lookup`. On failure the unresolved reference is
    /// returned so callers can report it.
    pub fn resolve(&self, lookup: &dyn ReferenceLookup) -> Result<String, ResourceRef> {
        match self {
            Self::Value(v) => Ok(v.clone()),
            Self::Reference { reference } => {
                lookup.lookup(reference).ok_or_else(|| reference.clone())
            }
        }
    }
}

impl Default for Deferred {
    fn default() -> Self {
        Self::Value(String::new())
    }
}

impl From<&str> for Deferred {
    fn from(value: &str) -> Self {
        Self::Value(value.to_owned())
    }
}

impl From<String> for Deferred {
    fn from(value: String) -> Self {
        Self::Value(value)
    }
}

impl fmt::Display for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.write_str(v),
            Self::Reference { reference } => write!(f, "${{{reference}}}"),
        }
    }
}

/// Source of resolved values for [`ResourceRef`]s.
pub trait ReferenceLookup: Send + Sync + fmt::Debug {
    /// Returns the resolved value, or `None` when unknown.
    fn lookup(&self, reference: &ResourceRef) -> Option<String>;
}

/// A lookup that knows nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReferences;

impl ReferenceLookup for NoReferences {
    fn lookup(&self, _reference: &ResourceRef) -> Option<String> {
        None
    }
}

impl<S: std::hash::BuildHasher + Send + Sync> ReferenceLookup for HashMap<String, String, S> {
    fn lookup(&self, reference: &ResourceRef) -> Option<String> {
        self.get(&reference.to_string()).cloned()
    }
}

impl ReferenceLookup for BTreeMap<String, String> {
    fn lookup(&self, reference: &ResourceRef) -> Option<String> {
        self.get(&reference.to_string()).cloned()
    }
}
