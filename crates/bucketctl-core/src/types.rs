//! Common AWS type definitions shared across bucketctl crates.

use std::fmt;
use std::str::FromStr;

/// AWS Account ID (12-digit string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account ID from a string.
    ///
    /// # Errors
    /// Returns an error if the account ID is not a 12-digit numeric string.
    pub fn new(id: impl Into<String>) -> Result<Self, crate::BucketctlError> {
        let id = id.into();
        if id.len() != 12 || !id.chars().all(|c| c.is_ascii_digit()) {
            return Err(crate::BucketctlError::InvalidAccountId(id));
        }
        Ok(Self(id))
    }

    /// Get the account ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// AWS Region identifier.
///
/// Regions are kept as free-form strings: new regions appear before any
/// hard-coded table learns about them, so nothing here rejects an unknown
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct AwsRegion(String);

impl AwsRegion {
    /// The legacy default region. Buckets here follow the historical,
    /// relaxed naming rules and use the global endpoint.
    pub const LEGACY_DEFAULT: &str = "us-east-1";

    /// Create a new region.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self(region.into())
    }

    /// Get the region as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the legacy default region.
    #[must_use]
    pub fn is_legacy_default(&self) -> bool {
        self.0 == Self::LEGACY_DEFAULT
    }

    /// The partition this region belongs to.
    #[must_use]
    pub fn partition(&self) -> Partition {
        Partition::from_region(&self.0)
    }
}

impl Default for AwsRegion {
    fn default() -> Self {
        Self(Self::LEGACY_DEFAULT.to_owned())
    }
}

impl fmt::Display for AwsRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A sovereign grouping of regions.
///
/// The partition determines the ARN prefix and the DNS suffix used for
/// endpoints.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub enum Partition {
    /// The standard commercial partition.
    #[default]
    #[serde(rename = "aws")]
    Aws,
    /// AWS GovCloud (US).
    #[serde(rename = "aws-us-gov")]
    AwsUsGov,
    /// AWS China.
    #[serde(rename = "aws-cn")]
    AwsCn,
}

impl Partition {
    /// Derive the partition from a region name.
    ///
    /// Unknown regions fall into the standard partition.
    #[must_use]
    pub fn from_region(region: &str) -> Self {
        if region.starts_with("cn-") {
            Self::AwsCn
        } else if region.starts_with("us-gov-") {
            Self::AwsUsGov
        } else {
            Self::Aws
        }
    }

    /// Returns the partition identifier used in ARNs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::AwsUsGov => "aws-us-gov",
            Self::AwsCn => "aws-cn",
        }
    }

    /// Returns the DNS suffix for service endpoints in this partition.
    #[must_use]
    pub fn dns_suffix(&self) -> &'static str {
        match self {
            Self::Aws | Self::AwsUsGov => "amazonaws.com",
            Self::AwsCn => "amazonaws.com.cn",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = crate::BucketctlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(Self::Aws),
            "aws-us-gov" => Ok(Self::AwsUsGov),
            "aws-cn" => Ok(Self::AwsCn),
            other => Err(crate::BucketctlError::Config(format!(
                "unknown partition: {other}"
            ))),
        }
    }
}
