//! Bucket name validation and generation.
//!
//! Two rule sets apply. Buckets in the legacy default region (`us-east-1`)
//! keep the historical relaxed rules. Every other region enforces DNS
//! compatible names:
//!
//! - 3-63 characters long
//! - Only lowercase letters, numbers, hyphens, and dots
//! - Not formatted as an IPv4 address
//! - No consecutive dots, no leading or trailing dot
//! - Every dot-separated label starts and ends with a letter or number
//!
//! Every violated rule is reported, not just the first.

use bucketctl_core::AwsRegion;
use chrono::Utc;

use crate::error::ValidationError;

/// Minimum bucket name length outside the legacy region.
const MIN_BUCKET_NAME_LEN: usize = 3;

/// Maximum bucket name length outside the legacy region.
const MAX_BUCKET_NAME_LEN: usize = 63;

/// Maximum bucket name length in the legacy region.
const MAX_LEGACY_BUCKET_NAME_LEN: usize = 255;

/// Hex characters appended to generated names.
const GENERATED_SUFFIX_LEN: usize = 8;

/// Validate a bucket name for the region it will live in.
///
/// # Examples
///
/// ```
/// use bucketctl_core::AwsRegion;
/// use bucketctl_engine::naming::validate_bucket_name;
///
/// let west = AwsRegion::new("us-west-2");
/// assert!(validate_bucket_name("foo.bar", &west).is_ok());
/// assert!(validate_bucket_name("Foo.Bar", &west).is_err());
/// assert!(validate_bucket_name("Foo.Bar", &AwsRegion::default()).is_ok());
/// ```
pub fn validate_bucket_name(name: &str, region: &AwsRegion) -> Result<(), ValidationError> {
    let reasons = if region.is_legacy_default() {
        legacy_violations(name)
    } else {
        dns_violations(name)
    };
    ValidationError::check(format!("bucket name {name:?}"), reasons)
}

fn legacy_violations(name: &str) -> Vec<String> {
    let mut reasons = Vec::new();

    if name.is_empty() || name.len() > MAX_LEGACY_BUCKET_NAME_LEN {
        reasons.push(format!(
            "must be between 1 and {MAX_LEGACY_BUCKET_NAME_LEN} characters long"
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_'))
    {
        reasons.push(
            "only alphanumeric characters, hyphens, periods, and underscores are allowed"
                .to_owned(),
        );
    }

    reasons
}

fn dns_violations(name: &str) -> Vec<String> {
    let mut reasons = Vec::new();
    let len = name.len();

    if !(MIN_BUCKET_NAME_LEN..=MAX_BUCKET_NAME_LEN).contains(&len) {
        reasons.push(format!(
            "must be between {MIN_BUCKET_NAME_LEN} and {MAX_BUCKET_NAME_LEN} characters long"
        ));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.')
    {
        reasons.push(
            "only lowercase alphanumeric characters, hyphens, and periods are allowed".to_owned(),
        );
    }
    if is_ipv4_shaped(name) {
        reasons.push("must not be formatted as an IP address".to_owned());
    }
    if name.contains("..") {
        reasons.push("must not contain two adjacent periods".to_owned());
    }
    if name.starts_with('.') {
        reasons.push("must not start with a period".to_owned());
    }
    if name.ends_with('.') {
        reasons.push("must not end with a period".to_owned());
    }
    let bad_labels = name
        .split('.')
        .filter(|label| !label.is_empty())
        .any(|label| !label_edges_alphanumeric(label));
    if bad_labels {
        reasons.push("each label must start and end with a letter or number".to_owned());
    }

    reasons
}

/// Four dot-separated groups of one to three digits. Octet range is not
/// checked, so `999.1.1.1` counts as IP-shaped.
fn is_ipv4_shaped(name: &str) -> bool {
    let mut groups = 0;
    for group in name.split('.') {
        groups += 1;
        if groups > 4 || !(1..=3).contains(&group.len()) {
            return false;
        }
        if !group.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
    }
    groups == 4
}

fn label_edges_alphanumeric(label: &str) -> bool {
    let bytes = label.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric()
        }
        _ => false,
    }
}

/// Generate a unique bucket name from a prefix: the prefix, a UTC timestamp
/// (`YYYYMMDDHHMMSS`) and eight random hex characters.
#[must_use]
pub fn generate_name(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let random = uuid::Uuid::new_v4().simple().to_string();
    let suffix = random.get(..GENERATED_SUFFIX_LEN).unwrap_or(&random);
    format!("{prefix}{timestamp}{suffix}")
}
