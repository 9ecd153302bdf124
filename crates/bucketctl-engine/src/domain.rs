//! Derived DNS names, ARNs and website endpoints.
//!
//! Pure string construction; nothing here touches the network. Unknown
//! regions are accepted and spliced into the hostname as-is, since new
//! regions appear before any table here learns about them.

use bucketctl_core::{AwsRegion, Partition};
use bucketctl_model::{BucketIdentity, BucketOutputs};

use crate::error::ValidationError;

/// Regions whose website endpoint uses the `s3-website-<region>` form.
const DASHED_WEBSITE_REGIONS: [&str; 9] = [
    "us-east-1",
    "us-west-1",
    "us-west-2",
    "ap-southeast-1",
    "ap-southeast-2",
    "ap-northeast-1",
    "sa-east-1",
    "eu-west-1",
    "us-gov-west-1",
];

/// Route 53 hosted zone ids of the website endpoints.
const HOSTED_ZONE_IDS: [(&str, &str); 19] = [
    ("us-east-1", "Z3AQBSTGFYJSTF"),
    ("us-east-2", "Z2O1EMRO9K5GLX"),
    ("us-west-1", "Z2F56UZL2M1ACD"),
    ("us-west-2", "Z3BJ6K6RIION7M"),
    ("ap-east-1", "ZNB98KWMFR0R6"),
    ("ap-south-1", "Z11RGJOFQNVJUP"),
    ("ap-northeast-1", "Z2M4EHUR26P7ZW"),
    ("ap-northeast-2", "Z3W03O7B5YMIYP"),
    ("ap-northeast-3", "Z2YQB5RD63NC85"),
    ("ap-southeast-1", "Z3O0J2DXBE1FTB"),
    ("ap-southeast-2", "Z1WCIGYICN2BYD"),
    ("ca-central-1", "Z1QDHH18159H29"),
    ("eu-central-1", "Z21DNDUVLTQW6Q"),
    ("eu-west-1", "Z1BKCTXD74EZPE"),
    ("eu-west-2", "Z3GKZC51ZF0DB4"),
    ("eu-west-3", "Z3R1K369G5AVDG"),
    ("eu-north-1", "Z3BAZG2TWCNX0D"),
    ("sa-east-1", "Z7KQH4QJS55SO"),
    ("us-gov-west-1", "Z31GFT0UA1I2HV"),
];

/// Treat an empty region as the legacy default.
fn effective_region(region: &str) -> &str {
    if region.is_empty() {
        AwsRegion::LEGACY_DEFAULT
    } else {
        region
    }
}

/// Resolve the region-specific hostname of a bucket.
///
/// # Examples
///
/// ```
/// use bucketctl_engine::domain::regional_domain_name;
///
/// assert_eq!(regional_domain_name("b", "").unwrap(), "b.s3.amazonaws.com");
/// assert_eq!(regional_domain_name("b", "eu-west-1").unwrap(), "b.s3.eu-west-1.amazonaws.com");
/// assert_eq!(
///     regional_domain_name("b", "cn-north-1").unwrap(),
///     "b.s3.cn-north-1.amazonaws.com.cn"
/// );
/// ```
pub fn regional_domain_name(name: &str, region: &str) -> Result<String, ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::single(
            "bucket name \"\"",
            "a bucket name is required to derive its domain name",
        ));
    }
    let region = effective_region(region);
    if region == AwsRegion::LEGACY_DEFAULT {
        return Ok(bucket_domain_name(name));
    }
    let suffix = Partition::from_region(region).dns_suffix();
    Ok(format!("{name}.s3.{region}.{suffix}"))
}

/// The global hostname of a bucket.
#[must_use]
pub fn bucket_domain_name(name: &str) -> String {
    format!("{name}.s3.amazonaws.com")
}

/// The website hosting domain of a region, without the bucket name.
#[must_use]
pub fn website_domain(region: &str) -> String {
    let region = effective_region(region);
    let suffix = Partition::from_region(region).dns_suffix();
    if DASHED_WEBSITE_REGIONS.contains(&region) {
        format!("s3-website-{region}.{suffix}")
    } else {
        format!("s3-website.{region}.{suffix}")
    }
}

/// The website endpoint of a bucket.
#[must_use]
pub fn website_endpoint(name: &str, region: &str) -> String {
    format!("{name}.{}", website_domain(region))
}

/// The hosted zone id of a region's website endpoint, if known.
#[must_use]
pub fn hosted_zone_id(region: &str) -> Option<&'static str> {
    let region = effective_region(region);
    HOSTED_ZONE_IDS
        .iter()
        .find(|(r, _)| *r == region)
        .map(|(_, id)| *id)
}

/// The ARN of a bucket.
#[must_use]
pub fn bucket_arn(name: &str, partition: Partition) -> String {
    format!("arn:{partition}:s3:::{name}")
}

/// Compute every derived attribute of a bucket.
///
/// Website attributes are only filled in when website hosting is configured.
pub fn outputs(
    identity: &BucketIdentity,
    website_enabled: bool,
) -> Result<BucketOutputs, ValidationError> {
    let region = identity.region.as_str();
    Ok(BucketOutputs {
        id: identity.name.clone(),
        arn: bucket_arn(&identity.name, identity.partition),
        region: effective_region(region).to_owned(),
        hosted_zone_id: hosted_zone_id(region).map(str::to_owned),
        bucket_domain_name: bucket_domain_name(&identity.name),
        bucket_regional_domain_name: regional_domain_name(&identity.name, region)?,
        website_endpoint: website_enabled.then(|| website_endpoint(&identity.name, region)),
        website_domain: website_enabled.then(|| website_domain(region)),
    })
}
