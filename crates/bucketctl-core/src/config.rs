//! Global configuration for bucketctl.
//!
//! All configuration is driven by environment variables with sensible
//! defaults.

use crate::error::{BucketctlError, BucketctlResult};
use crate::types::AwsRegion;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogFormat {
    /// Human-readable text lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Global configuration for bucketctl.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketctlConfig {
    /// Region used when a desired configuration does not name one.
    pub default_region: AwsRegion,
    /// Log level.
    pub log_level: String,
    /// Log line format.
    pub log_format: LogFormat,
}

impl Default for BucketctlConfig {
    fn default() -> Self {
        Self {
            default_region: AwsRegion::default(),
            log_level: "info".to_owned(),
            log_format: LogFormat::Text,
        }
    }
}

impl BucketctlConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `DEFAULT_REGION` | `us-east-1` |
    /// | `LOG_LEVEL` | `info` |
    /// | `LOG_FORMAT` | `text` |
    ///
    /// # Errors
    ///
    /// Returns [`BucketctlError::Config`] if `LOG_FORMAT` is neither `text`
    /// nor `json`.
    pub fn from_env() -> BucketctlResult<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("DEFAULT_REGION") {
            config.default_region = AwsRegion::new(v);
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("LOG_FORMAT") {
            config.log_format = parse_log_format(&v)?;
        }

        Ok(config)
    }
}

fn parse_log_format(value: &str) -> BucketctlResult<LogFormat> {
    if value.eq_ignore_ascii_case("json") {
        Ok(LogFormat::Json)
    } else if value.eq_ignore_ascii_case("text") {
        Ok(LogFormat::Text)
    } else {
        Err(BucketctlError::Config(format!(
            "LOG_FORMAT must be text or json, got {value:?}"
        )))
    }
}
