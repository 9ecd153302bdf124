//! Core types and configuration for bucketctl.
//!
//! This crate provides the foundational building blocks shared by the model,
//! the reconciliation engine, and the CLI: AWS account and region
//! identifiers, the partition a region belongs to, and the global
//! environment-driven configuration.

mod config;
mod error;
mod types;

pub use config::{BucketctlConfig, LogFormat};
pub use error::{BucketctlError, BucketctlResult};
pub use types::{AccountId, AwsRegion, Partition};
