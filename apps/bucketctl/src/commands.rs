//! Command implementations. Each returns the JSON or text to print.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use bucketctl_core::AwsRegion;
use bucketctl_engine::domain;
use bucketctl_engine::naming::validate_bucket_name;
use bucketctl_engine::{BucketApi, BucketReconciler, MemoryBucketApi, ReconcilerConfig};
use bucketctl_model::{BucketIdentity, DesiredConfiguration, ObservedConfiguration};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::info;

use crate::cli::{EndpointArgs, NameArgs, PlanArgs, SimulateArgs};

/// `bucketctl validate`.
pub fn validate(args: &NameArgs, region: &AwsRegion) -> Result<String> {
    validate_bucket_name(&args.name, region)?;
    Ok(format!("bucket name {:?} is valid in {region}", args.name))
}

/// `bucketctl endpoints`.
pub fn endpoints(args: &EndpointArgs, region: &AwsRegion) -> Result<Value> {
    validate_bucket_name(&args.name, region)?;
    let identity = BucketIdentity::new(&args.name, region.clone());
    let outputs = domain::outputs(&identity, args.website)?;
    Ok(serde_json::to_value(outputs)?)
}

/// `bucketctl plan`.
pub async fn plan(args: &PlanArgs, region: &AwsRegion, config: ReconcilerConfig) -> Result<Value> {
    let desired: DesiredConfiguration = read_json(&args.desired).await?;
    let observed: Option<ObservedConfiguration> = match &args.observed {
        Some(path) => Some(read_json(path).await?),
        None => None,
    };

    let reconciler = BucketReconciler::new(Arc::new(MemoryBucketApi::new()), config)
        .with_default_region(region.clone());
    let plan = reconciler
        .plan(&desired, observed.as_ref())
        .context("failed to compute plan")?;
    Ok(serde_json::to_value(plan)?)
}

/// `bucketctl simulate`.
pub async fn simulate(
    args: &SimulateArgs,
    region: &AwsRegion,
    config: ReconcilerConfig,
) -> Result<Value> {
    let desired: DesiredConfiguration = read_json(&args.desired).await?;
    let api = Arc::new(MemoryBucketApi::new());
    let reconciler = BucketReconciler::new(Arc::clone(&api) as Arc<dyn BucketApi>, config)
        .with_default_region(region.clone());

    let outcome = reconciler
        .ensure(&desired)
        .await
        .context("bucket did not converge")?;

    if args.objects > 0 {
        api.put_objects(&outcome.name, args.objects)
            .context("failed to load objects")?;
        info!(bucket = %outcome.name, objects = args.objects, "loaded objects");
    }
    if args.destroy {
        reconciler
            .destroy(&outcome.name, desired.force_destroy)
            .await
            .with_context(|| format!("failed to destroy bucket {}", outcome.name))?;
    }

    Ok(json!({
        "outcome": outcome,
        "destroyed": args.destroy,
        "calls": api.calls(),
    }))
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
}
