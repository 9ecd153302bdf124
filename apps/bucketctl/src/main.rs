//! bucketctl - declarative S3 bucket reconciliation from the command line.
//!
//! # Usage
//!
//! ```text
//! bucketctl validate my.bucket --region us-west-2
//! bucketctl endpoints my-bucket --region cn-north-1 --website
//! bucketctl plan --desired bucket.json --observed current.json
//! bucketctl simulate --desired bucket.json --objects 100 --destroy
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DEFAULT_REGION` | `us-east-1` | Region when neither `--region` nor the configuration names one |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `LOG_FORMAT` | `text` | `text` or `json` |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |
//! | `BUCKETCTL_*` | | Retry, drain and naming settings, see `ReconcilerConfig::from_env` |

mod cli;
mod commands;

use anyhow::{Context, Result};
use bucketctl_core::{AwsRegion, BucketctlConfig, LogFormat};
use bucketctl_engine::ReconcilerConfig;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BucketctlConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config)?;

    let region = cli
        .region
        .clone()
        .map_or_else(|| config.default_region.clone(), AwsRegion::new);
    let reconciler_config = ReconcilerConfig::from_env();
    debug!(region = %region, ?reconciler_config, "starting bucketctl");

    let output = match &cli.command {
        Commands::Validate(args) => commands::validate(args, &region)?,
        Commands::Endpoints(args) => pretty(&commands::endpoints(args, &region)?)?,
        Commands::Plan(args) => pretty(&commands::plan(args, &region, reconciler_config).await?)?,
        Commands::Simulate(args) => {
            pretty(&commands::simulate(args, &region, reconciler_config).await?)?
        }
    };
    println!("{output}");

    Ok(())
}

fn pretty(value: &serde_json::Value) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to render output")
}

/// Initialize the tracing subscriber. `RUST_LOG` takes precedence over
/// `LOG_LEVEL`; logs go to stderr so stdout stays machine-readable.
fn init_tracing(config: &BucketctlConfig) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level filter: {}", config.log_level))?
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }

    Ok(())
}
