//! Command line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// bucketctl: declarative S3 bucket reconciliation.
#[derive(Debug, Parser)]
#[command(name = "bucketctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Region to use when none is given; overrides `DEFAULT_REGION`.
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Check a bucket name against the naming rules of a region.
    Validate(NameArgs),
    /// Print the derived endpoints and identifiers of a bucket.
    Endpoints(EndpointArgs),
    /// Compute the changes needed to reach a desired configuration.
    Plan(PlanArgs),
    /// Converge a desired configuration against an in-memory remote.
    Simulate(SimulateArgs),
}

/// Arguments for `validate`.
#[derive(Debug, Args)]
pub struct NameArgs {
    /// Bucket name.
    pub name: String,
}

/// Arguments for `endpoints`.
#[derive(Debug, Args)]
pub struct EndpointArgs {
    /// Bucket name.
    pub name: String,

    /// Include website endpoints.
    #[arg(long)]
    pub website: bool,
}

/// Arguments for `plan`.
#[derive(Debug, Args)]
pub struct PlanArgs {
    /// JSON file with the desired configuration.
    #[arg(short, long)]
    pub desired: PathBuf,

    /// JSON file with the observed configuration; omit for a new bucket.
    #[arg(short, long)]
    pub observed: Option<PathBuf>,
}

/// Arguments for `simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// JSON file with the desired configuration.
    #[arg(short, long)]
    pub desired: PathBuf,

    /// Objects to load into the bucket after it converges.
    #[arg(long, default_value_t = 0)]
    pub objects: usize,

    /// Destroy the bucket after it converges.
    #[arg(long)]
    pub destroy: bool,
}
