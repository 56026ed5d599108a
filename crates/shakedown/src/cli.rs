//! Command line interface definition.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Shakedown: a failure-injection test harness for replicated object-storage
/// clusters.
#[derive(Parser)]
#[command(name = "shakedown")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Run fault-injection scenarios against the configured fleet.
    Run(RunArgs),
    /// Check replica consistency once and exit.
    Check(CheckArgs),
    /// Delete the baseline snapshots of the configured fleet.
    DeleteSnapshots(DeleteSnapshotsArgs),
    /// Print version information.
    Version,
}

/// Arguments for the run command.
#[derive(Args)]
pub struct RunArgs {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "shakedown.toml")]
    pub config: PathBuf,

    /// Run only the scenario with this name.
    #[arg(long)]
    pub scenario: Option<String>,

    /// Override the configured replica count.
    #[arg(long)]
    pub replica_count: Option<usize>,
}

/// Arguments for the check command.
#[derive(Args)]
pub struct CheckArgs {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "shakedown.toml")]
    pub config: PathBuf,

    /// Override the configured replica count.
    #[arg(long)]
    pub replica_count: Option<usize>,

    /// Fail when more than the expected number of replicas exist.
    #[arg(long)]
    pub exact: bool,
}

/// Arguments for the delete-snapshots command.
#[derive(Args)]
pub struct DeleteSnapshotsArgs {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "shakedown.toml")]
    pub config: PathBuf,

    /// Tag the snapshots were saved under.
    #[arg(long, default_value = "")]
    pub tag: String,
}
