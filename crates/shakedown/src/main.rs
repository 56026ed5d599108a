//! Shakedown: a failure-injection test harness for replicated object-storage
//! clusters.

use anyhow::{Context, Result};
use clap::Parser;
use shakedown::cli::{CheckArgs, Cli, Commands, DeleteSnapshotsArgs, RunArgs};
use shakedown::driver::Driver;
use shakedown_core::config::{Config, LogFormat};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Check(args) => check(args).await,
        Commands::DeleteSnapshots(args) => delete_snapshots(args).await,
        Commands::Version => {
            println!("shakedown {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(count) = args.replica_count {
        config.storage.replica_count = count;
    }
    init_logging(&config)?;

    let driver = Driver::from_config(config).await?;
    let summary = driver.run(args.scenario.as_deref()).await?;

    println!("{summary}");
    if summary.all_passed() {
        info!("all scenarios passed");
        Ok(())
    } else {
        anyhow::bail!("{} scenario(s) did not pass", summary.failed_count());
    }
}

async fn check(args: CheckArgs) -> Result<()> {
    let mut config = load_config(&args.config)?;
    if let Some(count) = args.replica_count {
        config.storage.replica_count = count;
    }
    init_logging(&config)?;

    let driver = Driver::from_config(config).await?;
    if driver.check(args.exact).await? {
        println!("all replicas found");
        Ok(())
    } else {
        anyhow::bail!("replicas are missing or in excess");
    }
}

async fn delete_snapshots(args: DeleteSnapshotsArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    init_logging(&config)?;

    let driver = Driver::from_config(config).await?;
    driver.restorer().delete(&args.tag).await?;
    info!("snapshots deleted");
    Ok(())
}

fn load_config(path: &std::path::Path) -> Result<Config> {
    Config::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))
}

fn init_logging(config: &Config) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry().with(filter).with(fmt_layer.json()).init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry().with(filter).with(fmt_layer).init();
        }
    }

    Ok(())
}
