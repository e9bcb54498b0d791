//! driftd - runs the drift job once a day.
//!
//! Configuration comes from the environment (see `DriftConfig`). The
//! catalog is re-read before every run so edits take effect on the next
//! tick without a restart.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use drift_core::{run_daily, DriftConfig, DriftError, EventCatalog};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "driftd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Daily conference website drift checker", long_about = None)]
struct Args {
    /// Emit JSON-formatted log lines
    #[arg(long, env = "DRIFT_LOG_JSON")]
    json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Run once immediately and exit
    #[arg(long)]
    once: bool,

    /// Never send reports or update snapshots
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    drift_core::init_tracing(args.json, level);

    let config = DriftConfig::from_env().context("Failed to load drift configuration")?;
    let job = config.build_job(args.dry_run)?;
    info!(
        version = drift_core::VERSION,
        snapshots = %config.snapshot_root.display(),
        catalog = %config.catalog_path.display(),
        hour_utc = config.schedule_hour,
        dry_run = args.dry_run,
        "driftd started"
    );

    let run = |now: DateTime<Utc>| {
        let job = &job;
        let path = &config.catalog_path;
        async move {
            let catalog = EventCatalog::load(path).map_err(DriftError::from)?;
            job.run(&catalog, now).await
        }
    };

    if args.once {
        run(Utc::now()).await?;
        return Ok(());
    }

    run_daily(config.schedule_hour, run).await?;
    Ok(())
}

