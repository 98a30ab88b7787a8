//! mileage-cron: Expiry and tier recalculation runner
//!
//! Runs the qualifying-miles expiry job and the tier recalculation job on
//! their configured intervals until interrupted.
//!
//! ## Usage
//! ```text
//! mileage-cron [--once] [--config <path>]
//! ```
//!
//! `--once` runs expiry then recalculation a single time and exits.
//!
//! ## Configuration
//! - MILEAGE_CONFIG: Path to a YAML config file (optional)
//! - MILEAGE_LOG: Log filter (default: info)
//! - MILEAGE_STORAGE__TYPE, MILEAGE_SCHEDULER__RUN_ON_START, ...: overrides

use tracing::info;

use mileage_engine::config::Config;
use mileage_engine::services::JobScheduler;
use mileage_engine::storage::init_storage;
use mileage_engine::utils::bootstrap::init_tracing;

struct Args {
    once: bool,
    config: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        once: false,
        config: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--once" => args.once = true,
            "--config" => {
                args.config = Some(iter.next().ok_or("--config requires a path")?);
            }
            other => return Err(format!("unknown argument: {}", other)),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = parse_args()?;
    let config = Config::load(args.config.as_deref())?;
    let repository = init_storage(&config.storage).await?;
    let scheduler = JobScheduler::new(repository, &config)?;

    if args.once {
        let (expiry, recalculation) = scheduler.run_all_once().await?;
        info!(%expiry, %recalculation, "mileage-cron finished");
        return Ok(());
    }

    info!("mileage-cron started");
    scheduler
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await;

    Ok(())
}
