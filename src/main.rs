//! # tierd
//!
//! Background daemon that keeps a storage root's tiers aligned with its
//! access patterns. Loads the saved statistics, runs the optimization
//! scheduler until Ctrl-C, and saves the statistics on the way out.

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;

use tierstore::{
    CompressionEngine, HybridStorage, LocalFsStore, OptimizationScheduler, TieringConfig,
};

#[derive(Parser)]
#[command(name = "tierd")]
#[command(about = "Periodic tier optimization for a storage root", long_about = None)]
struct Args {
    /// Storage root directory
    #[arg(short, long, default_value = "./var/tierstore")]
    root: PathBuf,

    /// JSON configuration file (falls back to $TIERSTORE_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    println!("=================================================");
    println!("  tierd - Adaptive Storage Tiering");
    println!("=================================================");
    println!();

    let config = TieringConfig::load(args.config.as_deref())?;
    let store = LocalFsStore::open(&args.root)?;
    let engine = Arc::new(CompressionEngine::new(config.profile.clone()));
    let storage = Arc::new(HybridStorage::new(
        Arc::new(store),
        engine,
        config.storage.clone(),
    ));

    let loaded = storage.load_stats().await?;
    println!("✓ Storage root: {}", args.root.display());
    println!("  - Tracked paths: {}", loaded);
    println!(
        "  - Thresholds: active {:.2} / compressed {:.2}",
        config.storage.active_threshold, config.storage.compressed_threshold
    );
    println!(
        "  - Access breakpoints: hot {} / warm {} / cold {}",
        config.storage.hot_access_count,
        config.storage.warm_access_count,
        config.storage.cold_access_count
    );
    println!(
        "  - Optimization interval: {}s ({})",
        config.scheduler.interval_secs,
        if config.scheduler.enabled { "enabled" } else { "disabled" }
    );
    println!();

    let scheduler = Arc::new(OptimizationScheduler::new(
        Arc::clone(&storage),
        config.scheduler.clone(),
    ));
    let handle = tokio::spawn(Arc::clone(&scheduler).start());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, stopping scheduler");
    scheduler.stop();
    if let Err(e) = handle.await {
        error!("Scheduler task ended abnormally: {}", e);
    }

    storage.save_stats().await?;

    println!("=================================================");
    println!("  tierd shut down");
    println!("=================================================");

    Ok(())
}
