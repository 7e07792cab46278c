//! # tierctl
//!
//! Command-line tool for tiered storage roots and compression chunks.
//!
//! Usage:
//!   tierctl put <path> [--input FILE]
//!   tierctl get <path> [--output FILE]
//!   tierctl delete <path>
//!   tierctl optimize
//!   tierctl analyze
//!   tierctl metrics
//!   tierctl compress <input> [--mime TYPE] [--frequency F] [--hot] [--output FILE]
//!   tierctl inspect <chunk>

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

use tierstore::storage::{AccessPatternAnalysis, StorageMetrics};
use tierstore::types::mime_for_path;
use tierstore::{
    AccessMetadata, CompressedChunk, CompressionEngine, HybridStorage, LocalFsStore,
    OptimizationReport, TieringConfig,
};

#[derive(Parser)]
#[command(name = "tierctl")]
#[command(about = "Inspect and drive adaptive tiered storage", long_about = None)]
struct Cli {
    /// Storage root directory
    #[arg(short, long, default_value = "./var/tierstore")]
    root: PathBuf,

    /// JSON configuration file (falls back to $TIERSTORE_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format for reports
    #[arg(short, long, value_enum, default_value_t = Format::Pretty)]
    format: Format,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Store an object (reads stdin when no input is given)
    Put {
        /// Object key below the root
        path: String,

        /// Source file
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Fetch an object (writes stdout when no output is given)
    Get {
        /// Object key below the root
        path: String,

        /// Destination file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove an object, its tier siblings and its statistics
    Delete {
        /// Object key below the root
        path: String,
    },

    /// Run one tier optimization pass
    Optimize,

    /// Show hot/cold files and migration candidates
    Analyze,

    /// Show per-tier metrics and engine counters
    Metrics,

    /// Compress a local file directly, bypassing tiering
    Compress {
        /// File to compress
        input: PathBuf,

        /// Content type (defaults to a guess from the extension)
        #[arg(long)]
        mime: Option<String>,

        /// Normalized access frequency in [0, 1]
        #[arg(long, default_value_t = 0.0)]
        frequency: f64,

        /// Mark the payload as hot
        #[arg(long)]
        hot: bool,

        /// Dictionary ecosystem (rust, python, javascript, ...)
        #[arg(long)]
        ecosystem: Option<String>,

        /// Write the chunk envelope here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Decode a chunk envelope and verify it decompresses
    Inspect {
        /// Chunk envelope file
        chunk: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), String> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let config = TieringConfig::load(cli.config.as_deref()).map_err(|e| e.to_string())?;
    let engine = Arc::new(CompressionEngine::new(config.profile.clone()));

    match cli.command {
        Commands::Compress {
            input,
            mime,
            frequency,
            hot,
            ecosystem,
            output,
        } => {
            let data = std::fs::read(&input).map_err(|e| format!("{}: {}", input.display(), e))?;
            let mime = mime.unwrap_or_else(|| mime_for_path(&input.to_string_lossy()).to_string());
            let metadata = AccessMetadata {
                access_frequency: frequency,
                is_hot: hot,
                ecosystem,
            };

            let analysis = engine.analyze_optimal_strategy(&data, &mime, &metadata);
            let chunk = engine
                .compress(&data, &mime, &metadata)
                .map_err(|e| e.to_string())?;

            println!("📦 {} ({}, {} bytes)\n", input.display(), mime, data.len());
            for estimate in &analysis.estimations {
                println!(
                    "  {:<10} estimated ratio {:.2}",
                    estimate.algorithm.to_string(),
                    estimate.estimated_ratio
                );
            }
            if analysis.fallback {
                println!("  (no strategy claimed the payload; all were ranked)");
            }
            println!();
            print_chunk(&chunk);

            if let Some(output) = output {
                let envelope = chunk.encode().map_err(|e| e.to_string())?;
                std::fs::write(&output, envelope)
                    .map_err(|e| format!("{}: {}", output.display(), e))?;
                println!("\n✓ Wrote envelope to {}", output.display());
            }
            return Ok(());
        }

        Commands::Inspect { chunk } => {
            let bytes = std::fs::read(&chunk).map_err(|e| format!("{}: {}", chunk.display(), e))?;
            let mut decoded = CompressedChunk::decode(&bytes).map_err(|e| e.to_string())?;
            let data = engine.decompress(&mut decoded).map_err(|e| e.to_string())?;

            println!("🔍 {} ({} bytes on disk)\n", chunk.display(), bytes.len());
            print_chunk(&decoded);
            println!("\n✓ Decompressed {} bytes", data.len());
            return Ok(());
        }

        _ => {}
    }

    let store = LocalFsStore::open(&cli.root).map_err(|e| format!("{}: {}", cli.root.display(), e))?;
    let storage = HybridStorage::new(Arc::new(store), engine, config.storage.clone());
    storage.load_stats().await.map_err(|e| e.to_string())?;

    match cli.command {
        Commands::Put { path, input } => {
            let data = match input {
                Some(input) => {
                    std::fs::read(&input).map_err(|e| format!("{}: {}", input.display(), e))?
                }
                None => {
                    let mut data = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut data)
                        .map_err(|e| format!("stdin: {}", e))?;
                    data
                }
            };
            storage.write_file(&path, &data).await.map_err(|e| e.to_string())?;
            let stats = storage.stats_for(&path);
            eprintln!(
                "✓ Stored {} ({} bytes) in {} tier as {} bytes",
                path,
                data.len(),
                stats.tier,
                stats.stored_size
            );
        }

        Commands::Get { path, output } => {
            let data = storage.read_file(&path).await.map_err(|e| e.to_string())?;
            match output {
                Some(output) => std::fs::write(&output, &data)
                    .map_err(|e| format!("{}: {}", output.display(), e))?,
                None => std::io::stdout()
                    .write_all(&data)
                    .map_err(|e| format!("stdout: {}", e))?,
            }
        }

        Commands::Delete { path } => {
            storage.delete_file(&path).await.map_err(|e| e.to_string())?;
            eprintln!("✓ Deleted {}", path);
        }

        Commands::Optimize => {
            let report = storage.optimize_tiers().await;
            emit(cli.format, &report, print_report)?;
        }

        Commands::Analyze => {
            let analysis = storage.analyze_access_patterns();
            emit(cli.format, &analysis, print_analysis)?;
        }

        Commands::Metrics => {
            let metrics = storage.get_storage_metrics();
            emit(cli.format, &metrics, print_metrics)?;
        }

        Commands::Compress { .. } | Commands::Inspect { .. } => {}
    }

    storage.save_stats().await.map_err(|e| e.to_string())?;
    Ok(())
}

fn emit<T: Serialize>(format: Format, value: &T, pretty: fn(&T)) -> Result<(), String> {
    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
            println!("{}", json);
        }
        Format::Pretty => pretty(value),
    }
    Ok(())
}

fn print_chunk(chunk: &CompressedChunk) {
    println!("  Algorithm:   {}", chunk.algorithm);
    println!("  Original:    {} bytes", chunk.original_size);
    println!(
        "  Compressed:  {} bytes ({:.1}%)",
        chunk.compressed_size,
        chunk.ratio() * 100.0
    );
    println!("  Level:       {}", chunk.metadata.level);
    println!("  Time:        {:.2}ms", chunk.metadata.compression_time_ms);
    if let Some(dictionary) = &chunk.metadata.dictionary {
        println!("  Dictionary:  {}", dictionary);
    }
}

fn print_report(report: &OptimizationReport) {
    println!("⚙️  Tier optimization\n");
    println!("  Processed:   {}", report.files_processed);
    println!("  Promoted:    {}", report.files_promoted);
    println!("  Demoted:     {}", report.files_demoted);
    println!("  Failed:      {}", report.files_failed);
    println!("  Reclaimed:   {} bytes", report.space_reclaimed);
    println!("  Improvement: {:.3}", report.compression_improvement);
    println!("  Duration:    {}ms", report.duration_ms);
    for failure in &report.failures {
        println!(
            "  ✗ {} ({} → {}): {}",
            failure.path, failure.from, failure.to, failure.error
        );
    }
}

fn print_analysis(analysis: &AccessPatternAnalysis) {
    println!("📊 Access patterns\n");
    print_list("Hot", &analysis.hot_files);
    print_list("Cold", &analysis.cold_files);
    print_list("Promote", &analysis.candidates.for_promotion);
    print_list("Demote", &analysis.candidates.for_demotion);
    print_list("Archive", &analysis.candidates.for_archiving);
    println!("\nRecommendations:");
    for recommendation in &analysis.recommendations {
        println!("  - {}", recommendation);
    }
}

fn print_list(label: &str, paths: &[String]) {
    println!("  {:<8} {}", format!("{}:", label), paths.len());
    for path in paths.iter().take(20) {
        println!("    {}", path);
    }
    if paths.len() > 20 {
        println!("    ... and {} more", paths.len() - 20);
    }
}

fn print_metrics(metrics: &StorageMetrics) {
    println!("📈 Storage metrics\n");
    println!("  Tracked files: {}", metrics.tracked_files);
    println!(
        "  Stored:        {} of {} bytes ({:.1}%)",
        metrics.total_stored_size,
        metrics.total_original_size,
        metrics.overall_compression_ratio * 100.0
    );
    println!();
    for (tier, tier_metrics) in &metrics.tiers {
        println!(
            "  {:<10} files: {:<6} size: {:<10} ratio: {:.2}  reads: {:<6} avg read: {:.2}ms",
            tier.to_string(),
            tier_metrics.total_files,
            tier_metrics.total_size,
            tier_metrics.compression_ratio,
            tier_metrics.accesses,
            tier_metrics.average_access_time
        );
    }
    println!();
    println!("  Compressions:   {}", metrics.engine.total_compressions);
    println!("  Decompressions: {}", metrics.engine.total_decompressions);
    println!("  Bytes saved:    {}", metrics.engine.total_bytes_saved);
    for (algorithm, count) in &metrics.engine.strategy_usage {
        println!("    {:<10} {}", algorithm.to_string(), count);
    }
}
