//! Weir main entry point
//!
//! This is the command-line interface for the Weir crawl pipeline.

use anyhow::Context;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use weir::config::{load_config_with_hash, Config};
use weir::crawler::run_crawl;
use weir::output::{load_statistics, print_statistics};
use weir::storage::SqliteStorage;

/// Weir: a bounded-concurrency crawl pipeline
///
/// Weir fetches pages, extracts structured records from them and persists
/// those records, with a fixed worker pool per stage and bounded queues
/// between stages. The run ends once the configured number of records has
/// been persisted or there is nothing left to crawl.
#[derive(Parser, Debug)]
#[command(name = "weir")]
#[command(version)]
#[command(about = "A bounded-concurrency crawl pipeline", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Clear visited URLs and stored records before crawling
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    fresh: bool,

    /// Validate config and show the stage layout without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.fresh, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("weir=info,warn"),
            1 => EnvFilter::new("weir=debug,info"),
            2 => EnvFilter::new("weir=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the validated stage layout
fn handle_dry_run(config: &Config) {
    println!("=== Weir Dry Run ===\n");

    println!("Crawl:");
    println!("  Target records: {}", config.crawl.target);
    println!("  Max URLs: {}", config.crawl.max_urls);
    println!("  Max depth: {}", config.crawl.max_depth);
    println!("  Allowed schemes: {}", config.crawl.allowed_schemes.join(", "));
    println!("  Dedup mode: {:?}", config.crawl.dedup_mode);

    println!("\nStages:");
    println!(
        "  fetch    pool {:>3}  -> extract queue ceiling {}  (timeout {}ms)",
        config.fetch.pool_size, config.fetch.queue_ceiling, config.fetch.timeout_ms
    );
    println!(
        "  extract  pool {:>3}  -> persist queue ceiling {}",
        config.extract.pool_size, config.extract.queue_ceiling
    );
    println!("  persist  pool {:>3}", config.persist.pool_size);

    println!("\nExtraction:");
    println!("  Item selector: {}", config.extract.item_selector);
    println!("  Identifier selectors: {}", config.extract.id_selectors.join(" | "));
    println!(
        "  Description selectors: {}",
        config.extract.description_selectors.join(" | ")
    );

    println!("\nUser Agent:");
    println!(
        "  {}/{} (+{}; {})",
        config.user_agent.crawler_name,
        config.user_agent.crawler_version,
        config.user_agent.contact_url,
        config.user_agent.contact_email
    );

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSeeds ({}):", config.crawl.seeds.len());
    for seed in &config.crawl.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path))
        .context("failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, fresh: bool, config_hash: &str) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh crawl (clearing previous state)");
    }
    tracing::info!(
        "Seeds: {}, target: {} records",
        config.crawl.seeds.len(),
        config.crawl.target
    );

    match run_crawl(config, fresh, config_hash).await {
        Ok(report) => {
            tracing::info!(
                "Crawl finished ({}): {} records persisted",
                report.reason,
                report.persisted
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
