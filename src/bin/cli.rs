//! Story Crawler CLI
//!
//! Crawls one collection and exports its stories into a local directory.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use story_crawler::{
    error::{AppError, Result},
    models::{Config, CrawlState, StrategyKind},
    pipeline,
    utils::shutdown::ShutdownSignal,
};

/// Download exported stories from a collection
#[derive(Parser, Debug)]
#[command(
    name = "story-crawler",
    version,
    about = "Download exported stories from a collection"
)]
struct Cli {
    /// Collection (user) id to crawl
    collection: String,

    /// Output directory
    #[arg(short, long, default_value = "downloads")]
    output: PathBuf,

    /// Delay between requests in seconds
    #[arg(short, long)]
    delay: Option<f64>,

    /// Items requested per listing page
    #[arg(short = 's', long)]
    page_size: Option<usize>,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "crawler.toml")]
    config: PathBuf,

    /// How exports are downloaded
    #[arg(long, value_enum)]
    strategy: Option<StrategyKind>,

    /// Hard ceiling on listing pages
    #[arg(long)]
    max_pages: Option<u32>,

    /// Only list what would be downloaded
    #[arg(long)]
    list_only: bool,

    /// Write a JSON run report to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Flags take precedence over the config file.
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(delay) = self.delay {
            config.crawler.request_delay_ms = (delay.max(0.0) * 1000.0).round() as u64;
        }
        if let Some(page_size) = self.page_size {
            config.crawler.page_size = page_size;
        }
        if let Some(strategy) = self.strategy {
            config.download.strategy = strategy;
        }
        if let Some(max_pages) = self.max_pages {
            config.crawler.max_pages = max_pages;
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Story crawler starting...");

    let mut config = if cli.config.exists() {
        Config::load_or_default(&cli.config)
    } else {
        log::debug!("No config at {}, using defaults", cli.config.display());
        Config::default()
    };
    cli.apply_overrides(&mut config);

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    let shutdown = ShutdownSignal::new();
    shutdown.listen_for_ctrl_c();

    let report = pipeline::run_crawler(
        Arc::new(config),
        &cli.collection,
        &cli.output,
        cli.list_only,
        shutdown,
    )
    .await?;

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
        log::info!("Report saved to {}", path.display());
    }

    match report.state {
        CrawlState::Done(reason) => {
            log::info!("Done! ({})", reason);
            Ok(())
        }
        CrawlState::Aborted(reason) => Err(AppError::Aborted(reason.to_string())),
    }
}
