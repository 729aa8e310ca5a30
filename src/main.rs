//! CLI entry point for the harvester tool.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use harvester_core::{CrawlConfig, Pipeline, PipelineConfig, RunSummary, SiteCrawler};
use tracing::{debug, info, warn};

mod app_config;
mod cli;

use app_config::{FileConfig, VerbositySetting, load_file_config};
use cli::Args;

const DEFAULT_DOWNLOAD_DIR: &str = "downloads";
const DEFAULT_INDEX_FILE: &str = "index.csv";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Config errors must surface before logging is configured from them
    let file_config = load_file_config(args.config.as_deref())?;

    // Priority: RUST_LOG env var > quiet flag > verbose flag > config file > info
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file_config
                .verbosity
                .map_or("info", VerbositySetting::log_level),
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, ?file_config, "configuration loaded");

    let seeds = if args.seeds.is_empty() {
        file_config.seeds.clone().unwrap_or_default()
    } else {
        args.seeds.clone()
    };
    if seeds.is_empty() {
        info!("No seed URLs provided. Pass them as arguments or set `seeds` in the config file.");
        info!("Example: harvester https://example.com/downloads/");
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline_config = build_pipeline_config(&args, &file_config);
    let crawl_config = build_crawl_config(&args, &file_config, seeds);

    let pipeline = Pipeline::new(pipeline_config)
        .await
        .context("Failed to start pipeline")?;
    let crawler = SiteCrawler::new(crawl_config).context("Failed to set up crawler")?;

    let config = pipeline.config();
    info!(
        download_dir = %config.download_dir.display(),
        index_file = %config.index_file.display(),
        workers = config.workers,
        indexed = pipeline.index().len(),
        "Harvester starting"
    );

    let summary = pipeline.run(Arc::new(crawler)).await;
    report(&summary, args.json)?;
    Ok(exit_code(&summary))
}

/// Stored blobs without an index row are the one run outcome that fails the process.
fn exit_code(summary: &RunSummary) -> ExitCode {
    if summary.durability_gaps > 0 {
        warn!(
            durability_gaps = summary.durability_gaps,
            "some stored files are missing from the index"
        );
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn build_pipeline_config(args: &Args, file: &FileConfig) -> PipelineConfig {
    let download_dir = args
        .download_dir
        .clone()
        .or_else(|| file.download_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR));
    let index_file = args
        .index_file
        .clone()
        .or_else(|| file.index_file.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_INDEX_FILE));

    let mut config = PipelineConfig::new(download_dir, index_file);
    if let Some(workers) = args.workers.map(usize::from).or(file.workers) {
        config = config.with_workers(workers);
    }
    if let Some(capacity) = args
        .queue_capacity
        .and_then(|c| usize::try_from(c).ok())
        .or(file.queue_capacity)
    {
        config = config.with_queue_capacity(capacity);
    }
    if let Some(max_size) = args.max_size.or(file.max_file_size) {
        config = config.with_max_file_size(max_size);
    }
    if let Some(secs) = args.timeout.or(file.fetch_timeout_secs) {
        config = config.with_fetch_timeout(timeout_from_secs(secs));
    }
    config.accept_invalid_certs = args.insecure || file.accept_invalid_certs.unwrap_or(false);
    config
}

fn build_crawl_config(args: &Args, file: &FileConfig, seeds: Vec<String>) -> CrawlConfig {
    let mut config = CrawlConfig::new(seeds).with_max_depth(args.max_depth);

    let domains = if args.domains.is_empty() {
        file.allowed_domains.clone().unwrap_or_default()
    } else {
        args.domains.clone()
    };
    config = config.with_allowed_domains(domains);

    let extensions = if args.extensions.is_empty() {
        file.candidate_extensions.clone()
    } else {
        Some(args.extensions.clone())
    };
    if let Some(extensions) = extensions {
        config = config.with_candidate_extensions(extensions);
    }

    if let Some(pages) = args.page_concurrency.map(usize::from).or(file.page_concurrency) {
        config = config.with_page_concurrency(pages);
    }
    if let Some(secs) = args.timeout.or(file.fetch_timeout_secs) {
        config = config.with_fetch_timeout(timeout_from_secs(secs));
    }
    config.accept_invalid_certs = args.insecure || file.accept_invalid_certs.unwrap_or(false);
    config
}

fn timeout_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn report(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
        println!("{rendered}");
    } else {
        info!(
            stored = summary.stored,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            failed = summary.failed,
            offered = summary.offered,
            skipped_seen = summary.skipped_seen,
            discovery_failed = summary.discovery_failed,
            elapsed_ms = summary.elapsed_ms,
            "Harvest complete"
        );
    }
    Ok(())
}
