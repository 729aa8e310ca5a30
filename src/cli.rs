//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Crawl seed sites and keep every reachable binary exactly once.
///
/// Harvester walks HTML pages starting from the seed URLs, downloads every
/// link whose path ends in a candidate extension, and stores each distinct
/// body once under its SHA-256 hash. An index file records which URL first
/// produced each hash, so re-runs skip URLs that were already harvested.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(author, version, about)]
pub struct Args {
    /// Seed URLs to start crawling from
    #[arg(value_name = "URL")]
    pub seeds: Vec<String>,

    /// Directory for downloaded blobs (default: ./downloads)
    #[arg(short = 'o', long)]
    pub download_dir: Option<PathBuf>,

    /// Index file mapping content hashes to source URLs (default: ./index.csv)
    #[arg(short = 'i', long)]
    pub index_file: Option<PathBuf>,

    /// Number of concurrent download workers (1-256)
    #[arg(short = 'w', long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub workers: Option<u16>,

    /// Capacity of the bounded work queue
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub queue_capacity: Option<u64>,

    /// Maximum accepted file size in bytes
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_size: Option<u64>,

    /// Per-request timeout in seconds (0 disables the timeout)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(0..=3600))]
    pub timeout: Option<u64>,

    /// Restrict crawling to this domain and its subdomains (repeatable)
    #[arg(short = 'd', long = "domain", value_name = "DOMAIN")]
    pub domains: Vec<String>,

    /// File extension that marks a link as a download candidate (repeatable)
    #[arg(short = 'e', long = "ext", value_name = "EXT")]
    pub extensions: Vec<String>,

    /// Maximum link depth to follow from the seeds (unbounded if omitted)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Number of HTML pages fetched concurrently while crawling (1-64)
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=64))]
    pub page_concurrency: Option<u16>,

    /// Accept invalid TLS certificates
    #[arg(long)]
    pub insecure: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Config file to load instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["harvester"]).unwrap();
        assert!(args.seeds.is_empty());
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert!(args.workers.is_none());
        assert!(args.download_dir.is_none());
        assert!(!args.insecure);
        assert!(!args.json);
    }

    #[test]
    fn test_cli_positional_seeds() {
        let args = Args::try_parse_from([
            "harvester",
            "https://example.com/",
            "https://mirror.example.org/pub/",
        ])
        .unwrap();
        assert_eq!(
            args.seeds,
            vec!["https://example.com/", "https://mirror.example.org/pub/"]
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["harvester", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["harvester", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_conflicts_with_verbose() {
        let err = Args::try_parse_from(["harvester", "-q", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["harvester", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let err = Args::try_parse_from(["harvester", "--invalid-flag"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_cli_workers_range() {
        let args = Args::try_parse_from(["harvester", "-w", "256"]).unwrap();
        assert_eq!(args.workers, Some(256));

        let err = Args::try_parse_from(["harvester", "-w", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let err = Args::try_parse_from(["harvester", "--workers", "257"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_page_concurrency_range() {
        let err = Args::try_parse_from(["harvester", "--page-concurrency", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let err = Args::try_parse_from(["harvester", "--page-concurrency", "65"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_zero_queue_capacity_rejected() {
        let err = Args::try_parse_from(["harvester", "--queue-capacity", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_repeatable_domains_and_extensions() {
        let args = Args::try_parse_from([
            "harvester",
            "-d",
            "example.com",
            "--domain",
            "example.org",
            "--ext",
            ".msi",
            "-e",
            "zip",
        ])
        .unwrap();
        assert_eq!(args.domains, vec!["example.com", "example.org"]);
        assert_eq!(args.extensions, vec![".msi", "zip"]);
    }

    #[test]
    fn test_cli_paths_and_limits() {
        let args = Args::try_parse_from([
            "harvester",
            "-o",
            "/tmp/blobs",
            "-i",
            "/tmp/index.csv",
            "--max-size",
            "1024",
            "--timeout",
            "0",
            "--max-depth",
            "2",
            "--page-concurrency",
            "16",
            "--insecure",
            "--json",
        ])
        .unwrap();
        assert_eq!(args.download_dir, Some(PathBuf::from("/tmp/blobs")));
        assert_eq!(args.index_file, Some(PathBuf::from("/tmp/index.csv")));
        assert_eq!(args.max_size, Some(1024));
        assert_eq!(args.timeout, Some(0));
        assert_eq!(args.max_depth, Some(2));
        assert_eq!(args.page_concurrency, Some(16));
        assert!(args.insecure);
        assert!(args.json);
    }
}
