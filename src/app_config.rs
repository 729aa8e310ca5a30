//! Application configuration loading for CLI defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use harvester_core::config::MAX_WORKERS;

/// File-backed defaults for the harvester binary.
///
/// The format is a flat `key = value` subset of TOML: double-quoted strings,
/// integers, `true`/`false`, and single-line arrays of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Directory for downloaded blobs.
    pub download_dir: Option<PathBuf>,
    /// Index file path.
    pub index_file: Option<PathBuf>,
    /// Worker count (same range as CLI).
    pub workers: Option<usize>,
    /// Work queue capacity.
    pub queue_capacity: Option<usize>,
    /// Maximum accepted file size in bytes.
    pub max_file_size: Option<u64>,
    /// Per-request timeout in seconds, 0 for none.
    pub fetch_timeout_secs: Option<u64>,
    /// Domain allow-list for the crawler.
    pub allowed_domains: Option<Vec<String>>,
    /// Seed URLs used when none are given on the command line.
    pub seeds: Option<Vec<String>>,
    /// Pages fetched concurrently while crawling.
    pub page_concurrency: Option<usize>,
    /// Candidate file extensions.
    pub candidate_extensions: Option<Vec<String>>,
    /// Accept invalid TLS certificates.
    pub accept_invalid_certs: Option<bool>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(workers) = self.workers
            && !(1..=MAX_WORKERS).contains(&workers)
        {
            bail!(
                "Invalid config value for `workers`: {workers}. Expected range: 1..={MAX_WORKERS}"
            );
        }
        if self.queue_capacity == Some(0) {
            bail!("Invalid config value for `queue_capacity`: 0. Expected at least 1");
        }
        if self.max_file_size == Some(0) {
            bail!("Invalid config value for `max_file_size`: 0. Expected at least 1");
        }
        if let Some(pages) = self.page_concurrency
            && !(1..=64).contains(&pages)
        {
            bail!("Invalid config value for `page_concurrency`: {pages}. Expected range: 1..=64");
        }
        if let Some(timeout) = self.fetch_timeout_secs
            && timeout > 3600
        {
            bail!(
                "Invalid config value for `fetch_timeout_secs`: {timeout}. Expected range: 0..=3600"
            );
        }
        Ok(())
    }
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log level used when neither `RUST_LOG` nor a CLI flag says otherwise.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/harvester/config.toml`
/// 2. `$HOME/.config/harvester/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("harvester")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("harvester")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist. Without one, the default location is used
/// if a file is present there, and an empty config otherwise.
pub fn load_file_config(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return read_config_file(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.is_file() => read_config_file(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn read_config_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "download_dir" => {
                cfg.download_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "index_file" => {
                cfg.index_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "workers" => {
                cfg.workers = Some(parse_integer_usize(value).with_context(invalid)?);
            }
            "queue_capacity" => {
                cfg.queue_capacity = Some(parse_integer_usize(value).with_context(invalid)?);
            }
            "max_file_size" => {
                cfg.max_file_size = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "fetch_timeout_secs" => {
                cfg.fetch_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "allowed_domains" => {
                cfg.allowed_domains = Some(parse_string_array(value).with_context(invalid)?);
            }
            "seeds" => {
                cfg.seeds = Some(parse_string_array(value).with_context(invalid)?);
            }
            "page_concurrency" => {
                cfg.page_concurrency = Some(parse_integer_usize(value).with_context(invalid)?);
            }
            "candidate_extensions" => {
                cfg.candidate_extensions = Some(parse_string_array(value).with_context(invalid)?);
            }
            "accept_invalid_certs" => {
                cfg.accept_invalid_certs = Some(parse_boolean(value).with_context(invalid)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    let raw_value = raw_value.trim();
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    let inner = &raw_value[1..raw_value.len() - 1];
    if inner.contains('"') {
        bail!("Unexpected quote inside string");
    }
    Ok(inner.to_string())
}

fn parse_string_array(raw_value: &str) -> Result<Vec<String>> {
    let Some(inner) = raw_value
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        bail!("Expected array of strings like [\"a\", \"b\"]");
    };
    let inner = inner.trim();
    if inner.is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(parse_string_literal)
        .collect()
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_integer_usize(raw_value: &str) -> Result<usize> {
    let value = parse_integer_u64(raw_value)?;
    usize::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for usize"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}
