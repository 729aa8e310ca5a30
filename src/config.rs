//! Pipeline configuration.
//!
//! [`PipelineConfig`] replaces option-by-option construction with a single
//! struct that is validated once, when the pipeline is built.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default number of concurrent download workers.
pub const DEFAULT_WORKERS: usize = 10;

/// Maximum allowed number of concurrent download workers.
pub const MAX_WORKERS: usize = 256;

/// Default capacity of the bounded work queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default maximum accepted file size (50 MiB). Files of this size or larger are rejected.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * (1 << 20);

/// Default connect timeout for download requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Content types admitted by default: generic binary stream and DOS/Windows executable.
pub const DEFAULT_ALLOWED_CONTENT_TYPES: &[&str] =
    &["application/octet-stream", "application/x-msdos-program"];

/// Errors raised by [`PipelineConfig::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Worker count outside the supported range.
    #[error("invalid worker count {value}: must be between 1 and {MAX_WORKERS}")]
    InvalidWorkers {
        /// The rejected value.
        value: usize,
    },

    /// Queue capacity of zero.
    #[error("invalid queue capacity {value}: must be at least 1")]
    InvalidQueueCapacity {
        /// The rejected value.
        value: usize,
    },

    /// Maximum file size of zero would reject everything.
    #[error("invalid max file size 0: must be greater than zero")]
    InvalidMaxFileSize,

    /// A zero timeout was given explicitly; use `None` for unbounded.
    #[error("invalid {field}: zero duration, leave unset for no timeout")]
    ZeroTimeout {
        /// Which timeout field.
        field: &'static str,
    },

    /// The content-type allow-list is empty.
    #[error("allowed content types must not be empty")]
    NoContentTypes,

    /// A path option is empty.
    #[error("{field} must not be empty")]
    EmptyPath {
        /// Which path field.
        field: &'static str,
    },
}

/// Configuration for a [`Pipeline`](crate::Pipeline) run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Directory that receives one blob per distinct digest.
    pub download_dir: PathBuf,
    /// Append-only `hash,url` log file.
    pub index_file: PathBuf,
    /// Number of concurrent download workers.
    pub workers: usize,
    /// Capacity of the bounded work queue.
    pub queue_capacity: usize,
    /// Files whose size is at least this many bytes are rejected.
    pub max_file_size: u64,
    /// Whole-request timeout per fetch. `None` means unbounded.
    pub fetch_timeout: Option<Duration>,
    /// Connect timeout per fetch. `None` means the client default.
    pub connect_timeout: Option<Duration>,
    /// Content types admitted by the gate (compared without parameters, case-insensitive).
    pub allowed_content_types: Vec<String>,
    /// Skip TLS certificate verification for download requests.
    pub accept_invalid_certs: bool,
}

impl PipelineConfig {
    /// Creates a config with default tuning for the given storage locations.
    #[must_use]
    pub fn new(download_dir: impl Into<PathBuf>, index_file: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            index_file: index_file.into(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            fetch_timeout: None,
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            allowed_content_types: DEFAULT_ALLOWED_CONTENT_TYPES
                .iter()
                .map(|ct| (*ct).to_string())
                .collect(),
            accept_invalid_certs: false,
        }
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the maximum accepted file size in bytes.
    #[must_use]
    pub fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Sets the per-fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Replaces the content-type allow-list.
    #[must_use]
    pub fn with_allowed_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_content_types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath {
                field: "download_dir",
            });
        }
        if self.index_file.as_os_str().is_empty() {
            return Err(ConfigError::EmptyPath {
                field: "index_file",
            });
        }
        if !(1..=MAX_WORKERS).contains(&self.workers) {
            return Err(ConfigError::InvalidWorkers {
                value: self.workers,
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity {
                value: self.queue_capacity,
            });
        }
        if self.max_file_size == 0 {
            return Err(ConfigError::InvalidMaxFileSize);
        }
        if self.fetch_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout {
                field: "fetch_timeout",
            });
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::ZeroTimeout {
                field: "connect_timeout",
            });
        }
        if self
            .allowed_content_types
            .iter()
            .all(|ct| ct.trim().is_empty())
        {
            return Err(ConfigError::NoContentTypes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PipelineConfig {
        PipelineConfig::new("/tmp/blobs", "/tmp/index.csv")
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = base();
        assert_eq!(config.workers, 10);
        assert_eq!(config.queue_capacity, 100);
        assert_eq!(config.max_file_size, 50 * 1024 * 1024);
        assert!(config.fetch_timeout.is_none());
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_worker_bounds() {
        assert_eq!(
            base().with_workers(0).validate(),
            Err(ConfigError::InvalidWorkers { value: 0 })
        );
        assert_eq!(base().with_workers(1).validate(), Ok(()));
        assert_eq!(base().with_workers(MAX_WORKERS).validate(), Ok(()));
        assert!(base().with_workers(MAX_WORKERS + 1).validate().is_err());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        assert_eq!(
            base().with_queue_capacity(0).validate(),
            Err(ConfigError::InvalidQueueCapacity { value: 0 })
        );
    }

    #[test]
    fn test_zero_max_size_rejected() {
        assert_eq!(
            base().with_max_file_size(0).validate(),
            Err(ConfigError::InvalidMaxFileSize)
        );
    }

    #[test]
    fn test_zero_timeout_rejected_but_none_allowed() {
        assert!(
            base()
                .with_fetch_timeout(Some(Duration::ZERO))
                .validate()
                .is_err()
        );
        assert!(base().with_fetch_timeout(None).validate().is_ok());
    }

    #[test]
    fn test_empty_content_types_rejected() {
        let config = base().with_allowed_content_types(Vec::<String>::new());
        assert_eq!(config.validate(), Err(ConfigError::NoContentTypes));
    }

    #[test]
    fn test_empty_paths_rejected() {
        let config = PipelineConfig::new("", "/tmp/index.csv");
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyPath {
                field: "download_dir"
            })
        );
    }

    #[test]
    fn test_error_display_mentions_range() {
        let msg = ConfigError::InvalidWorkers { value: 0 }.to_string();
        assert!(msg.contains("worker count 0"));
        assert!(msg.contains("256"));
    }
}
