//! Error types for the persistent index.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or appending to the index log.
#[derive(Debug, Error)]
pub enum IndexError {
    /// File system error on the index log.
    #[error("IO error on index file {path}: {source}")]
    Io {
        /// The index file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A record that would not round-trip through the log.
    #[error("invalid index record: {reason}")]
    InvalidRecord {
        /// What was wrong with it.
        reason: &'static str,
    },
}

impl IndexError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
