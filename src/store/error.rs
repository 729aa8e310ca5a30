//! Error types for the content store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while writing or reading blobs.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error on a blob or temp file.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A name that is not a lowercase 64-character hex digest.
    #[error("invalid content hash: {hash:?}")]
    InvalidHash {
        /// The rejected name.
        hash: String,
    },
}

impl StoreError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
