//! Error types for the download module.
//!
//! Every per-URL failure is a [`DownloadError`]. Workers contain these
//! errors and keep going; [`DownloadError::class`] maps each one onto the
//! four failure classes used for logging and statistics.

use std::fmt;

use thiserror::Error;

use super::gate::Rejection;
use crate::index::IndexError;
use crate::store::StoreError;

/// Coarse classification of a per-URL failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// Policy rejection on size. Expected, not escalated.
    RejectedBySize,
    /// Policy rejection on content type. Expected, not escalated.
    RejectedByContentType,
    /// Network, DNS, TLS or HTTP status failure. Attempt abandoned, no retry.
    Transport,
    /// Blob or index-log write failure.
    Persistence,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RejectedBySize => "rejected_by_size",
            Self::RejectedByContentType => "rejected_by_content_type",
            Self::Transport => "transport",
            Self::Persistence => "persistence",
        };
        write!(f, "{label}")
    }
}

/// Errors that can occur while fetching and persisting one URL.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response on the full fetch (4xx, 5xx).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The admission gate refused the URL.
    #[error("rejected {url}: {rejection}")]
    Rejected {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        rejection: Rejection,
    },

    /// Writing the blob to the content store failed.
    #[error("storing {url} failed: {source}")]
    Store {
        /// The URL whose body could not be stored.
        url: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },

    /// The blob was stored but its index record could not be appended.
    #[error("index record for {url} (sha256 {hash}) not persisted: {source}")]
    Index {
        /// The URL whose record was lost.
        url: String,
        /// Digest of the already-stored blob.
        hash: String,
        /// The underlying index error.
        #[source]
        source: IndexError,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::timeout(url);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a gate rejection error.
    pub fn rejected(url: impl Into<String>, rejection: Rejection) -> Self {
        Self::Rejected {
            url: url.into(),
            rejection,
        }
    }

    /// Creates a content store error.
    pub fn store(url: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            url: url.into(),
            source,
        }
    }

    /// Creates an index-log error for an already-stored blob.
    pub fn index(url: impl Into<String>, hash: impl Into<String>, source: IndexError) -> Self {
        Self::Index {
            url: url.into(),
            hash: hash.into(),
            source,
        }
    }

    /// Maps the error onto its failure class.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Rejected {
                rejection: Rejection::TooLarge { .. },
                ..
            } => FailureClass::RejectedBySize,
            Self::Rejected {
                rejection: Rejection::WrongContentType { .. },
                ..
            } => FailureClass::RejectedByContentType,
            Self::Network { .. }
            | Self::Timeout { .. }
            | Self::HttpStatus { .. }
            | Self::InvalidUrl { .. } => FailureClass::Transport,
            Self::Store { .. } | Self::Index { .. } => FailureClass::Persistence,
        }
    }

    /// True for policy rejections, which are expected and not escalated.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }

    /// True when a stored blob is missing its index record: a durability gap.
    #[must_use]
    pub fn is_durability_gap(&self) -> bool {
        matches!(self, Self::Index { .. })
    }
}

// Note on From trait implementations:
// There is no `From<reqwest::Error>` or `From<StoreError>` because every
// variant needs the URL for context. Use the helper constructors.
