//! Durable append-only mapping of content hash to source URL.
//!
//! The index is loaded wholesale at startup. It seeds the scheduler's
//! visited set with every URL it recovered and keeps an in-memory
//! `hash -> url` map. New admissions are appended and flushed before
//! [`PersistentIndex::record`] returns. The membership check and the append
//! happen under one lock, so each digest gets at most one row: the first
//! writer wins and later writers see [`IndexOutcome::AlreadyIndexed`].
//!
//! # Example
//!
//! ```no_run
//! use harvester_core::index::{IndexOutcome, PersistentIndex};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let index = PersistentIndex::open("./index.csv").await?;
//! let hash = harvester_core::content_hash(b"payload");
//! match index.record(&hash, "https://example.com/a.exe").await? {
//!     IndexOutcome::Recorded => println!("new entry"),
//!     IndexOutcome::AlreadyIndexed { existing_url } => println!("first seen at {existing_url}"),
//! }
//! # Ok(())
//! # }
//! ```

mod codec;
mod error;

use std::path::{Path, PathBuf};

use dashmap::{DashMap, DashSet};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

pub use error::IndexError;

use crate::store::is_valid_hash;

/// One row of the index log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Hex SHA-256 digest of the stored blob.
    pub hash: String,
    /// URL the blob was first downloaded from.
    pub url: String,
}

/// Outcome of [`PersistentIndex::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A new row was appended and flushed.
    Recorded,
    /// The digest was already indexed; nothing was written.
    AlreadyIndexed {
        /// URL of the row that won.
        existing_url: String,
    },
}

/// Append-only `hash,url` log plus its in-memory view.
///
/// Designed to be wrapped in `Arc` and shared by every worker.
#[derive(Debug)]
pub struct PersistentIndex {
    path: PathBuf,
    entries: DashMap<String, String>,
    urls: DashSet<String>,
    skipped_on_load: usize,
    /// Serializes check-and-append. Held across the write and flush.
    log: Mutex<AppendLog>,
}

/// The open log file and the length of its last complete row.
#[derive(Debug)]
struct AppendLog {
    file: File,
    committed_len: u64,
    /// A failed append left bytes past `committed_len` that must go first.
    torn: bool,
    #[cfg(test)]
    fail_after: Option<usize>,
}

impl AppendLog {
    fn new(file: File, committed_len: u64) -> Self {
        Self {
            file,
            committed_len,
            torn: false,
            #[cfg(test)]
            fail_after: None,
        }
    }

    /// Appends one encoded row and flushes it.
    ///
    /// On failure the file is cut back to the last complete row, so a
    /// partial row never prefixes the next one.
    async fn append(&mut self, row: &[u8]) -> std::io::Result<()> {
        if self.torn {
            self.truncate_torn().await?;
        }
        match self.write_row(row).await {
            Ok(()) => {
                self.committed_len += row.len() as u64;
                Ok(())
            }
            Err(e) => {
                self.torn = true;
                if let Err(truncate_err) = self.truncate_torn().await {
                    warn!(error = %truncate_err, "could not cut back partial index row");
                }
                Err(e)
            }
        }
    }

    async fn truncate_torn(&mut self) -> std::io::Result<()> {
        self.file.set_len(self.committed_len).await?;
        self.torn = false;
        Ok(())
    }

    async fn write_row(&mut self, row: &[u8]) -> std::io::Result<()> {
        #[cfg(test)]
        if let Some(limit) = self.fail_after.take() {
            self.file.write_all(&row[..limit.min(row.len())]).await?;
            self.file.flush().await?;
            return Err(std::io::Error::new(
                std::io::ErrorKind::StorageFull,
                "simulated full disk",
            ));
        }
        self.file.write_all(row).await?;
        self.file.flush().await
    }
}

impl PersistentIndex {
    /// Opens (creating if needed) the index log and loads its rows.
    ///
    /// Rows that fail to parse are skipped with a warning. When the same
    /// digest appears more than once, the earliest row wins.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Io`] if the file or its parent directory cannot
    /// be created, read or opened for append.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, IndexError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| IndexError::io(parent, e))?;
        }

        let raw = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(IndexError::io(path, e)),
        };
        let parsed = codec::parse_log(&String::from_utf8_lossy(&raw));

        let entries = DashMap::new();
        let urls = DashSet::new();
        for entry in parsed.entries {
            urls.insert(entry.url.clone());
            entries.entry(entry.hash).or_insert(entry.url);
        }

        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| IndexError::io(path.clone(), e))?;

        if parsed.unterminated {
            // Keep the next append off the torn row.
            log.write_all(b"\n")
                .await
                .map_err(|e| IndexError::io(path.clone(), e))?;
            log.flush()
                .await
                .map_err(|e| IndexError::io(path.clone(), e))?;
        }

        let committed_len = log
            .metadata()
            .await
            .map_err(|e| IndexError::io(path.clone(), e))?
            .len();

        if parsed.skipped > 0 {
            warn!(skipped = parsed.skipped, "skipped unparseable index rows");
        }
        info!(
            entries = entries.len(),
            urls = urls.len(),
            "index loaded"
        );

        Ok(Self {
            path,
            entries,
            urls,
            skipped_on_load: parsed.skipped,
            log: Mutex::new(AppendLog::new(log, committed_len)),
        })
    }

    /// Returns the index file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct digests indexed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rows skipped as unparseable when the index was opened.
    #[must_use]
    pub fn skipped_on_load(&self) -> usize {
        self.skipped_on_load
    }

    /// Returns the URL recorded for a digest.
    #[must_use]
    pub fn url_for(&self, hash: &str) -> Option<String> {
        self.entries.get(hash).map(|url| url.value().clone())
    }

    /// True if the digest is indexed.
    #[must_use]
    pub fn contains_hash(&self, hash: &str) -> bool {
        self.entries.contains_key(hash)
    }

    /// True if the URL appears in any loaded or recorded row.
    #[must_use]
    pub fn contains_url(&self, url: &str) -> bool {
        self.urls.contains(url)
    }

    /// Every URL present in the index, in no particular order.
    #[must_use]
    pub fn known_urls(&self) -> Vec<String> {
        self.urls.iter().map(|url| url.key().clone()).collect()
    }

    /// Records `hash -> url` unless the digest is already indexed.
    ///
    /// The row is flushed before `Recorded` is returned.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::InvalidRecord`] for a malformed digest or empty
    /// URL, and [`IndexError::Io`] if the append or flush fails. On failure
    /// the digest stays unindexed, so a later download can record it.
    #[instrument(level = "debug", skip(self))]
    pub async fn record(&self, hash: &str, url: &str) -> Result<IndexOutcome, IndexError> {
        if !is_valid_hash(hash) {
            return Err(IndexError::InvalidRecord {
                reason: "hash is not a lowercase sha256 hex digest",
            });
        }
        if url.is_empty() {
            return Err(IndexError::InvalidRecord {
                reason: "url is empty",
            });
        }

        let mut log = self.log.lock().await;

        if let Some(existing) = self.entries.get(hash) {
            debug!(existing_url = %existing.value(), "digest already indexed");
            return Ok(IndexOutcome::AlreadyIndexed {
                existing_url: existing.value().clone(),
            });
        }

        let line = codec::encode_record(hash, url);
        log.append(line.as_bytes())
            .await
            .map_err(|e| IndexError::io(self.path.clone(), e))?;

        self.entries.insert(hash.to_string(), url.to_string());
        self.urls.insert(url.to_string());
        debug!(%url, "index row appended");
        Ok(IndexOutcome::Recorded)
    }

    /// Makes the next append write only `bytes` bytes of its row and then fail.
    #[cfg(test)]
    pub(crate) async fn fail_next_append_after(&self, bytes: usize) {
        self.log.lock().await.fail_after = Some(bytes);
    }
}
