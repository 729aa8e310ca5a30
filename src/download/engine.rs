//! The per-URL download step: probe, gate, fetch, gate again, persist.
//!
//! [`Downloader::persist`] is the only operation workers call. It never
//! retries. A rejection or transport failure leaves no trace on disk; a
//! store failure leaves no blob under a digest name; an index-log failure
//! leaves a stored blob without its record and is reported as a
//! durability gap.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use harvester_core::{ContentStore, Downloader, PersistentIndex, PipelineConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PipelineConfig::new("./blobs", "./index.csv");
//! let store = Arc::new(ContentStore::open(&config.download_dir).await?);
//! let index = Arc::new(PersistentIndex::open(&config.index_file).await?);
//! let downloader = Downloader::from_config(&config, store, index)?;
//! let outcome = downloader.persist("https://example.com/setup.exe").await?;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, error, info, instrument};

use super::client::{HttpClient, read_capped_body};
use super::error::{DownloadError, FailureClass};
use super::gate::{Gate, ResponseMeta};
use crate::config::PipelineConfig;
use crate::index::{IndexOutcome, PersistentIndex};
use crate::store::ContentStore;

/// Successful outcome of [`Downloader::persist`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// This URL won: its digest was recorded in the index.
    Stored {
        /// Hex SHA-256 of the body.
        hash: String,
        /// False if a blob with this digest was already on disk.
        newly_written: bool,
    },
    /// The body's digest was already indexed under another URL.
    DuplicateContent {
        /// Hex SHA-256 of the body.
        hash: String,
        /// URL recorded for the digest.
        existing_url: String,
    },
}

impl PersistOutcome {
    /// Returns the content digest.
    #[must_use]
    pub fn hash(&self) -> &str {
        match self {
            Self::Stored { hash, .. } | Self::DuplicateContent { hash, .. } => hash,
        }
    }
}

/// Statistics from a pipeline run.
///
/// Uses atomic counters so every worker can update them concurrently.
#[derive(Debug, Default)]
pub struct DownloadStats {
    stored: AtomicUsize,
    duplicates: AtomicUsize,
    rejected: AtomicUsize,
    failed: AtomicUsize,
    durability_gaps: AtomicUsize,
}

impl DownloadStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// URLs whose digest was newly recorded.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.stored.load(Ordering::SeqCst)
    }

    /// URLs whose body matched an already-indexed digest.
    #[must_use]
    pub fn duplicates(&self) -> usize {
        self.duplicates.load(Ordering::SeqCst)
    }

    /// URLs refused by the gate.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.rejected.load(Ordering::SeqCst)
    }

    /// URLs that failed on transport or persistence.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Subset of `failed` where a stored blob is missing its index row.
    #[must_use]
    pub fn durability_gaps(&self) -> usize {
        self.durability_gaps.load(Ordering::SeqCst)
    }

    /// Total URLs processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.stored() + self.duplicates() + self.rejected() + self.failed()
    }

    /// Counts one finished `persist` call.
    pub fn record(&self, result: &Result<PersistOutcome, DownloadError>) {
        match result {
            Ok(PersistOutcome::Stored { .. }) => {
                self.stored.fetch_add(1, Ordering::SeqCst);
            }
            Ok(PersistOutcome::DuplicateContent { .. }) => {
                self.duplicates.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => match e.class() {
                FailureClass::RejectedBySize | FailureClass::RejectedByContentType => {
                    self.rejected.fetch_add(1, Ordering::SeqCst);
                }
                FailureClass::Transport | FailureClass::Persistence => {
                    self.failed.fetch_add(1, Ordering::SeqCst);
                    if e.is_durability_gap() {
                        self.durability_gaps.fetch_add(1, Ordering::SeqCst);
                    }
                }
            },
        }
    }
}

/// Fetches one URL through the gate and persists it exactly once per digest.
///
/// Shared by all workers behind an `Arc`; the store and index it writes to
/// are themselves safe for concurrent use.
#[derive(Debug)]
pub struct Downloader {
    client: HttpClient,
    gate: Gate,
    store: Arc<ContentStore>,
    index: Arc<PersistentIndex>,
}

impl Downloader {
    /// Assembles a downloader from its parts.
    #[must_use]
    pub fn new(
        client: HttpClient,
        gate: Gate,
        store: Arc<ContentStore>,
        index: Arc<PersistentIndex>,
    ) -> Self {
        Self {
            client,
            gate,
            store,
            index,
        }
    }

    /// Builds the HTTP client and gate described by `config`.
    ///
    /// # Errors
    ///
    /// Returns the `reqwest::Error` raised while building the HTTP client.
    pub fn from_config(
        config: &PipelineConfig,
        store: Arc<ContentStore>,
        index: Arc<PersistentIndex>,
    ) -> Result<Self, reqwest::Error> {
        let client = HttpClient::new(config)?;
        Ok(Self::new(client, Gate::from_config(config), store, index))
    }

    /// Probes, fetches, gates and persists `url`.
    ///
    /// A failed probe is not a rejection; the full response is always gated.
    ///
    /// # Errors
    ///
    /// See [`DownloadError::class`] for how each error maps onto the failure
    /// taxonomy. Only [`DownloadError::Index`] means a blob was written
    /// without its record.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn persist(&self, url: &str) -> Result<PersistOutcome, DownloadError> {
        let probe = match self.client.probe(url).await {
            Ok(meta) => Some(meta),
            Err(e) => {
                debug!(error = %e, "probe unavailable, gating on full response only");
                None
            }
        };
        if let Some(meta) = &probe {
            self.gate
                .check(meta)
                .map_err(|rejection| DownloadError::rejected(url, rejection))?;
        }

        let response = self.client.get(url).await?;
        let body_meta = ResponseMeta::from_headers(response.headers());
        // HEAD metadata, when present, was already checked above.
        self.gate
            .admit(None, &body_meta)
            .map_err(|rejection| DownloadError::rejected(url, rejection))?;

        let body = read_capped_body(response, url, self.gate.max_size()).await?;
        self.persist_body(url, &body).await
    }

    /// Stores `body` under its digest and records `digest -> url` if unseen.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Store`] if the blob cannot be written and
    /// [`DownloadError::Index`] if the record cannot be appended.
    pub async fn persist_body(
        &self,
        url: &str,
        body: &[u8],
    ) -> Result<PersistOutcome, DownloadError> {
        let stored = self
            .store
            .put(body)
            .await
            .map_err(|e| DownloadError::store(url, e))?;

        match self.index.record(&stored.hash, url).await {
            Ok(IndexOutcome::Recorded) => {
                info!(hash = %stored.hash, bytes = stored.size, "stored");
                Ok(PersistOutcome::Stored {
                    hash: stored.hash,
                    newly_written: stored.newly_written,
                })
            }
            Ok(IndexOutcome::AlreadyIndexed { existing_url }) => {
                debug!(hash = %stored.hash, %existing_url, "content already indexed");
                Ok(PersistOutcome::DuplicateContent {
                    hash: stored.hash,
                    existing_url,
                })
            }
            Err(e) => {
                error!(
                    hash = %stored.hash,
                    error = %e,
                    "blob stored but index record lost"
                );
                Err(DownloadError::index(url, stored.hash, e))
            }
        }
    }
}
