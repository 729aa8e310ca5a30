//! The crawl-to-download pipeline.
//!
//! [`Pipeline::run`] wires one discovery task and a fixed pool of workers
//! around a bounded [`WorkQueue`]:
//!
//! ```text
//! LinkSource -> DedupScheduler -> WorkQueue -> N workers -> Downloader
//!      |                                           ^
//!      +------ completion -> ShutdownCoordinator --+
//! ```
//!
//! The run returns once discovery has finished, every buffered URL has been
//! attempted, and the queue has been closed exactly once.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use harvester_core::{Pipeline, PipelineConfig, StaticLinkSource};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pipeline = Pipeline::new(PipelineConfig::new("./blobs", "./index.csv")).await?;
//! let source = Arc::new(StaticLinkSource::new(["https://example.com/setup.exe"]));
//! let summary = pipeline.run(source).await;
//! println!("stored {} new files", summary.stored);
//! # Ok(())
//! # }
//! ```

mod shutdown;
mod worker;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument};

pub use shutdown::{CompletionGuard, ShutdownCoordinator, ShutdownState};

use self::worker::{WorkerContext, run_worker};
use crate::config::{ConfigError, PipelineConfig};
use crate::discovery::LinkSource;
use crate::download::{DownloadStats, Downloader};
use crate::index::{IndexError, PersistentIndex};
use crate::queue::{DedupScheduler, WorkQueue};
use crate::store::{ContentStore, StoreError};

/// Startup failures. Nothing after startup is fatal to a run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// The download directory could not be created.
    #[error("cannot open content store: {0}")]
    Store(#[from] StoreError),

    /// The index file could not be opened or read.
    #[error("cannot open index: {0}")]
    Index(#[from] IndexError),

    /// The download HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// URLs whose content was newly indexed.
    pub stored: usize,
    /// URLs whose content was already indexed under another URL.
    pub duplicates: usize,
    /// URLs refused by the gate.
    pub rejected: usize,
    /// URLs that failed on transport or persistence.
    pub failed: usize,
    /// Stored blobs whose index record could not be written.
    pub durability_gaps: usize,
    /// URLs the scheduler enqueued.
    pub offered: usize,
    /// Offers dropped because the URL was already seen.
    pub skipped_seen: usize,
    /// True if discovery returned an error or panicked.
    pub discovery_failed: bool,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
}

impl RunSummary {
    /// URLs the workers attempted.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.stored + self.duplicates + self.rejected + self.failed
    }
}

/// A validated, ready-to-run pipeline.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<ContentStore>,
    index: Arc<PersistentIndex>,
    downloader: Arc<Downloader>,
}

impl Pipeline {
    /// Validates `config`, opens the store and index, and builds the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns a [`PipelineError`] for an invalid config or if the download
    /// directory or index file cannot be created or opened.
    #[instrument(skip(config), fields(download_dir = %config.download_dir.display()))]
    pub async fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let store = Arc::new(ContentStore::open(&config.download_dir).await?);
        let index = Arc::new(PersistentIndex::open(&config.index_file).await?);
        let downloader = Arc::new(
            Downloader::from_config(&config, Arc::clone(&store), Arc::clone(&index))
                .map_err(PipelineError::HttpClient)?,
        );
        Ok(Self {
            config,
            store,
            index,
            downloader,
        })
    }

    /// Returns the validated configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the content store.
    #[must_use]
    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    /// Returns the persistent index.
    #[must_use]
    pub fn index(&self) -> &Arc<PersistentIndex> {
        &self.index
    }

    /// Runs discovery and the worker pool to completion.
    ///
    /// URLs already in the index are never enqueued. Per-URL failures are
    /// logged and counted, never propagated.
    #[instrument(skip(self, source), fields(workers = self.config.workers))]
    pub async fn run(&self, source: Arc<dyn LinkSource>) -> RunSummary {
        let started = Instant::now();
        let queue = Arc::new(WorkQueue::new(self.config.queue_capacity));
        let scheduler = Arc::new(DedupScheduler::new(
            Arc::clone(&queue),
            self.index.known_urls(),
        ));
        let shutdown = Arc::new(ShutdownCoordinator::new(Arc::clone(&queue)));
        let stats = Arc::new(DownloadStats::new());

        let discovery = {
            let guard = shutdown.completion_guard();
            let scheduler = Arc::clone(&scheduler);
            tokio::spawn(async move {
                let _guard = guard;
                source.discover(&scheduler).await
            })
        };

        let ctx = WorkerContext {
            queue: Arc::clone(&queue),
            shutdown: Arc::clone(&shutdown),
            downloader: Arc::clone(&self.downloader),
            stats: Arc::clone(&stats),
        };
        let workers: Vec<_> = (0..self.config.workers)
            .map(|worker_id| tokio::spawn(run_worker(worker_id, ctx.clone())))
            .collect();
        info!(workers = workers.len(), "pipeline started");

        let discovery_failed = match discovery.await {
            Ok(Ok(())) => false,
            Ok(Err(e)) => {
                error!(error = %e, "discovery failed");
                true
            }
            Err(e) => {
                error!(error = %e, "discovery task panicked");
                true
            }
        };

        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
        shutdown.close_queue_once();

        let summary = RunSummary {
            stored: stats.stored(),
            duplicates: stats.duplicates(),
            rejected: stats.rejected(),
            failed: stats.failed(),
            durability_gaps: stats.durability_gaps(),
            offered: scheduler.offered(),
            skipped_seen: scheduler.skipped_seen(),
            discovery_failed,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            stored = summary.stored,
            duplicates = summary.duplicates,
            rejected = summary.rejected,
            failed = summary.failed,
            offered = summary.offered,
            elapsed_ms = summary.elapsed_ms,
            "run complete"
        );
        summary
    }
}
