//! Link discovery: where candidate URLs come from.
//!
//! The pipeline only knows the [`LinkSource`] trait. A source offers each
//! candidate URL to the [`DedupScheduler`] and returns once it has nothing
//! left to offer; returning (or failing, or panicking) is what tells the
//! pipeline that discovery is complete.
//!
//! Two sources ship with the crate:
//! - [`StaticLinkSource`] - a fixed list, useful for re-runs and tests
//! - [`SiteCrawler`] - breadth-first crawl of same-site HTML pages

mod crawler;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::queue::DedupScheduler;

pub use crawler::{CrawlConfig, DEFAULT_CANDIDATE_EXTENSIONS, DEFAULT_PAGE_CONCURRENCY, SiteCrawler};

/// Errors that end a discovery run early.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// A seed URL could not be parsed or uses an unsupported scheme.
    #[error("invalid seed URL {url}: {reason}")]
    InvalidSeed {
        /// The rejected seed.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No seed URLs were given.
    #[error("no seed URLs given")]
    NoSeeds,

    /// The page-fetching HTTP client could not be built.
    #[error("failed to build crawler HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Producer of candidate URLs.
///
/// Implementations offer URLs in any order and may offer the same URL more
/// than once; the scheduler filters repeats.
#[async_trait]
pub trait LinkSource: Send + Sync {
    /// Offers every candidate URL to `scheduler`, then returns.
    ///
    /// # Errors
    ///
    /// Returns a [`DiscoveryError`] if discovery cannot continue. URLs
    /// already offered stay queued and are still processed.
    async fn discover(&self, scheduler: &DedupScheduler) -> Result<(), DiscoveryError>;
}

/// A fixed list of candidate URLs.
#[derive(Debug, Clone, Default)]
pub struct StaticLinkSource {
    urls: Vec<String>,
}

impl StaticLinkSource {
    /// Creates a source that offers `urls` in order.
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl LinkSource for StaticLinkSource {
    async fn discover(&self, scheduler: &DedupScheduler) -> Result<(), DiscoveryError> {
        let mut accepted = 0_usize;
        for url in &self.urls {
            if scheduler.offer(url).await {
                accepted += 1;
            }
        }
        debug!(total = self.urls.len(), accepted, "static source exhausted");
        Ok(())
    }
}
