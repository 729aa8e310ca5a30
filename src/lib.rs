//! Harvester Core Library
//!
//! This library provides the crawl-to-download pipeline behind the
//! `harvester` tool: candidate URLs discovered on seed sites are filtered,
//! queued, fetched by a fixed pool of workers, gated on size and content
//! type, and persisted exactly once per distinct SHA-256 digest.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Pipeline configuration, validated once at construction
//! - [`discovery`] - Link Discovery boundary and the same-site HTML crawler
//! - [`download`] - Admission gate, HTTP client and the per-URL persist step
//! - [`index`] - Durable append-only `hash,url` log backing deduplication
//! - [`pipeline`] - Worker pool, shutdown coordination and `Pipeline::run`
//! - [`queue`] - Bounded work queue and the dedup scheduler in front of it
//! - [`store`] - Content-addressed blob storage

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod discovery;
pub mod download;
pub mod index;
pub mod pipeline;
pub mod queue;
pub mod store;
pub(crate) mod user_agent;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use config::{ConfigError, PipelineConfig};
pub use discovery::{CrawlConfig, DiscoveryError, LinkSource, SiteCrawler, StaticLinkSource};
pub use download::{
    DownloadError, DownloadStats, Downloader, FailureClass, Gate, HttpClient, PersistOutcome, Rejection,
    ResponseMeta,
};
pub use index::{IndexEntry, IndexError, IndexOutcome, PersistentIndex};
pub use pipeline::{Pipeline, PipelineError, RunSummary, ShutdownCoordinator, ShutdownState};
pub use queue::{DedupScheduler, QueueError, WorkQueue};
pub use store::{ContentStore, StoreError, StoredFile, content_hash};
