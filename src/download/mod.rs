//! Gated fetch-and-persist of candidate URLs.
//!
//! This module decides whether a candidate URL is worth keeping and, if it
//! is, stores its body exactly once per content digest.
//!
//! # Features
//!
//! - Two-point admission gate over declared size and content type
//! - Optional `HEAD` probe as an early exit before the body is fetched
//! - Body reads capped at the configured maximum size
//! - Typed errors mapped onto a four-class failure taxonomy
//!
//! # Example
//!
//! ```
//! use harvester_core::download::{Gate, Rejection, ResponseMeta};
//!
//! let gate = Gate::new(1000, ["application/octet-stream"]);
//! let meta = ResponseMeta::new(Some(1000), Some("application/octet-stream"));
//! assert!(matches!(gate.check(&meta), Err(Rejection::TooLarge { .. })));
//! ```

mod client;
mod constants;
mod engine;
mod error;
mod gate;

pub use client::{HttpClient, read_capped_body};
pub use engine::{DownloadStats, Downloader, PersistOutcome};
pub use error::{DownloadError, FailureClass};
pub use gate::{Gate, Rejection, ResponseMeta};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
