//! Error types for queue operations.

use thiserror::Error;

/// Errors returned by [`WorkQueue`](super::WorkQueue) operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue was closed; the item was not enqueued.
    #[error("work queue closed, dropped {url}")]
    Closed {
        /// The URL that could not be pushed.
        url: String,
    },
}
