//! Bounded work queue and the dedup scheduler in front of it.
//!
//! # Overview
//!
//! - [`WorkQueue`] - bounded multi-consumer channel of candidate URLs with a
//!   close-once guard
//! - [`DedupScheduler`] - the only producer; filters URLs through the
//!   visited set before pushing
//! - [`QueueError`] - operation error types
//!
//! Pushing blocks while the queue is full, so a slow worker pool throttles
//! discovery. Items are never delivered twice. Ordering across consumers is
//! not guaranteed.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use harvester_core::queue::{DedupScheduler, WorkQueue};
//!
//! # async fn example() {
//! let queue = Arc::new(WorkQueue::new(100));
//! let scheduler = DedupScheduler::new(Arc::clone(&queue), Vec::<String>::new());
//! assert!(scheduler.offer("https://example.com/a.exe").await);
//! assert!(!scheduler.offer("https://example.com/a.exe").await);
//! assert_eq!(queue.recv().await.as_deref(), Some("https://example.com/a.exe"));
//! # }
//! ```

mod error;
mod scheduler;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tracing::debug;

pub use error::QueueError;
pub use scheduler::DedupScheduler;

/// Bounded FIFO-ish channel of candidate URLs shared by every worker.
///
/// Closing drops the only sender. Items already buffered stay receivable;
/// once they are drained, [`recv`](Self::recv) returns `None`.
#[derive(Debug)]
pub struct WorkQueue {
    sender: Mutex<Option<mpsc::Sender<String>>>,
    receiver: AsyncMutex<mpsc::Receiver<String>>,
    capacity: usize,
    closed: AtomicBool,
    close_count: AtomicUsize,
}

impl WorkQueue {
    /// Creates an open queue holding at most `capacity` items.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: AsyncMutex::new(receiver),
            capacity,
            closed: AtomicBool::new(false),
            close_count: AtomicUsize::new(0),
        }
    }

    /// Returns the configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes a URL, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue was closed before or while
    /// waiting for space.
    pub async fn push(&self, url: String) -> Result<(), QueueError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            return Err(QueueError::Closed { url });
        };
        sender
            .send(url)
            .await
            .map_err(|mpsc::error::SendError(url)| QueueError::Closed { url })
    }

    /// Waits for the next URL. Returns `None` once the queue is closed and empty.
    pub async fn recv(&self) -> Option<String> {
        self.receiver.lock().await.recv().await
    }

    /// Takes a buffered URL without waiting for new ones.
    pub async fn try_recv(&self) -> Option<String> {
        self.receiver.lock().await.try_recv().ok()
    }

    /// Closes the queue if nobody has yet. Returns true for the one caller that did.
    ///
    /// Safe to call any number of times from any number of tasks.
    pub fn close_once(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);
        self.close_count.fetch_add(1, Ordering::SeqCst);
        debug!("work queue closed");
        true
    }

    /// True once [`close_once`](Self::close_once) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of times the close actually executed. Never more than one.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_push_then_recv() {
        let queue = WorkQueue::new(4);
        queue.push("a".to_string()).await.unwrap();
        queue.push("b".to_string()).await.unwrap();
        assert_eq!(queue.recv().await.as_deref(), Some("a"));
        assert_eq!(queue.try_recv().await.as_deref(), Some("b"));
        assert_eq!(queue.try_recv().await, None);
    }

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let queue = Arc::new(WorkQueue::new(1));
        queue.push("first".to_string()).await.unwrap();

        let pusher = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push("second".to_string()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!pusher.is_finished(), "push should wait for space");

        assert_eq!(queue.recv().await.as_deref(), Some("first"));
        pusher.await.unwrap().unwrap();
        assert_eq!(queue.recv().await.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_buffered_items_survive_close() {
        let queue = WorkQueue::new(8);
        for i in 0..3 {
            queue.push(format!("u{i}")).await.unwrap();
        }
        assert!(queue.close_once());

        let mut drained = Vec::new();
        while let Some(url) = queue.recv().await {
            drained.push(url);
        }
        assert_eq!(drained, vec!["u0", "u1", "u2"]);
    }

    #[tokio::test]
    async fn test_push_after_close_fails() {
        let queue = WorkQueue::new(2);
        queue.close_once();
        assert_eq!(
            queue.push("late".to_string()).await,
            Err(QueueError::Closed {
                url: "late".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_close_once_only_first_caller_wins() {
        let queue = WorkQueue::new(2);
        assert!(queue.close_once());
        assert!(!queue.close_once());
        assert!(!queue.close_once());
        assert!(queue.is_closed());
        assert_eq!(queue.close_count(), 1);
    }

    #[test]
    fn test_zero_capacity_raised_to_one() {
        assert_eq!(WorkQueue::new(0).capacity(), 1);
    }
}
