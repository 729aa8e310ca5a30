//! Visited-set filter between link discovery and the work queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashSet;
use tracing::{debug, warn};

use super::WorkQueue;

/// Admits each URL to the work queue at most once per process lifetime.
///
/// The visited set is seeded with every URL recovered from the persistent
/// index, so a restarted run never re-enqueues work it already finished.
#[derive(Debug)]
pub struct DedupScheduler {
    queue: Arc<WorkQueue>,
    visited: DashSet<String>,
    offered: AtomicUsize,
    skipped_seen: AtomicUsize,
}

impl DedupScheduler {
    /// Creates a scheduler feeding `queue`, with `known_urls` already marked visited.
    pub fn new<I>(queue: Arc<WorkQueue>, known_urls: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let visited: DashSet<String> = known_urls.into_iter().collect();
        debug!(seeded = visited.len(), "visited set seeded");
        Self {
            queue,
            visited,
            offered: AtomicUsize::new(0),
            skipped_seen: AtomicUsize::new(0),
        }
    }

    /// Enqueues `url` unless it was seen before. Returns true if it was enqueued.
    ///
    /// Check-and-mark is a single atomic insert, so concurrent offers of the
    /// same URL enqueue it once. Waits while the queue is full. If the queue
    /// has been closed the mark is rolled back and false is returned.
    pub async fn offer(&self, url: &str) -> bool {
        if !self.visited.insert(url.to_string()) {
            self.skipped_seen.fetch_add(1, Ordering::Relaxed);
            debug!(%url, "already seen");
            return false;
        }

        match self.queue.push(url.to_string()).await {
            Ok(()) => {
                self.offered.fetch_add(1, Ordering::Relaxed);
                debug!(%url, "enqueued");
                true
            }
            Err(e) => {
                self.visited.remove(url);
                warn!(error = %e, "offer after queue closed");
                false
            }
        }
    }

    /// True if `url` is in the visited set.
    #[must_use]
    pub fn seen(&self, url: &str) -> bool {
        self.visited.contains(url)
    }

    /// URLs enqueued by this scheduler.
    #[must_use]
    pub fn offered(&self) -> usize {
        self.offered.load(Ordering::Relaxed)
    }

    /// Offers refused because the URL was already seen.
    #[must_use]
    pub fn skipped_seen(&self) -> usize {
        self.skipped_seen.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_url_enqueued_once() {
        let queue = Arc::new(WorkQueue::new(8));
        let scheduler = DedupScheduler::new(Arc::clone(&queue), Vec::new());

        assert!(scheduler.offer("https://example.com/a.exe").await);
        assert!(!scheduler.offer("https://example.com/a.exe").await);

        assert_eq!(scheduler.offered(), 1);
        assert_eq!(scheduler.skipped_seen(), 1);
        queue.close_once();
        assert_eq!(queue.recv().await.as_deref(), Some("https://example.com/a.exe"));
        assert_eq!(queue.recv().await, None);
    }

    #[tokio::test]
    async fn test_known_urls_never_enqueued() {
        let queue = Arc::new(WorkQueue::new(8));
        let scheduler = DedupScheduler::new(
            Arc::clone(&queue),
            vec!["https://example.com/old.exe".to_string()],
        );

        assert!(scheduler.seen("https://example.com/old.exe"));
        assert!(!scheduler.offer("https://example.com/old.exe").await);
        assert_eq!(queue.try_recv().await, None);
    }

    #[tokio::test]
    async fn test_concurrent_offers_enqueue_once() {
        let queue = Arc::new(WorkQueue::new(64));
        let scheduler = Arc::new(DedupScheduler::new(Arc::clone(&queue), Vec::new()));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let scheduler = Arc::clone(&scheduler);
            handles.push(tokio::spawn(async move {
                scheduler.offer("https://example.com/race.exe").await
            }));
        }
        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 1);
        assert_eq!(queue.try_recv().await.as_deref(), Some("https://example.com/race.exe"));
        assert_eq!(queue.try_recv().await, None);
    }

    #[tokio::test]
    async fn test_offer_after_close_rolls_back_mark() {
        let queue = Arc::new(WorkQueue::new(2));
        let scheduler = DedupScheduler::new(Arc::clone(&queue), Vec::new());
        queue.close_once();

        assert!(!scheduler.offer("https://example.com/late.exe").await);
        assert!(!scheduler.seen("https://example.com/late.exe"));
        assert_eq!(scheduler.offered(), 0);
    }
}
