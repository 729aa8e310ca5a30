//! The download worker loop.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use super::shutdown::ShutdownCoordinator;
use crate::download::{DownloadStats, Downloader, FailureClass};
use crate::queue::WorkQueue;

/// Everything a worker shares with its siblings.
#[derive(Debug, Clone)]
pub(crate) struct WorkerContext {
    pub queue: Arc<WorkQueue>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub downloader: Arc<Downloader>,
    pub stats: Arc<DownloadStats>,
}

/// Runs one worker until the queue is drained and closed.
///
/// While discovery runs the worker blocks on the queue. Once the completion
/// signal fires it drains buffered URLs without waiting, then goes through
/// the close-once guard and exits. Each URL is attempted exactly once.
pub(crate) async fn run_worker(worker_id: usize, ctx: WorkerContext) -> usize {
    trace!(worker_id, "worker started");
    let mut processed = 0;

    loop {
        let next = tokio::select! {
            biased;
            url = ctx.queue.recv() => url,
            () = ctx.shutdown.wait_discovery_complete() => None,
        };
        let Some(url) = next else {
            break;
        };
        process(worker_id, &ctx, &url).await;
        processed += 1;
    }

    while let Some(url) = ctx.queue.try_recv().await {
        process(worker_id, &ctx, &url).await;
        processed += 1;
    }

    ctx.shutdown.close_queue_once();
    debug!(worker_id, processed, "worker exiting");
    processed
}

async fn process(worker_id: usize, ctx: &WorkerContext, url: &str) {
    let result = ctx.downloader.persist(url).await;
    match &result {
        Ok(outcome) => {
            debug!(worker_id, %url, hash = %outcome.hash(), "processed");
        }
        Err(e) => match e.class() {
            FailureClass::RejectedBySize | FailureClass::RejectedByContentType => {
                debug!(worker_id, %url, class = %e.class(), reason = %e, "rejected");
            }
            FailureClass::Transport => {
                warn!(worker_id, %url, error = %e, "download failed");
            }
            FailureClass::Persistence => {
                error!(worker_id, %url, error = %e, "persist failed");
            }
        },
    }
    ctx.stats.record(&result);
}
