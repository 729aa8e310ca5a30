//! Termination protocol between link discovery and the worker pool.
//!
//! The coordinator moves through three states:
//!
//! - `Running`: discovery is still offering URLs, workers block on the queue.
//! - `Draining`: discovery signalled completion; workers take whatever is
//!   still buffered without waiting for more.
//! - `Closed`: one worker closed the queue through the close-once guard;
//!   everyone else finds it empty and closed and exits.
//!
//! The completion signal is a `watch` channel that only ever goes from
//! `false` to `true`. It is usually raised by a [`CompletionGuard`] owned by
//! the discovery task, so a discovery failure or panic still ends the run.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::queue::WorkQueue;

/// Observable phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Discovery still producing.
    Running,
    /// Discovery finished; buffered work is being drained.
    Draining,
    /// Queue closed. Terminal.
    Closed,
}

impl fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        write!(f, "{label}")
    }
}

/// Owns the one-shot discovery-complete signal and the queue's close path.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    queue: Arc<WorkQueue>,
    discovery_done: watch::Sender<bool>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator in the `Running` state.
    #[must_use]
    pub fn new(queue: Arc<WorkQueue>) -> Self {
        let (discovery_done, _) = watch::channel(false);
        Self {
            queue,
            discovery_done,
        }
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> ShutdownState {
        if self.queue.is_closed() {
            ShutdownState::Closed
        } else if self.is_discovery_complete() {
            ShutdownState::Draining
        } else {
            ShutdownState::Running
        }
    }

    /// Raises the completion signal. Later calls are no-ops.
    pub fn signal_discovery_complete(&self) {
        let was_done = self.discovery_done.send_replace(true);
        if !was_done {
            info!("discovery complete, draining queue");
        }
    }

    /// True once discovery has signalled completion.
    #[must_use]
    pub fn is_discovery_complete(&self) -> bool {
        *self.discovery_done.borrow()
    }

    /// Resolves once discovery has signalled completion.
    pub async fn wait_discovery_complete(&self) {
        let mut rx = self.discovery_done.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|done| *done).await;
    }

    /// Closes the queue exactly once across all callers. Returns true for the closer.
    pub fn close_queue_once(&self) -> bool {
        let closed = self.queue.close_once();
        if closed {
            info!("work queue closed");
        }
        closed
    }

    /// Returns a guard that raises the completion signal when dropped.
    #[must_use]
    pub fn completion_guard(self: &Arc<Self>) -> CompletionGuard {
        CompletionGuard {
            coordinator: Arc::clone(self),
        }
    }
}

/// Raises the discovery-complete signal on drop, including during unwinding.
#[derive(Debug)]
pub struct CompletionGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.coordinator.signal_discovery_complete();
    }
}
