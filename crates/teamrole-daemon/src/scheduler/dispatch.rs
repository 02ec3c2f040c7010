//! Fire-and-forget dispatch of directory operations

use crate::error::DirectoryResult;
use std::future::Future;
use tokio_util::task::TaskTracker;

/// Spawns directory operations without waiting for them
///
/// Failures are logged at debug level and otherwise dropped; the next tick
/// re-asserts the desired state. Spawned tasks are tracked so shutdown can
/// let them finish before the drain.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    tracker: TaskTracker,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a directory operation whose result nobody waits for
    pub fn dispatch<F>(&self, operation: &'static str, future: F)
    where
        F: Future<Output = DirectoryResult<()>> + Send + 'static,
    {
        self.tracker.spawn(async move {
            if let Err(e) = future.await {
                tracing::debug!(operation, error = %e, "Directory operation failed");
            }
        });
    }

    /// Spawn an arbitrary background task on the same tracker
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tracker.spawn(future);
    }

    /// Wait until every spawned operation, including ones spawned while
    /// waiting, has finished
    pub async fn settle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
