//! Background task dispatch
//!
//! Job execution, metadata validation and imports run as fire-and-forget
//! tasks: callers get no handle back. All tasks are tracked so shutdown
//! and tests can wait for the pool to drain, and a semaphore bounds how many
//! run at once.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

#[derive(Debug, Clone)]
pub struct TaskSpawner {
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl TaskSpawner {
    /// `max_concurrent` of 0 is treated as 1
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Queue `task`; it starts once a concurrency slot is free
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = self.permits.clone();
        self.tracker.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!(task = name, "Task pool closed, dropping task");
                    return;
                }
            };
            tracing::trace!(task = name, "Background task started");
            task.await;
        });
    }

    /// Number of tasks queued or running
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every task spawned so far (and any they spawn) has finished
    pub async fn wait_idle(&self) {
        loop {
            self.tracker.close();
            self.tracker.wait().await;
            self.tracker.reopen();
            if self.tracker.is_empty() {
                break;
            }
        }
    }
}
