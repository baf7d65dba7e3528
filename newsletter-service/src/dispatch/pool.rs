//! Bounded worker pool for delivery tasks.
//!
//! Sizing follows the usual core/max/queue executor model:
//!
//! ```text
//! submit ──► backlog slot free? ──yes──► wait for a core worker ──► run
//!                 │no
//!                 ▼
//!            burst worker free? ──yes──► run now
//!                 │no
//!                 ▼
//!            wait ≤ submit_timeout for a backlog slot, else PoolError::Saturated
//! ```
//!
//! At most `max_size` tasks run at once and at most `queue_capacity` wait.
//! Submission never blocks longer than `submit_timeout`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::Config;

/// Why a task was not accepted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool saturated")]
    Saturated,

    #[error("worker pool closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    pub core_size: usize,
    pub max_size: usize,
    pub queue_capacity: usize,
    pub submit_timeout: Duration,
}

impl PoolSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            core_size: config.worker_core_size,
            max_size: config.worker_max_size,
            queue_capacity: config.worker_queue_capacity,
            submit_timeout: config.worker_submit_timeout(),
        }
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct WorkerPool {
    settings: PoolSettings,
    core: Arc<Semaphore>,
    burst: Arc<Semaphore>,
    backlog: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(settings: PoolSettings) -> Self {
        let core_size = settings.core_size.max(1);
        let burst_size = settings.max_size.saturating_sub(core_size);
        let queue_capacity = settings.queue_capacity.max(1);

        Self {
            settings,
            core: Arc::new(Semaphore::new(core_size)),
            burst: Arc::new(Semaphore::new(burst_size)),
            backlog: Arc::new(Semaphore::new(queue_capacity)),
        }
    }

    /// Submit a task, returning a handle that resolves to its output.
    pub async fn submit<F, T>(&self, task: F) -> Result<JoinHandle<T>, PoolError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        match Arc::clone(&self.backlog).try_acquire_owned() {
            Ok(slot) => return Ok(self.spawn_queued(slot, task)),
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => {}
        }

        match Arc::clone(&self.burst).try_acquire_owned() {
            Ok(worker) => {
                return Ok(tokio::spawn(async move {
                    let _worker = worker;
                    task.await
                }));
            }
            Err(TryAcquireError::Closed) => return Err(PoolError::Closed),
            Err(TryAcquireError::NoPermits) => {}
        }

        match timeout(
            self.settings.submit_timeout,
            Arc::clone(&self.backlog).acquire_owned(),
        )
        .await
        {
            Ok(Ok(slot)) => Ok(self.spawn_queued(slot, task)),
            Ok(Err(_)) => Err(PoolError::Closed),
            Err(_) => Err(PoolError::Saturated),
        }
    }

    /// Spawn a task that holds its backlog slot until a core worker frees up.
    fn spawn_queued<F, T>(&self, slot: OwnedSemaphorePermit, task: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let core = Arc::clone(&self.core);
        tokio::spawn(async move {
            // The core semaphore is never closed.
            let _worker = core.acquire_owned().await.ok();
            drop(slot);
            task.await
        })
    }

    /// Tasks currently executing.
    pub fn running(&self) -> usize {
        let core_size = self.settings.core_size.max(1);
        let burst_size = self.settings.max_size.saturating_sub(core_size);
        (core_size - self.core.available_permits()) + (burst_size - self.burst.available_permits())
    }

    /// Tasks waiting for a core worker.
    pub fn queued(&self) -> usize {
        self.settings.queue_capacity.max(1) - self.backlog.available_permits()
    }

    /// Refuse further submissions. Already accepted tasks still run.
    pub fn close(&self) {
        self.backlog.close();
        self.burst.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use tokio::time::sleep;

    fn settings(core: usize, max: usize, queue: usize, submit_ms: u64) -> PoolSettings {
        PoolSettings {
            core_size: core,
            max_size: max,
            queue_capacity: queue,
            submit_timeout: Duration::from_millis(submit_ms),
        }
    }

    #[tokio::test]
    async fn test_submit_returns_task_output() {
        let pool = WorkerPool::new(settings(2, 4, 10, 1000));
        let handle = pool.submit(async { 21 * 2 }).await.unwrap();
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_concurrency_never_exceeds_max() {
        let pool = WorkerPool::new(settings(2, 3, 2, 5_000));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            let handle = pool
                .submit(async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(20)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
            handles.push(handle);
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.running(), 0);
        assert_eq!(pool.queued(), 0);
    }

    #[tokio::test]
    async fn test_rejects_when_saturated() {
        let pool = WorkerPool::new(settings(1, 1, 1, 30));
        let release = Arc::new(Notify::new());

        let blocker = {
            let release = Arc::clone(&release);
            pool.submit(async move { release.notified().await }).await.unwrap()
        };
        // Let the blocker take the only worker.
        sleep(Duration::from_millis(20)).await;

        let queued = pool.submit(async {}).await.unwrap();
        let rejected = pool.submit(async {}).await;
        assert_eq!(rejected.err(), Some(PoolError::Saturated));

        release.notify_one();
        blocker.await.unwrap();
        queued.await.unwrap();
    }

    #[tokio::test]
    async fn test_burst_worker_used_when_backlog_full() {
        let pool = WorkerPool::new(settings(1, 2, 1, 30));
        let release = Arc::new(Notify::new());

        let blocker = {
            let release = Arc::clone(&release);
            pool.submit(async move { release.notified().await }).await.unwrap()
        };
        sleep(Duration::from_millis(20)).await;

        let queued = pool.submit(async {}).await.unwrap();
        // Backlog is full, so this runs on the burst worker right away.
        let burst = pool.submit(async { "burst" }).await.unwrap();
        assert_eq!(burst.await.unwrap(), "burst");

        release.notify_one();
        blocker.await.unwrap();
        queued.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_pool_rejects() {
        let pool = WorkerPool::new(settings(1, 1, 1, 30));
        pool.close();
        assert_eq!(pool.submit(async {}).await.err(), Some(PoolError::Closed));
    }
}
