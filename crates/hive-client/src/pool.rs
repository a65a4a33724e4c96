//! Bounded pool hosting response waits.
//!
//! At most `capacity` tasks run at once; [`WorkerPool::submit`] waits for a
//! free permit, which is the back-pressure on request submission. Shutdown
//! rejects new work, lets running tasks drain for a grace period, then
//! cancels whatever is left.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use hive_core::errors::ClientError;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Fixed-capacity task pool.
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    capacity: usize,
}

impl WorkerPool {
    /// Create a pool running at most `capacity` tasks concurrently.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            capacity,
        }
    }

    /// Run `task` once a slot is free.
    ///
    /// The handle yields `None` if the pool cancelled the task during
    /// shutdown.
    pub async fn submit<F, T>(&self, task: F) -> Result<JoinHandle<Option<T>>, ClientError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(ClientError::Shutdown);
        }
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ClientError::Shutdown)?;
        let cancel = self.cancel.clone();

        Ok(self.tracker.spawn(async move {
            let _permit = permit;
            tokio::select! {
                output = task => Some(output),
                () = cancel.cancelled() => None,
            }
        }))
    }

    /// Maximum concurrent tasks.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tasks currently running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Whether the pool stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stop accepting work and wait for running tasks.
    ///
    /// Tasks still running after `grace` are cancelled. Returns `true` if
    /// everything finished on its own.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.permits.close();
        let _ = self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_ok() {
            debug!("worker pool drained");
            return true;
        }

        warn!(
            in_flight = self.tracker.len(),
            grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX),
            "worker pool did not drain in time, cancelling remaining tasks"
        );
        self.cancel.cancel();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(in_flight = self.tracker.len(), "worker pool did not terminate");
        }
        false
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.permits.close();
        self.cancel.cancel();
    }
}
