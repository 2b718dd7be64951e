//! Bounded dispatch of blocking prediction work.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("job did not finish within {0:?}")]
    Timeout(Duration),
    #[error("worker pool is closed")]
    Closed,
    #[error("job failed: {0}")]
    Failed(String),
}

/// Runs closures on the blocking thread pool with at most `size` in flight.
///
/// The timeout covers waiting for a permit and running the job. A job that
/// outlives its timeout keeps running and holds its permit until it returns;
/// only its result is discarded.
#[derive(Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(size: usize, timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn run<T, F>(&self, job: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let task = async move {
            let permit = permits
                .acquire_owned()
                .await
                .map_err(|_| PoolError::Closed)?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                job()
            })
            .await
            .map_err(|err| PoolError::Failed(err.to_string()))
        };
        tokio::time::timeout(self.timeout, task)
            .await
            .map_err(|_| PoolError::Timeout(self.timeout))?
    }

    /// Reject queued and future jobs.
    pub fn close(&self) {
        self.permits.close();
    }
}
