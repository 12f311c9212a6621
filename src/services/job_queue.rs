//! Bounded concurrency for work that must not run on the async workers
//!
//! Decoding metainfo files and similar CPU/disk-bound calls go through a
//! [BlockingPool] so a burst of admissions cannot tie up the runtime or spawn
//! an unbounded number of blocking threads.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

/// Error returned when pooled work cannot produce a result.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("blocking pool '{0}' is closed")]
    Closed(String),
    #[error("blocking task in pool '{0}' panicked")]
    Panicked(String),
}

/// A `spawn_blocking` front-end that allows at most `max_concurrent` calls in flight.
#[derive(Clone)]
pub struct BlockingPool {
    semaphore: Arc<Semaphore>,
    name: Arc<str>,
}

impl BlockingPool {
    pub fn new(name: &str, max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            name: Arc::from(name),
        }
    }

    /// Run `work` on the blocking thread pool once a permit is available.
    pub async fn run<F, T>(&self, work: F) -> Result<T, PoolError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolError::Closed(self.name.to_string()))?;
        debug!(pool = %self.name, "Acquired blocking permit");

        let result = tokio::task::spawn_blocking(move || {
            let out = work();
            drop(permit);
            out
        })
        .await;

        result.map_err(|_| PoolError::Panicked(self.name.to_string()))
    }

    /// Get available permits
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_bounds_concurrency() {
        let pool = BlockingPool::new("test", 2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = vec![];
        for _ in 0..6 {
            let pool = pool.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                pool.run(move || {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_pool_returns_value() {
        let pool = BlockingPool::new("test", 1);
        let value = pool.run(|| 21 * 2).await.unwrap();
        assert_eq!(value, 42);
    }
}
