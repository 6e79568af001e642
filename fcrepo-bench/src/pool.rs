//! Fixed-size worker pool.
//!
//! [`WorkerPool`] runs submitted futures as tokio tasks, but lets at most `size` of them execute at
//! the same time using a semaphore. Every task waits for a permit before it starts and returns it
//! when it finishes, so queued tasks start as soon as a slot frees up.
//!
//! Shutting the pool down closes the semaphore: tasks that already hold a permit run to
//! completion, while tasks still waiting for one resolve to [`TaskError::Abandoned`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::TaskError;

/// Bounded-concurrency executor for benchmark workers.
#[derive(Debug)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `size` tasks at a time.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Returns the number of tasks currently holding a slot.
    pub fn running(&self) -> usize {
        self.size - self.semaphore.available_permits()
    }

    /// Submits a task and returns a handle to its eventual result.
    ///
    /// The task is queued until a slot is free. Dropping the handle does not cancel the task.
    pub fn submit<F, T>(&self, task: F) -> JoinHandle<Result<T, TaskError>>
    where
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
        T: Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|_| TaskError::Abandoned)?;
            task.await
        })
    }

    /// Stops admitting queued tasks. Tasks that are already running are left to finish.
    pub fn shutdown(self) {
        // dropping closes the semaphore
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.semaphore.is_closed() {
            tracing::debug!(running = self.running(), "shutting down worker pool");
            self.semaphore.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bounds_concurrency() {
        let pool = WorkerPool::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let in_flight = Arc::clone(&in_flight);
                let max_in_flight = Arc::clone(&max_in_flight);
                pool.submit(async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, TaskError>(i)
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap().unwrap(), i);
        }

        assert!(max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(pool.running(), 0);
    }

    #[tokio::test]
    async fn shutdown_abandons_queued_tasks() {
        let pool = WorkerPool::new(1);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let running = pool.submit(async move {
            release_rx.await.ok();
            Ok::<_, TaskError>("finished")
        });

        // Wait for the first task to occupy the only slot.
        while pool.running() == 0 {
            tokio::task::yield_now().await;
        }

        let queued = pool.submit(async { Ok::<_, TaskError>("never started") });
        pool.shutdown();
        release_tx.send(()).unwrap();

        assert_eq!(running.await.unwrap().unwrap(), "finished");
        assert!(matches!(
            queued.await.unwrap(),
            Err(TaskError::Abandoned)
        ));
    }
}
