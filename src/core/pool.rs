//! # Worker pool for handler execution.
//!
//! [`WorkerPool`] is an explicit, cloneable handle over a tokio runtime that runs
//! asynchronous fan-out tasks and timed handler attempts.
//!
//! ```text
//! submit(fut)        ──► [semaphore permit?] ──┐
//! submit_nested(fut) ──────────────────────────┴─► select! { shutdown token ─► Interrupted
//!                                                            fut (catch_unwind) ─► output / UnexpectedExecution }
//!
//! shutdown(grace) ──► tracker.close() ──► wait ≤ grace ──► Ok
//!                                              └── elapsed ─► token.cancel() ─► Err(())
//! ```
//!
//! ## Rules
//! - Every task is tracked; `shutdown` waits only for tasks spawned through this pool.
//! - Forced termination drops in-flight futures at their next `.await`.
//! - Tasks submitted after forced termination complete immediately with `Interrupted`.
//! - The cap applies to `submit` only; nested tasks are awaited by a permit holder.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::SignalError;
use crate::subscribers::panic_message;

/// Cloneable handle to the shared worker pool.
#[derive(Clone, Debug)]
pub struct WorkerPool {
    handle: Handle,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    semaphore: Option<Arc<Semaphore>>,
}

impl WorkerPool {
    /// Pool on the given runtime, without a concurrency cap.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            semaphore: None,
        }
    }

    /// Pool on the runtime of the calling task.
    ///
    /// # Panics
    /// Outside a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Caps concurrently running tasks (`0` keeps the pool unbounded).
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.semaphore = (max > 0).then(|| Arc::new(Semaphore::new(max)));
        self
    }

    /// Token cancelled when the pool is force-terminated.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_terminated(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Number of tasks still running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Spawns `fut` on the pool, waiting for a permit when the pool is capped.
    pub fn submit<F>(&self, fut: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn(fut, self.semaphore.clone())
    }

    /// Spawns `fut` on the pool without taking a permit.
    ///
    /// For work that a permit holder awaits (timed attempts inside a fan-out
    /// task); acquiring a second permit there would starve a capped pool.
    pub fn submit_nested<F>(&self, fut: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn(fut, None)
    }

    fn spawn<F>(&self, fut: F, semaphore: Option<Arc<Semaphore>>) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let token = self.shutdown.clone();

        let inner = self.tracker.spawn_on(
            async move {
                let _permit = match semaphore {
                    Some(sem) => tokio::select! {
                        permit = sem.acquire_owned() => permit.ok(),
                        _ = token.cancelled() => return Err(SignalError::Interrupted),
                    },
                    None => None,
                };
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(SignalError::Interrupted),
                    res = AssertUnwindSafe(fut).catch_unwind() => res.map_err(|panic| {
                        SignalError::UnexpectedExecution { reason: panic_message(&*panic) }
                    }),
                }
            },
            &self.handle,
        );
        TaskHandle { inner }
    }

    /// Stops accepting work gracefully: waits up to `grace` for tracked tasks, then
    /// force-cancels the rest. Returns `Err(())` if cancellation was forced.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), ()> {
        self.tracker.close();
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => Ok(()),
            Err(_elapsed) => {
                self.shutdown.cancel();
                Err(())
            }
        }
    }
}

/// Awaitable handle to a submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    inner: JoinHandle<Result<T, SignalError>>,
}

impl<T> TaskHandle<T> {
    /// Waits for the task's output.
    pub async fn join(self) -> Result<T, SignalError> {
        match self.inner.await {
            Ok(res) => res,
            Err(join_err) => Err(SignalError::UnexpectedExecution {
                reason: join_err.to_string(),
            }),
        }
    }

    /// Cancels the task at its next `.await`.
    pub fn abort(&self) {
        self.inner.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn returns_task_output() {
        let pool = WorkerPool::current();
        assert_eq!(pool.submit(async { 41 + 1 }).join().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn panics_become_unexpected_execution() {
        let pool = WorkerPool::current();
        let boom = || -> u32 { panic!("handler blew up") };
        let err = pool
            .submit(async move { boom() })
            .join()
            .await
            .unwrap_err();
        match err {
            SignalError::UnexpectedExecution { reason } => assert_eq!(reason, "handler blew up"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn semaphore_caps_concurrency() {
        let pool = WorkerPool::current().with_max_concurrent(1);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn nested_task_runs_while_the_only_permit_is_held() {
        let pool = WorkerPool::current().with_max_concurrent(1);
        let inner_pool = pool.clone();
        let outer = pool.submit(async move { inner_pool.submit_nested(async { 7 }).join().await });

        let res = tokio::time::timeout(Duration::from_secs(1), outer.join())
            .await
            .expect("nested task starved");
        assert_eq!(res.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn forced_shutdown_interrupts_in_flight_tasks() {
        let pool = WorkerPool::current();
        let slow = pool.submit(tokio::time::sleep(Duration::from_secs(30)));

        assert!(pool.shutdown(Duration::from_millis(20)).await.is_err());
        assert!(pool.is_terminated());
        assert!(matches!(slow.join().await, Err(SignalError::Interrupted)));
        assert!(matches!(pool.submit(async {}).join().await, Err(SignalError::Interrupted)));
    }

    #[tokio::test]
    async fn graceful_shutdown_waits_for_tasks() {
        let pool = WorkerPool::current();
        let quick = pool.submit(tokio::time::sleep(Duration::from_millis(10)));
        assert!(pool.shutdown(Duration::from_secs(5)).await.is_ok());
        assert!(quick.join().await.is_ok());
        assert_eq!(pool.in_flight(), 0);
    }
}
