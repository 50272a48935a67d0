//! # Dedicated timeout scheduler.
//!
//! One OS thread (`signal-timeout-scheduler`) drives a [`DelayQueue`] on its own
//! current-thread runtime and does nothing but fire cancellation tokens.
//!
//! ```text
//! schedule(token, after) ──► Arm{id} ──► [DelayQueue] ──expired──► token.cancel()
//! drop(ScheduledCancel)  ──► Disarm{id} ──► entry removed
//! stop() ──► stop token ──► loop exits ──► thread joined
//! ```
//!
//! ## Rules
//! - A disarmed entry never fires.
//! - Once stopped, new schedules are ignored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::debug;

use crate::error::RuntimeError;

const THREAD_NAME: &str = "signal-timeout-scheduler";

enum Command {
    Arm {
        id: u64,
        target: CancellationToken,
        after: Duration,
    },
    Disarm {
        id: u64,
    },
}

/// Single-threaded canceller of timed-out handler attempts.
pub struct TimeoutScheduler {
    tx: mpsc::UnboundedSender<Command>,
    next_id: AtomicU64,
    stop: CancellationToken,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl TimeoutScheduler {
    /// Starts the scheduler thread.
    pub fn start() -> Result<Self, RuntimeError> {
        let unavailable = |e: std::io::Error| RuntimeError::SchedulerUnavailable {
            reason: e.to_string(),
        };
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(unavailable)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let stop = CancellationToken::new();
        let stop_for_thread = stop.clone();

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || rt.block_on(drive(rx, stop_for_thread)))
            .map_err(unavailable)?;

        Ok(Self {
            tx,
            next_id: AtomicU64::new(0),
            stop,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Cancels `target` after `after` unless the returned guard is dropped first.
    pub fn schedule(&self, target: CancellationToken, after: Duration) -> ScheduledCancel {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let _ = self.tx.send(Command::Arm { id, target, after });
        ScheduledCancel {
            id,
            tx: self.tx.clone(),
        }
    }

    /// Stops the loop and joins the thread.
    pub async fn stop(&self) {
        self.stop.cancel();
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            let _ = tokio::task::spawn_blocking(move || thread.join()).await;
            debug!("timeout scheduler stopped");
        }
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Disarms its scheduled cancellation when dropped.
#[must_use = "dropping the guard disarms the timeout"]
pub struct ScheduledCancel {
    id: u64,
    tx: mpsc::UnboundedSender<Command>,
}

impl Drop for ScheduledCancel {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Disarm { id: self.id });
    }
}

async fn drive(mut rx: mpsc::UnboundedReceiver<Command>, stop: CancellationToken) {
    let mut queue: DelayQueue<(u64, CancellationToken)> = DelayQueue::new();
    let mut keys: HashMap<u64, delay_queue::Key> = HashMap::new();

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            cmd = rx.recv() => match cmd {
                Some(Command::Arm { id, target, after }) => {
                    let key = queue.insert((id, target), after);
                    keys.insert(id, key);
                }
                Some(Command::Disarm { id }) => {
                    if let Some(key) = keys.remove(&id) {
                        queue.remove(&key);
                    }
                }
                None => break,
            },
            Some(expired) = queue.next(), if !queue.is_empty() => {
                let (id, target) = expired.into_inner();
                keys.remove(&id);
                target.cancel();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fires_after_delay() {
        let scheduler = TimeoutScheduler::start().unwrap();
        let token = CancellationToken::new();
        let _guard = scheduler.schedule(token.clone(), Duration::from_millis(20));

        tokio::time::timeout(Duration::from_secs(2), token.cancelled())
            .await
            .expect("token should be cancelled by the scheduler");
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn dropped_guard_disarms() {
        let scheduler = TimeoutScheduler::start().unwrap();
        let token = CancellationToken::new();
        drop(scheduler.schedule(token.clone(), Duration::from_millis(30)));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!token.is_cancelled());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn stop_joins_the_thread() {
        let scheduler = TimeoutScheduler::start().unwrap();
        scheduler.stop().await;
        assert!(scheduler.thread.lock().is_none());
        scheduler.stop().await;
    }
}
