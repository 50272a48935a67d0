//! # Single-handler execution: span, bounded retry, cancellable timeout.
//!
//! ```text
//! execute_traced ──► span "Handler: <name>"
//!     └─► execute_with_retry (attempt 1..=max_retries+1)
//!             ├─ timeout > 0 ─► execute_with_timeout ─► pool task ─► scheduler arms deadline
//!             │                                              ├─ handler done   ─► disarm
//!             │                                              └─ deadline fired ─► Timeout
//!             └─ timeout = 0 ─► execute_handler (caller task)
//!          on failure: retryable && attempts left ─► sleep retry_delay ─► next attempt
//! ```
//!
//! ## Rules
//! - `Interrupted` is never retried; shutdown during the retry sleep yields `Interrupted`.
//! - A timeout records one error metric at the moment it fires.
//! - Protection is fed only on success here; failures are fed by the emitter.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::SignalError;
use crate::events::{Bus, Event, EventKind};
use crate::handlers::HandlerRef;
use crate::metrics::Metrics;
use crate::model::{Envelope, SignalConfig};
use crate::protection::ProtectionManager;
use crate::subscribers::panic_message;

use super::pool::WorkerPool;
use super::registry::RegisteredHandler;
use super::scheduler::TimeoutScheduler;

/// Runs one handler against one envelope.
#[derive(Clone)]
pub struct Processor {
    pool: WorkerPool,
    scheduler: Arc<TimeoutScheduler>,
    metrics: Arc<Metrics>,
    protection: Arc<ProtectionManager>,
    bus: Bus,
}

/// Invokes the handler once, turning a panic into `UnexpectedExecution`.
async fn invoke<S, T>(handler: &HandlerRef<S, T>, envelope: Arc<Envelope<S, T>>) -> Result<(), SignalError>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    match AssertUnwindSafe(handler.handle(envelope)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(SignalError::handler(err)),
        Err(panic) => Err(SignalError::UnexpectedExecution {
            reason: panic_message(&*panic),
        }),
    }
}

impl Processor {
    pub fn new(
        pool: WorkerPool,
        scheduler: Arc<TimeoutScheduler>,
        metrics: Arc<Metrics>,
        protection: Arc<ProtectionManager>,
        bus: Bus,
    ) -> Self {
        Self {
            pool,
            scheduler,
            metrics,
            protection,
            bus,
        }
    }

    /// Direct invocation on the calling task.
    pub async fn execute_handler<S, T>(
        &self,
        handler: &HandlerRef<S, T>,
        envelope: Arc<Envelope<S, T>>,
    ) -> Result<(), SignalError>
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        invoke(handler, envelope).await
    }

    /// Runs the handler on the pool and cancels it after `timeout`.
    ///
    /// The attempt never takes a pool permit: its caller is either the emitting
    /// task or a fan-out task that already holds one.
    pub async fn execute_with_timeout<S, T>(
        &self,
        signal: &str,
        handler: HandlerRef<S, T>,
        envelope: Arc<Envelope<S, T>>,
        timeout: Duration,
    ) -> Result<(), SignalError>
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let scheduler = Arc::clone(&self.scheduler);
        let task = self.pool.submit_nested(async move {
            let deadline = CancellationToken::new();
            let _armed = scheduler.schedule(deadline.clone(), timeout);
            tokio::select! {
                biased;
                res = invoke(&handler, envelope) => res,
                _ = deadline.cancelled() => Err(SignalError::Timeout { timeout }),
            }
        });

        let res = task.join().await.and_then(|res| res);
        if matches!(res, Err(SignalError::Timeout { .. })) {
            self.metrics.record_error(signal);
        }
        res
    }

    /// Up to `config.attempts()` attempts with a fixed delay in between.
    pub async fn execute_with_retry<S, T>(
        &self,
        registered: &RegisteredHandler<S, T>,
        envelope: Arc<Envelope<S, T>>,
        config: &SignalConfig,
    ) -> Result<(), SignalError>
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let signal = registered.signal.as_str();
        let name = registered.handler.name();
        let attempts = config.attempts();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            self.bus.publish(
                Event::new(EventKind::HandlerStarting)
                    .with_signal(signal)
                    .with_handler(name, registered.id)
                    .with_attempt(attempt),
            );

            let res = match config.timeout_opt() {
                Some(timeout) => {
                    self.execute_with_timeout(
                        signal,
                        Arc::clone(&registered.handler),
                        Arc::clone(&envelope),
                        timeout,
                    )
                    .await
                }
                None => self.execute_handler(&registered.handler, Arc::clone(&envelope)).await,
            };

            let err = match res {
                Ok(()) => {
                    if config.record_metrics {
                        self.metrics.record_processed(signal);
                    }
                    return Ok(());
                }
                Err(err) => err,
            };

            if let SignalError::Timeout { timeout } = &err {
                self.bus.publish(
                    Event::new(EventKind::TimeoutHit)
                        .with_signal(signal)
                        .with_handler(name, registered.id)
                        .with_attempt(attempt)
                        .with_timeout(*timeout),
                );
            }
            if !err.is_retryable() || attempt >= attempts {
                return Err(err);
            }

            debug!(signal = %signal, handler = %name, attempt, error = %err, "retrying handler");
            self.bus.publish(
                Event::new(EventKind::RetryScheduled)
                    .with_signal(signal)
                    .with_handler(name, registered.id)
                    .with_attempt(attempt)
                    .with_delay(config.retry_delay)
                    .with_reason(err.as_message()),
            );
            tokio::select! {
                _ = self.pool.shutdown_token().cancelled() => return Err(SignalError::Interrupted),
                _ = tokio::time::sleep(config.retry_delay) => {}
            }
        }
    }

    /// Retry execution inside a `Handler: <name>` span.
    pub async fn execute_traced<S, T>(
        &self,
        registered: &RegisteredHandler<S, T>,
        envelope: Arc<Envelope<S, T>>,
        config: &SignalConfig,
    ) -> Result<(), SignalError>
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let signal = registered.signal.as_str();
        let span = envelope
            .context()
            .start_span(format!("Handler: {}", registered.handler.name()));

        let res = self.execute_with_retry(registered, Arc::clone(&envelope), config).await;
        span.finish();

        match &res {
            Ok(()) => {
                self.protection.update(signal, &self.metrics);
                self.bus.publish(
                    Event::new(EventKind::HandlerSucceeded)
                        .with_signal(signal)
                        .with_handler(registered.handler.name(), registered.id),
                );
            }
            Err(err) => {
                error!(signal = %signal, handler = %registered.handler.name(), error = %err, "handler failed");
            }
        }
        res
    }
}
