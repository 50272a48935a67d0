//! # Fan-out of a ready envelope to every handler.
//!
//! ```text
//! emit_sync:  caller task ── for h in handlers ──► execute_traced ──► callbacks
//! emit_async: for h in handlers ──► pool.submit ──► execute_traced ──► re-check (1s) ──► callbacks
//! ```
//!
//! ## Rules
//! - One handler's failure never stops the others.
//! - `on_success` or `on_error`, then always `on_complete`, per handler.
//! - Async dispatch has no cross-handler ordering and returns before handlers finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error};

use crate::callback::{CallbackRef, ErrorHandler};
use crate::error::SignalError;
use crate::events::{Bus, Event, EventKind};
use crate::metrics::Metrics;
use crate::model::{Envelope, SignalConfig};
use crate::protection::ProtectionManager;

use super::pool::{TaskHandle, WorkerPool};
use super::processor::Processor;
use super::registry::RegisteredHandler;

/// Budget of the extra execution an async dispatch runs after a successful attempt.
const ASYNC_RECHECK_TIMEOUT: Duration = Duration::from_secs(1);

/// Sync and async dispatch over a [`Processor`].
#[derive(Clone)]
pub struct Emitter {
    processor: Processor,
    pool: WorkerPool,
    metrics: Arc<Metrics>,
    protection: Arc<ProtectionManager>,
    bus: Bus,
}

/// Everything one emission shares between its handlers.
pub struct Dispatch<S, T> {
    pub signal: String,
    pub envelope: Arc<Envelope<S, T>>,
    pub config: SignalConfig,
    pub on_error: ErrorHandler,
    pub callback: Option<CallbackRef<S, T>>,
}

impl Emitter {
    pub fn new(
        processor: Processor,
        pool: WorkerPool,
        metrics: Arc<Metrics>,
        protection: Arc<ProtectionManager>,
        bus: Bus,
    ) -> Self {
        Self {
            processor,
            pool,
            metrics,
            protection,
            bus,
        }
    }

    /// Runs every handler in order on the calling task.
    pub async fn emit_sync<S, T>(&self, dispatch: &Dispatch<S, T>, handlers: &[Arc<RegisteredHandler<S, T>>])
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        for registered in handlers {
            let started = Instant::now();
            let res = self
                .processor
                .execute_traced(registered, Arc::clone(&dispatch.envelope), &dispatch.config)
                .await;
            if res.is_ok() && dispatch.config.record_metrics {
                let elapsed = started.elapsed();
                self.metrics.record_processing_time(&dispatch.signal, elapsed);
                debug!(signal = %dispatch.signal, elapsed_ms = elapsed.as_millis() as u64, "signal processed");
            }
            self.report(dispatch, registered, res);
        }
    }

    /// Submits one pool task per handler and returns their handles.
    pub fn emit_async<S, T>(
        &self,
        dispatch: Arc<Dispatch<S, T>>,
        handlers: &[Arc<RegisteredHandler<S, T>>],
    ) -> Vec<TaskHandle<()>>
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        handlers
            .iter()
            .map(|registered| {
                let this = self.clone();
                let dispatch = Arc::clone(&dispatch);
                let registered = Arc::clone(registered);
                self.pool.submit(async move {
                    let started = Instant::now();
                    let envelope = &dispatch.envelope;
                    let mut res = this
                        .processor
                        .execute_traced(&registered, Arc::clone(envelope), &dispatch.config)
                        .await;
                    if res.is_ok() {
                        res = this
                            .processor
                            .execute_with_timeout(
                                &dispatch.signal,
                                Arc::clone(&registered.handler),
                                Arc::clone(envelope),
                                ASYNC_RECHECK_TIMEOUT,
                            )
                            .await;
                    }
                    if res.is_ok() && dispatch.config.record_metrics {
                        debug!(
                            signal = %dispatch.signal,
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "signal processed asynchronously"
                        );
                    }
                    this.report(&dispatch, &registered, res);
                })
            })
            .collect()
    }

    fn report<S, T>(&self, dispatch: &Dispatch<S, T>, registered: &RegisteredHandler<S, T>, res: Result<(), SignalError>)
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let envelope = dispatch.envelope.as_ref();
        match res {
            Ok(()) => {
                if let Some(cb) = &dispatch.callback {
                    cb.on_success(&dispatch.signal, envelope);
                }
            }
            Err(err) => {
                self.handle_error(dispatch, registered, &err);
                if let Some(cb) = &dispatch.callback {
                    cb.on_error(&dispatch.signal, envelope, &err);
                }
            }
        }
        if let Some(cb) = &dispatch.callback {
            cb.on_complete(&dispatch.signal, envelope);
        }
    }

    fn handle_error<S, T>(&self, dispatch: &Dispatch<S, T>, registered: &RegisteredHandler<S, T>, err: &SignalError)
    where
        S: Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let signal = dispatch.signal.as_str();
        self.metrics.record_error(signal);
        self.protection.update(signal, &self.metrics);
        error!(
            signal = %signal,
            handler_id = registered.id,
            label = err.as_label(),
            error = %err,
            "signal handler error"
        );
        (dispatch.on_error)(err);
        self.bus.publish(
            Event::new(EventKind::HandlerFailed)
                .with_signal(signal)
                .with_handler(registered.handler.name(), registered.id)
                .with_reason(err.as_message()),
        );
    }
}
