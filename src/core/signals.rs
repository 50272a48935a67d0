//! # Signals: the dispatch facade.
//!
//! [`Signals`] wires the registry, pipeline, protection, emitter and worker pool
//! together and owns the event bus listener.
//!
//! ## Emission state machine
//! ```text
//! emit(signal, env)
//!   GATED ──── protection.is_blocked ──► Blocked          (callback: on_error + on_complete)
//!     │
//!   PIPELINED ─ pipeline.process = None ─► PipelineRejected (callback: on_error + on_complete)
//!     │         record_metrics ─► record_emit
//!     │         no handlers ──────────────► NoHandlers       (callback: on_error + on_complete)
//!     │
//!   DISPATCHED ─ emit_async | emit_sync
//!     │
//!   REPORTED ── pipeline.post_process ─► persistence (per handler, on the pool)
//! ```
//!
//! ## Event flow
//! ```text
//! Registry / Processor / Emitter / Protection ── publish ──► Bus ──► listener
//!                                                                      ├─► AliveTracker
//!                                                                      └─► SubscriberSet
//! ```
//!
//! ## Shutdown
//! ```text
//! shutdown() ─► ShutdownRequested ─► registry.clear_all()
//!            ─► pool.shutdown(grace) ─┬─ Ok  ─► AllStoppedWithin
//!                                     └─ Err ─► GraceExceeded(stuck = AliveTracker.snapshot())
//!            ─► scheduler.stop() ─► listener drained and stopped
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use signalvisor::{Envelope, HandlerError, HandlerFn, Signals, SignalsConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let signals = Signals::<String, u64>::builder(SignalsConfig::default()).build()?;
//!
//!     signals.connect(
//!         "order.created",
//!         HandlerFn::arc("audit", |env: Arc<Envelope<String, u64>>| async move {
//!             println!("order {} from {}", env.payload(), env.sender());
//!             Ok::<_, HandlerError>(())
//!         }),
//!     );
//!
//!     let env = Envelope::new("order.created", "api".to_string(), 42);
//!     signals.emit("order.created", env, |err| eprintln!("{err}")).await;
//!
//!     signals.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bind::{Binding, Component};
use crate::callback::{CallbackRef, ErrorHandler};
use crate::error::{RuntimeError, SignalError};
use crate::events::{Bus, Event, EventKind};
use crate::handlers::{DeadLetterSink, HandlerRef, TransactionManager, TransactionalHandler};
use crate::metrics::Metrics;
use crate::model::{Context, Envelope, SignalConfig};
use crate::persistence::{Persistence, PersistenceRecord};
use crate::pipeline::{Filter, Interceptor, Pipeline, Transformer};
use crate::protection::ProtectionManager;
use crate::subscribers::{AliveTracker, SubscriberSet};

use super::builder::SignalsBuilder;
use super::config::SignalsConfig;
use super::emitter::{Dispatch, Emitter};
use super::pool::WorkerPool;
use super::registry::{RegisteredHandler, Registry};
use super::scheduler::TimeoutScheduler;

/// What `emit` did with an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Handed to the handlers (sync: finished; async: submitted).
    Dispatched,
    /// Refused by the circuit breaker or rate limiter.
    Blocked,
    /// Vetoed by an interceptor or filter.
    PipelineRejected,
    /// No handler registered for the signal.
    NoHandlers,
}

/// Collaborators handed over by the builder.
pub(crate) struct Parts {
    pub cfg: SignalsConfig,
    pub bus: Bus,
    pub subs: SubscriberSet,
    pub pool: WorkerPool,
    pub scheduler: Arc<TimeoutScheduler>,
    pub metrics: Arc<Metrics>,
    pub protection: Arc<ProtectionManager>,
    pub emitter: Emitter,
    pub persistence: Option<Arc<dyn Persistence>>,
    pub transactions: Option<Arc<dyn TransactionManager>>,
    pub dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

/// In-process signal dispatcher for senders of type `S` and payloads of type `T`.
pub struct Signals<S, T> {
    cfg: SignalsConfig,
    bus: Bus,
    alive: Arc<AliveTracker>,
    pool: WorkerPool,
    scheduler: Arc<TimeoutScheduler>,
    metrics: Arc<Metrics>,
    protection: Arc<ProtectionManager>,
    registry: Registry<S, T>,
    pipeline: Pipeline<S, T>,
    emitter: Emitter,
    persistence: Option<Arc<dyn Persistence>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    listener_stop: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<S, T> Signals<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Starts building a dispatcher.
    pub fn builder(cfg: SignalsConfig) -> SignalsBuilder<S, T> {
        SignalsBuilder::new(cfg)
    }

    pub(crate) fn from_parts(parts: Parts) -> Self {
        let alive = Arc::new(AliveTracker::new());
        let listener_stop = CancellationToken::new();
        let listener = spawn_listener(
            &parts.bus,
            Arc::clone(&alive),
            parts.subs,
            listener_stop.clone(),
        );

        Self {
            registry: Registry::new(Arc::clone(&parts.metrics), parts.bus.clone()),
            pipeline: Pipeline::new(),
            cfg: parts.cfg,
            bus: parts.bus,
            alive,
            pool: parts.pool,
            scheduler: parts.scheduler,
            metrics: parts.metrics,
            protection: parts.protection,
            emitter: parts.emitter,
            persistence: parts.persistence,
            transactions: parts.transactions,
            dead_letters: parts.dead_letters,
            listener_stop,
            listener: Mutex::new(Some(listener)),
        }
    }

    // ---------------------------
    // Registration
    // ---------------------------

    /// Connects `handler` with the default [`SignalConfig`]. Returns the registration id.
    pub fn connect(&self, signal: &str, handler: HandlerRef<S, T>) -> u64 {
        self.connect_with_config(signal, handler, SignalConfig::default())
    }

    /// Connects `handler`; the signal's config is fixed by its first registration.
    pub fn connect_with_config(&self, signal: &str, handler: HandlerRef<S, T>, config: SignalConfig) -> u64 {
        self.register(signal, handler, config, None)
    }

    /// Like [`connect_with_config`](Self::connect_with_config), attaching a registration context.
    pub fn connect_with_context(
        &self,
        signal: &str,
        handler: HandlerRef<S, T>,
        config: SignalConfig,
        context: Context,
    ) -> u64 {
        self.register(signal, handler, config, Some(context))
    }

    fn register(&self, signal: &str, handler: HandlerRef<S, T>, config: SignalConfig, context: Option<Context>) -> u64 {
        self.protection.provision(signal);
        let handler = self.decorate(handler, &config);
        self.registry.register_handler(signal, handler, config, context)
    }

    /// Wraps the handler in a [`TransactionalHandler`] when the config asks for
    /// transactions and a manager is available.
    fn decorate(&self, handler: HandlerRef<S, T>, config: &SignalConfig) -> HandlerRef<S, T> {
        match (&config.transaction, &self.transactions) {
            (Some(tx), Some(manager)) => Arc::new(TransactionalHandler::new(
                handler,
                tx.clone(),
                Arc::clone(manager),
                self.dead_letters.clone(),
            )),
            (Some(_), None) => {
                warn!(handler = handler.name(), "transaction config without a transaction manager; ignored");
                handler
            }
            _ => handler,
        }
    }

    pub fn disconnect(&self, signal: &str, id: u64) {
        self.registry.unregister_handler(signal, id, None);
    }

    pub fn disconnect_with_context(&self, signal: &str, id: u64, context: Context) {
        self.registry.unregister_handler(signal, id, Some(context));
    }

    /// Applies pending registrations.
    pub fn process_events(&self) {
        self.registry.process_events();
    }

    // ---------------------------
    // Pipeline
    // ---------------------------

    pub fn add_interceptor(&self, signal: &str, interceptor: Arc<dyn Interceptor<S, T>>) {
        self.pipeline.add_interceptor(signal, interceptor);
    }

    pub fn add_filter(&self, signal: &str, filter: Arc<dyn Filter<S, T>>) {
        self.pipeline.add_filter(signal, filter);
    }

    pub fn add_transformer(&self, signal: &str, transformer: Arc<dyn Transformer<S, T>>) {
        self.pipeline.add_transformer(signal, transformer);
    }

    /// Attaches every binding to the signals its patterns resolve to.
    ///
    /// Globs are matched against the signals registered right now. Returns the
    /// number of hooks attached.
    pub fn bind<I>(&self, bindings: I) -> usize
    where
        I: IntoIterator<Item = Binding<S, T>>,
    {
        let registered = self.registry.registered_events();
        let mut attached = 0;
        for binding in bindings {
            for signal in binding.resolve(&registered) {
                match binding.component() {
                    Component::Interceptor(i) => self.add_interceptor(&signal, Arc::clone(i)),
                    Component::Filter(f) => self.add_filter(&signal, Arc::clone(f)),
                    Component::Transformer(t) => self.add_transformer(&signal, Arc::clone(t)),
                }
                debug!(signal = %signal, component = binding.component().name(), "binding attached");
                attached += 1;
            }
        }
        attached
    }

    // ---------------------------
    // Emission
    // ---------------------------

    /// Emits `envelope` on `signal`. Handler failures go to `on_error`.
    pub async fn emit<E>(&self, signal: &str, envelope: Envelope<S, T>, on_error: E) -> EmitOutcome
    where
        E: Fn(&SignalError) + Send + Sync + 'static,
    {
        self.dispatch(signal, envelope, Arc::new(on_error), None).await
    }

    /// Emits with per-handler outcome callbacks.
    pub async fn emit_with_callback<E>(
        &self,
        signal: &str,
        envelope: Envelope<S, T>,
        callback: CallbackRef<S, T>,
        on_error: E,
    ) -> EmitOutcome
    where
        E: Fn(&SignalError) + Send + Sync + 'static,
    {
        self.dispatch(signal, envelope, Arc::new(on_error), Some(callback)).await
    }

    async fn dispatch(
        &self,
        signal: &str,
        envelope: Envelope<S, T>,
        on_error: ErrorHandler,
        callback: Option<CallbackRef<S, T>>,
    ) -> EmitOutcome {
        let envelope = Arc::new(envelope);

        if self.protection.is_blocked(signal) {
            debug!(signal = %signal, "signal blocked by protection");
            self.reject(signal, &envelope, callback.as_ref(), EventKind::SignalBlocked, SignalError::Blocked {
                signal: signal.to_string(),
            });
            return EmitOutcome::Blocked;
        }

        let Some(envelope) = self.pipeline.process(signal, Arc::clone(&envelope)) else {
            debug!(signal = %signal, "signal rejected by pipeline");
            self.reject(signal, &envelope, callback.as_ref(), EventKind::PipelineRejected, SignalError::PipelineRejected {
                signal: signal.to_string(),
            });
            return EmitOutcome::PipelineRejected;
        };

        let config = self.registry.config(signal);
        if config.record_metrics {
            self.metrics.record_emit(signal);
        }
        let handlers = self.registry.handlers(signal);
        if handlers.is_empty() {
            warn!(signal = %signal, "no handlers for signal");
            self.reject(signal, &envelope, callback.as_ref(), EventKind::NoHandlers, SignalError::NoHandlers {
                signal: signal.to_string(),
            });
            return EmitOutcome::NoHandlers;
        }

        let mode = if config.async_dispatch { "async" } else { "sync" };
        self.bus
            .publish(Event::new(EventKind::SignalEmitted).with_signal(signal).with_reason(mode));

        let dispatch = Arc::new(Dispatch {
            signal: signal.to_string(),
            envelope: Arc::clone(&envelope),
            config,
            on_error,
            callback,
        });
        if dispatch.config.async_dispatch {
            self.emitter.emit_async(Arc::clone(&dispatch), &handlers);
        } else {
            self.emitter.emit_sync(&dispatch, &handlers).await;
        }

        self.pipeline.post_process(signal, &envelope);
        self.persist(&dispatch, &handlers);
        EmitOutcome::Dispatched
    }

    fn reject(
        &self,
        signal: &str,
        envelope: &Envelope<S, T>,
        callback: Option<&CallbackRef<S, T>>,
        kind: EventKind,
        err: SignalError,
    ) {
        self.bus.publish(Event::new(kind).with_signal(signal));
        if let Some(cb) = callback {
            cb.on_error(signal, envelope, &err);
            cb.on_complete(signal, envelope);
        }
    }

    /// Hands one record per handler to the persistence backend, on the pool.
    fn persist(&self, dispatch: &Dispatch<S, T>, handlers: &[Arc<RegisteredHandler<S, T>>]) {
        if !self.cfg.persistent {
            return;
        }
        let Some(persistence) = &self.persistence else {
            return;
        };
        let context = dispatch.envelope.context();
        for registered in handlers {
            let record = PersistenceRecord {
                signal: dispatch.signal.clone(),
                handler_id: registered.id,
                handler: registered.handler.name().to_string(),
                priority: registered.priority,
                config: dispatch.config.clone(),
                event_id: context.event_id().to_string(),
                spans: context.spans(),
                metrics: self.metrics.snapshot(&dispatch.signal),
            };
            let persistence = Arc::clone(persistence);
            let _detached = self.pool.submit(async move {
                let signal = record.signal.clone();
                if let Err(err) = persistence.save(record).await {
                    warn!(signal = %signal, error = %err, "failed to persist signal");
                }
            });
        }
    }

    // ---------------------------
    // Introspection & admin
    // ---------------------------

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn protection(&self) -> &ProtectionManager {
        &self.protection
    }

    /// Sorted names of signals with a handler list.
    pub fn registered_events(&self) -> Vec<String> {
        self.registry.registered_events()
    }

    /// Snapshot of a signal's handlers in dispatch order.
    pub fn handlers(&self, signal: &str) -> Vec<Arc<RegisteredHandler<S, T>>> {
        self.registry.handlers(signal)
    }

    pub fn has_handlers(&self, signal: &str) -> bool {
        self.registry.has_handlers(signal)
    }

    /// The signal's resolved config (default if never registered).
    pub fn config(&self, signal: &str) -> SignalConfig {
        self.registry.config(signal)
    }

    /// Drops handlers, configs and pipeline hooks of the given signals.
    pub fn clear(&self, signals: &[&str]) {
        self.registry.clear(signals);
        self.pipeline.clear(signals);
    }

    /// Drops all handlers, configs, pending registrations and pipeline hooks.
    pub fn clear_all(&self) {
        self.registry.clear_all();
        self.pipeline.clear_all();
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Stops the runtime: clears the registry, waits up to `grace` for in-flight
    /// handlers, then force-cancels the rest and stops the timeout scheduler.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        info!(grace_ms = self.cfg.grace.as_millis() as u64, "signals shutting down");
        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        self.registry.clear_all();

        let res = match self.pool.shutdown(self.cfg.grace).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(()) => {
                let stuck = self.alive.snapshot().await;
                warn!(stuck = ?stuck, "shutdown grace exceeded; in-flight handlers cancelled");
                self.bus.publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")));
                Err(RuntimeError::GraceExceeded {
                    grace: self.cfg.grace,
                    stuck,
                })
            }
        };

        self.scheduler.stop().await;
        self.listener_stop.cancel();
        let listener = self.listener.lock().take();
        if let Some(listener) = listener {
            let _ = listener.await;
        }
        res
    }
}

/// Forwards bus events to the alive tracker and the subscribers until stopped,
/// then drains the subscriber queues.
fn spawn_listener(
    bus: &Bus,
    alive: Arc<AliveTracker>,
    subs: SubscriberSet,
    stop: CancellationToken,
) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                msg = rx.recv() => match msg {
                    Ok(ev) => {
                        alive.update(&ev).await;
                        subs.emit_arc(Arc::new(ev));
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        subs.shutdown().await;
    })
}
