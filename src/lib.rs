//! # signalvisor
//!
//! **Signalvisor** is an in-process signal dispatch engine for Rust.
//!
//! Producers emit named signals carrying a typed payload; independently registered
//! handlers receive them subject to priority ordering, interception, filtering,
//! transformation, retry, timeout and admission control.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   connect / disconnect                         emit(signal, envelope)
//!          │                                              │
//!          ▼                                              ▼
//! ┌──────────────────────┐               ┌──────────────────────────────┐
//! │ Registry             │               │ ProtectionManager            │
//! │ [HIGH][MEDIUM][LOW]  │               │ circuit breaker + limiter    │
//! │   └─► drain ─► lists │               └──────────────┬───────────────┘
//! └──────────┬───────────┘                              ▼
//!            │                           ┌──────────────────────────────┐
//!            │                           │ Pipeline                     │
//!            │                           │ interceptors → filters →     │
//!            │                           │ transformers                 │
//!            │                           └──────────────┬───────────────┘
//!            └──────────── handlers(signal) ───────────►▼
//!                                        ┌──────────────────────────────┐
//!                                        │ Emitter (sync | async)       │
//!                                        └──────────────┬───────────────┘
//!                                                       ▼ per handler
//!                                        ┌──────────────────────────────┐
//!                                        │ Processor                    │
//!                                        │ span + retry + timeout       │──► WorkerPool
//!                                        └──────────────┬───────────────┘    TimeoutScheduler
//!                                                       ▼
//!                                        Metrics / Protection update,
//!                                        post-processing, persistence
//!
//! Every stage ── publish(Event) ──► Bus ──► listener ──► AliveTracker
//!                                                   └──► SubscriberSet ──► Subscribe::on_event
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                              |
//! |-------------------|---------------------------------------------------------------|-------------------------------------------------|
//! | **Dispatch**      | Connect handlers and emit signals.                            | [`Signals`], [`SignalsBuilder`], [`EmitOutcome`] |
//! | **Handlers**      | Async consumers, closures and combinators.                    | [`Handler`], [`HandlerFn`], [`and_then`], [`when`] |
//! | **Pipeline**      | Veto, gate and rewrite emissions before dispatch.             | [`Interceptor`], [`Filter`], [`Transformer`], [`Binding`] |
//! | **Protection**    | Per-signal circuit breaker and rate limiter.                  | [`ProtectionManager`], [`ProtectionConfig`]     |
//! | **Transactions**  | Transactional redelivery with dead letters.                   | [`TransactionalHandler`], [`DeadLetterQueue`]   |
//! | **Tracing**       | Per-emission span tree.                                       | [`Context`], [`Span`], [`LoggingCallback`]      |
//! | **Subscriber API**| Hook into runtime events.                                     | [`Subscribe`], [`Event`], [`EventKind`]         |
//! | **Errors**        | Typed errors for dispatch and the runtime.                    | [`SignalError`], [`RuntimeError`]               |
//! | **Configuration** | Runtime and per-signal settings.                              | [`SignalsConfig`], [`SignalConfig`]             |
//!
//! ## Optional features
//! - `logging` (default): exports the built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use signalvisor::{Envelope, HandlerError, HandlerFn, SignalConfig, Signals, SignalsConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn signalvisor::Subscribe>> = vec![Arc::new(signalvisor::LogWriter)];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn signalvisor::Subscribe>> = Vec::new();
//!
//!     let signals = Signals::<&'static str, u32>::builder(SignalsConfig::default())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     let config = SignalConfig::default()
//!         .with_async(false)
//!         .with_timeout(Duration::from_secs(1));
//!     signals.connect_with_config(
//!         "greet",
//!         HandlerFn::arc("hello", |env: Arc<Envelope<&'static str, u32>>| async move {
//!             println!("hello #{} from {}", env.payload(), env.sender());
//!             Ok::<_, HandlerError>(())
//!         }),
//!         config,
//!     );
//!
//!     signals.emit("greet", Envelope::new("greet", "main", 1), |_| {}).await;
//!     signals.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod bind;
mod callback;
mod core;
mod error;
mod events;
mod handlers;
mod metrics;
mod model;
mod persistence;
mod pipeline;
mod policies;
mod protection;
mod subscribers;

// ---- Public re-exports ----

pub use bind::{Binding, Component};
pub use callback::{CallbackRef, ErrorHandler, LoggingCallback, SignalCallback};
pub use core::{
    EmitOutcome, RegisteredHandler, Signals, SignalsBuilder, SignalsConfig, TaskHandle, WorkerPool,
};
pub use error::{HandlerError, RuntimeError, SignalError};
pub use events::{Bus, Event, EventKind};
pub use handlers::{
    DeadLetter, DeadLetterQueue, DeadLetterSink, Handler, HandlerFn, HandlerRef, Transaction,
    TransactionConfig, TransactionManager, TransactionalHandler, and_then, when,
};
pub use metrics::{Metrics, MetricsSnapshot};
pub use model::{ActiveSpan, Context, Envelope, Priority, SignalConfig, Span, ids};
pub use persistence::{Persistence, PersistenceRecord};
pub use pipeline::{Filter, Interceptor, Transformer};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use protection::{CircuitBreaker, CircuitState, ProtectionConfig, ProtectionManager, RateLimiter};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
