//! Runtime core: registration, dispatch and lifecycle.
//!
//! The public entry point is [`Signals`], built through [`SignalsBuilder`].
//!
//! Internal modules:
//! - [`registry`]: priority-queued handler registration and the drain;
//! - [`processor`]: one handler against one envelope (span, retry, timeout);
//! - [`emitter`]: sync and async fan-out to all handlers;
//! - [`pool`]: worker pool with concurrency cap and forced termination;
//! - [`scheduler`]: dedicated thread firing timeout cancellations;
//! - [`signals`]: the facade tying it together.

mod builder;
mod config;
mod emitter;
mod pool;
mod processor;
mod registry;
mod scheduler;
mod signals;

pub use builder::SignalsBuilder;
pub use config::SignalsConfig;
pub use pool::{TaskHandle, WorkerPool};
pub use registry::RegisteredHandler;
pub use signals::{EmitOutcome, Signals};
