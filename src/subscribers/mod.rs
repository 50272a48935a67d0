//! # Event subscribers for the dispatch runtime.
//!
//! ```text
//! Registry / Processor / Emitter ── publish(Event) ──► Bus ──► Signals listener
//!                                                                  │
//!                                          ┌───────────────────────┤
//!                                          ▼                       ▼
//!                                   AliveTracker            SubscriberSet
//!                                 (in-flight keys)     ┌─────────┼─────────┐
//!                                                      ▼         ▼         ▼
//!                                                  LogWriter   Metrics   Custom
//! ```
//!
//! ## Subscriber types
//! - **Passive subscribers** observe and react to events (logging, alerts)
//! - **Internal state** is kept by [`AliveTracker`], fed directly by the listener

mod alive;
#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

pub(crate) use alive::AliveTracker;
#[cfg(feature = "logging")]
pub use log::LogWriter;
pub(crate) use set::panic_message;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
