//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registry` drain, processor, emitter, protection manager,
//!   `Signals` facade, `SubscriberSet` workers (overflow/panic).
//! - **Consumer**: the `Signals` listener task, which updates the `AliveTracker`
//!   and fans out to the `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
