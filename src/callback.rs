//! # Per-emission outcome callbacks.
//!
//! A [`SignalCallback`] observes each handler's outcome for one emission:
//! `on_success` or `on_error`, then always `on_complete`. Admission outcomes
//! (blocked, rejected, no handlers) arrive as `on_error` + `on_complete` once per emission.
//!
//! The [`ErrorHandler`] passed to `emit` only sees handler-originated failures.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::SignalError;
use crate::model::Envelope;

/// Caller-supplied sink for handler failures of one emission.
pub type ErrorHandler = Arc<dyn Fn(&SignalError) + Send + Sync + 'static>;

/// Shared handle to a callback.
pub type CallbackRef<S, T> = Arc<dyn SignalCallback<S, T>>;

/// Outcome hooks for one emission. Every method defaults to a no-op.
///
/// With async dispatch the hooks run on the worker that executed the handler;
/// there is no ordering across handlers.
pub trait SignalCallback<S, T>: Send + Sync + 'static {
    fn on_success(&self, _signal: &str, _envelope: &Envelope<S, T>) {}

    fn on_error(&self, _signal: &str, _envelope: &Envelope<S, T>, _error: &SignalError) {}

    fn on_complete(&self, _signal: &str, _envelope: &Envelope<S, T>) {}
}

/// Callback that logs each outcome and, on completion, the emission's trace tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCallback;

impl<S, T> SignalCallback<S, T> for LoggingCallback
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn on_success(&self, signal: &str, envelope: &Envelope<S, T>) {
        info!(signal = %signal, event_id = %envelope.context().event_id(), "signal handled");
    }

    fn on_error(&self, signal: &str, envelope: &Envelope<S, T>, error: &SignalError) {
        warn!(
            signal = %signal,
            event_id = %envelope.context().event_id(),
            label = error.as_label(),
            error = %error,
            "signal handling failed"
        );
    }

    fn on_complete(&self, signal: &str, envelope: &Envelope<S, T>) {
        debug!(signal = %signal, trace = %envelope.context().render_tree(), "signal completed");
    }
}
