//! # Logging subscriber.
//!
//! [`LogWriter`] renders runtime events through `tracing`, one line per event:
//! ```text
//! INFO  signal=orders handler=writer id=42 attempt=1 [starting]
//! WARN  signal=orders handler=writer id=42 err="db down" [failed]
//! WARN  signal=orders delay_ms=100 after_attempt=1 [retry]
//! WARN  signal=orders [circuit-opened]
//! ```
//! The crate never installs a `tracing` subscriber; the application does.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// `tracing`-backed event logger (feature `logging`).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let signal = e.signal.as_deref().unwrap_or("-");
        let handler = e.handler.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::SignalEmitted => debug!(signal, mode = reason, "[emitted]"),
            EventKind::SignalBlocked => info!(signal, "[blocked]"),
            EventKind::PipelineRejected => info!(signal, "[rejected]"),
            EventKind::NoHandlers => debug!(signal, "[no-handlers]"),
            EventKind::HandlerStarting => {
                debug!(signal, handler, id = ?e.handler_id, attempt = ?e.attempt, "[starting]")
            }
            EventKind::HandlerSucceeded => debug!(signal, handler, id = ?e.handler_id, "[succeeded]"),
            EventKind::HandlerFailed => {
                warn!(signal, handler, id = ?e.handler_id, err = reason, "[failed]")
            }
            EventKind::TimeoutHit => {
                warn!(signal, handler, timeout_ms = ?e.timeout_ms, attempt = ?e.attempt, "[timeout]")
            }
            EventKind::RetryScheduled => warn!(
                signal,
                handler,
                delay_ms = ?e.delay_ms,
                after_attempt = ?e.attempt,
                err = reason,
                "[retry]"
            ),
            EventKind::HandlerAdded => debug!(signal, handler, id = ?e.handler_id, "[added]"),
            EventKind::HandlerDropped => warn!(signal, handler, id = ?e.handler_id, "[dropped-at-capacity]"),
            EventKind::HandlerRemoved => debug!(signal, id = ?e.handler_id, "[removed]"),
            EventKind::CircuitOpened => warn!(signal, reason, "[circuit-opened]"),
            EventKind::CircuitHalfOpen => info!(signal, "[circuit-half-open]"),
            EventKind::CircuitClosed => info!(signal, "[circuit-closed]"),
            EventKind::SubscriberPanicked => warn!(subscriber = ?e.subscriber, reason, "[subscriber-panicked]"),
            EventKind::SubscriberOverflow => warn!(subscriber = ?e.subscriber, reason, "[subscriber-overflow]"),
            EventKind::ShutdownRequested => info!("[shutdown-requested]"),
            EventKind::AllStoppedWithin => info!("[all-stopped-within-grace]"),
            EventKind::GraceExceeded => warn!("[grace-exceeded]"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
