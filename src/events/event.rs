//! # Runtime events published by the dispatch engine.
//!
//! The [`EventKind`] enum classifies events across four categories:
//! - **Emission events**: admission outcomes of `emit` (emitted, blocked, rejected, no handlers)
//! - **Handler events**: execution flow of one handler (starting, succeeded, failed, timeout, retry)
//! - **Registry events**: drain results (added, dropped at capacity, removed)
//! - **Runtime events**: circuit transitions, subscriber health, shutdown
//!
//! The [`Event`] struct carries metadata such as the signal, handler name and id,
//! attempt number, reasons and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use signalvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::HandlerFailed)
//!     .with_signal("order.created")
//!     .with_handler("writer", 7)
//!     .with_reason("boom")
//!     .with_attempt(3)
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::HandlerFailed);
//! assert_eq!(ev.signal.as_deref(), Some("order.created"));
//! assert_eq!(ev.handler_key().as_deref(), Some("order.created#7"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Emission events ===
    /// An emission passed admission and the pipeline and is being dispatched.
    ///
    /// Sets: `signal`, `reason` (`"sync"` or `"async"`).
    SignalEmitted,

    /// Protection (breaker or limiter) refused an emission.
    ///
    /// Sets: `signal`.
    SignalBlocked,

    /// An interceptor or filter vetoed an emission.
    ///
    /// Sets: `signal`.
    PipelineRejected,

    /// An emission found no registered handler.
    ///
    /// Sets: `signal`.
    NoHandlers,

    // === Handler events ===
    /// A handler attempt is starting.
    ///
    /// Sets: `signal`, `handler`, `handler_id`, `attempt` (1-based).
    HandlerStarting,

    /// A handler finished successfully (after any number of attempts).
    ///
    /// Sets: `signal`, `handler`, `handler_id`.
    HandlerSucceeded,

    /// A handler failed for good (retry budget spent or not retryable).
    ///
    /// Sets: `signal`, `handler`, `handler_id`, `reason`.
    HandlerFailed,

    /// A handler attempt exceeded its timeout and was cancelled.
    ///
    /// Sets: `signal`, `handler`, `handler_id`, `attempt`, `timeout_ms`.
    TimeoutHit,

    /// Another attempt is scheduled after a failure.
    ///
    /// Sets: `signal`, `handler`, `handler_id`, `attempt` (failed one), `delay_ms`, `reason`.
    RetryScheduled,

    // === Registry events ===
    /// An ADD command was applied by the drain.
    ///
    /// Sets: `signal`, `handler`, `handler_id`.
    HandlerAdded,

    /// An ADD command was discarded because the signal is at `max_handlers`.
    ///
    /// Sets: `signal`, `handler`, `handler_id`.
    HandlerDropped,

    /// A REMOVE command was applied by the drain.
    ///
    /// Sets: `signal`, `handler_id`.
    HandlerRemoved,

    // === Protection events ===
    /// Circuit breaker tripped to open.
    ///
    /// Sets: `signal`, `reason` (consecutive failures).
    CircuitOpened,

    /// Circuit breaker admitted trial traffic after its open duration.
    ///
    /// Sets: `signal`.
    CircuitHalfOpen,

    /// Circuit breaker recovered.
    ///
    /// Sets: `signal`.
    CircuitClosed,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `subscriber`, `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `subscriber`, `reason` (`"full"` or `"closed"`).
    SubscriberOverflow,

    // === Shutdown events ===
    /// Shutdown requested.
    ShutdownRequested,

    /// All in-flight handlers stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; in-flight handlers were force-cancelled.
    GraceExceeded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Signal name, if applicable.
    pub signal: Option<Arc<str>>,
    /// Handler name, if applicable.
    pub handler: Option<Arc<str>>,
    /// Handler registration id, if applicable.
    pub handler_id: Option<u64>,
    /// Subscriber name (subscriber health events only).
    pub subscriber: Option<&'static str>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Attempt timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
    /// Delay before the next attempt in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            signal: None,
            handler: None,
            handler_id: None,
            subscriber: None,
            attempt: None,
            timeout_ms: None,
            delay_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_signal(mut self, signal: impl Into<Arc<str>>) -> Self {
        self.signal = Some(signal.into());
        self
    }

    /// Attaches handler name and registration id.
    #[inline]
    pub fn with_handler(mut self, handler: impl Into<Arc<str>>, id: u64) -> Self {
        self.handler = Some(handler.into());
        self.handler_id = Some(id);
        self
    }

    #[inline]
    pub fn with_handler_id(mut self, id: u64) -> Self {
        self.handler_id = Some(id);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(compact_ms(d));
        self
    }

    /// Attaches a retry delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(compact_ms(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"));
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// `signal#handler_id` key identifying one registration, if both are set.
    pub fn handler_key(&self) -> Option<String> {
        match (&self.signal, self.handler_id) {
            (Some(signal), Some(id)) => Some(format!("{signal}#{id}")),
            _ => None,
        }
    }
}

fn compact_ms(d: Duration) -> u32 {
    d.as_millis().min(u128::from(u32::MAX)) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::new(EventKind::SignalEmitted);
        let b = Event::new(EventKind::SignalEmitted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn durations_are_clamped() {
        let ev = Event::new(EventKind::RetryScheduled).with_delay(Duration::from_secs(u64::MAX));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }

    #[test]
    fn subscriber_events_carry_name() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert_eq!(ev.subscriber, Some("audit"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber=audit reason=full"));
        assert_eq!(ev.handler_key(), None);
    }
}
