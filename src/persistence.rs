//! Persistence hook for dispatched emissions.
//!
//! When [`SignalsConfig::persistent`](crate::SignalsConfig) is set, every dispatched
//! emission hands one [`PersistenceRecord`] per handler to the configured
//! [`Persistence`] on the worker pool. Failures are logged and never reach the emitter.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::HandlerError;
use crate::metrics::MetricsSnapshot;
use crate::model::{Priority, SignalConfig, Span};

/// What a persistence backend receives for one handler of one emission.
#[derive(Debug, Clone, Serialize)]
pub struct PersistenceRecord {
    pub signal: String,
    pub handler_id: u64,
    pub handler: String,
    pub priority: Priority,
    pub config: SignalConfig,
    pub event_id: String,
    /// Spans recorded so far for the emission.
    pub spans: Vec<Span>,
    /// Signal counters at the time of the hand-off.
    pub metrics: MetricsSnapshot,
}

/// Storage backend for dispatch records.
#[async_trait]
pub trait Persistence: Send + Sync + 'static {
    async fn save(&self, record: PersistenceRecord) -> Result<(), HandlerError>;
}
