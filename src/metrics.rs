//! # Per-signal dispatch counters.
//!
//! [`Metrics`] keeps lock-free counters keyed by signal name. Every stage writes
//! here; the protection layer reads the error count to drive its circuit breakers.
//!
//! ## Counters
//! ```text
//! signal ─► { emit_count, handler_count, processing_time_ms,
//!             error_count, processed_count, last_emit_ms, last_process_ms }
//! ```
//!
//! ## Rules
//! - Counters are created on first write; reads of unknown signals yield zeroes.
//! - `handler_count` may go negative if removals outnumber recorded additions.
//! - Timestamps are Unix milliseconds; `0` means "never".

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Default)]
struct Counters {
    emit_count: AtomicU64,
    handler_count: AtomicI64,
    processing_time_ms: AtomicU64,
    error_count: AtomicU64,
    processed_count: AtomicU64,
    last_emit_ms: AtomicU64,
    last_process_ms: AtomicU64,
}

/// Point-in-time copy of one signal's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub emit_count: u64,
    pub handler_count: i64,
    pub total_processing_time_ms: u64,
    pub error_count: u64,
    pub processed_count: u64,
    pub last_emit_ms: u64,
    pub last_process_ms: u64,
}

/// Concurrent counters keyed by signal name.
#[derive(Debug, Default)]
pub struct Metrics {
    signals: DashMap<String, Counters>,
    processed_total: AtomicU64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, name: &str, f: impl FnOnce(&Counters) -> R) -> R {
        if let Some(c) = self.signals.get(name) {
            return f(&c);
        }
        let entry = self.signals.entry(name.to_string()).or_default();
        f(&entry)
    }

    /// Counts one emission and stamps the last-emit time.
    pub fn record_emit(&self, name: &str) {
        self.with(name, |c| {
            c.emit_count.fetch_add(1, Ordering::Relaxed);
            c.last_emit_ms.store(now_ms(), Ordering::Relaxed);
        });
    }

    pub fn record_handler_added(&self, name: &str) {
        self.with(name, |c| c.handler_count.fetch_add(1, Ordering::Relaxed));
    }

    pub fn record_handler_removed(&self, name: &str) {
        self.with(name, |c| c.handler_count.fetch_sub(1, Ordering::Relaxed));
    }

    /// Adds `elapsed` to the cumulative processing time.
    pub fn record_processing_time(&self, name: &str, elapsed: Duration) {
        let ms = elapsed.as_millis().min(u128::from(u64::MAX)) as u64;
        self.with(name, |c| c.processing_time_ms.fetch_add(ms, Ordering::Relaxed));
    }

    pub fn record_error(&self, name: &str) {
        self.with(name, |c| c.error_count.fetch_add(1, Ordering::Relaxed));
    }

    /// Counts one successful handler execution (per signal and globally).
    pub fn record_processed(&self, name: &str) {
        self.processed_total.fetch_add(1, Ordering::Relaxed);
        self.with(name, |c| {
            c.processed_count.fetch_add(1, Ordering::Relaxed);
            c.last_process_ms.store(now_ms(), Ordering::Relaxed);
        });
    }

    /// Current error count (0 for unknown signals).
    pub fn error_count(&self, name: &str) -> u64 {
        self.signals
            .get(name)
            .map(|c| c.error_count.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Successful handler executions across all signals.
    pub fn processed_total(&self) -> u64 {
        self.processed_total.load(Ordering::Relaxed)
    }

    /// Last successful processing time, if any.
    pub fn last_process_ms(&self, name: &str) -> Option<u64> {
        self.signals
            .get(name)
            .map(|c| c.last_process_ms.load(Ordering::Relaxed))
            .filter(|ms| *ms != 0)
    }

    /// Snapshot of one signal (zeroes if unknown).
    pub fn snapshot(&self, name: &str) -> MetricsSnapshot {
        self.signals
            .get(name)
            .map(|c| MetricsSnapshot {
                emit_count: c.emit_count.load(Ordering::Relaxed),
                handler_count: c.handler_count.load(Ordering::Relaxed),
                total_processing_time_ms: c.processing_time_ms.load(Ordering::Relaxed),
                error_count: c.error_count.load(Ordering::Relaxed),
                processed_count: c.processed_count.load(Ordering::Relaxed),
                last_emit_ms: c.last_emit_ms.load(Ordering::Relaxed),
                last_process_ms: c.last_process_ms.load(Ordering::Relaxed),
            })
            .unwrap_or_default()
    }

    /// Snapshots of every signal with recorded activity.
    pub fn all(&self) -> HashMap<String, MetricsSnapshot> {
        let names: Vec<String> = self.signals.iter().map(|e| e.key().clone()).collect();
        names
            .into_iter()
            .map(|name| {
                let snap = self.snapshot(&name);
                (name, snap)
            })
            .collect()
    }
}
