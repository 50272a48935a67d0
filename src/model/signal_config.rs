//! # Per-signal dispatch configuration.
//!
//! [`SignalConfig`] is resolved once per signal at its first registration and is
//! fixed afterwards (first writer wins).
//!
//! ## Sentinel values
//! - `timeout = 0s` → no timeout (handlers run on the caller/worker without a canceller)
//! - `max_retries = 0` → exactly one attempt

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::priority::Priority;
use crate::handlers::TransactionConfig;

/// Dispatch settings for one signal.
///
/// ## Field semantics
/// - `async_dispatch`: fan out on the worker pool (`true`) or on the emitting task
/// - `max_retries`: extra attempts after the first
/// - `retry_delay`: fixed pause between attempts
/// - `max_handlers`: registrations past this cap are dropped silently
/// - `timeout`: per-attempt budget (`0s` disables)
/// - `record_metrics`: record emit/processed/timing counters
/// - `priority`: registration queue used for this signal's commands
/// - `transaction`: wrap handlers in a transactional decorator when set
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub async_dispatch: bool,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_handlers: usize,
    pub timeout: Duration,
    pub record_metrics: bool,
    pub priority: Priority,
    pub transaction: Option<TransactionConfig>,
}

impl Default for SignalConfig {
    /// Default configuration:
    ///
    /// - `async_dispatch = true`
    /// - `max_retries = 10`
    /// - `retry_delay = 100ms`
    /// - `max_handlers = 3`
    /// - `timeout = 10s`
    /// - `record_metrics = false`
    /// - `priority = Medium`
    /// - `transaction = None`
    fn default() -> Self {
        Self {
            async_dispatch: true,
            max_retries: 10,
            retry_delay: Duration::from_millis(100),
            max_handlers: 3,
            timeout: Duration::from_secs(10),
            record_metrics: false,
            priority: Priority::Medium,
            transaction: None,
        }
    }
}

impl SignalConfig {
    /// Returns the per-attempt timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → each attempt is cancelled after `d`
    #[inline]
    pub fn timeout_opt(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Total number of attempts (`max_retries + 1`).
    #[inline]
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn with_async(mut self, async_dispatch: bool) -> Self {
        self.async_dispatch = async_dispatch;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_max_handlers(mut self, max_handlers: usize) -> Self {
        self.max_handlers = max_handlers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_record_metrics(mut self, record_metrics: bool) -> Self {
        self.record_metrics = record_metrics;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_transaction(mut self, transaction: TransactionConfig) -> Self {
        self.transaction = Some(transaction);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SignalConfig::default();
        assert!(cfg.async_dispatch);
        assert_eq!(cfg.max_retries, 10);
        assert_eq!(cfg.retry_delay, Duration::from_millis(100));
        assert_eq!(cfg.max_handlers, 3);
        assert_eq!(cfg.timeout, Duration::from_secs(10));
        assert!(!cfg.record_metrics);
        assert_eq!(cfg.priority, Priority::Medium);
        assert!(cfg.transaction.is_none());
    }

    #[test]
    fn zero_timeout_disables() {
        let cfg = SignalConfig::default().with_timeout(Duration::ZERO);
        assert_eq!(cfg.timeout_opt(), None);
        assert_eq!(cfg.attempts(), 11);
    }

    #[test]
    fn config_serializes_to_json() {
        let cfg = SignalConfig::default().with_priority(Priority::High);
        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["priority"], "High");
        assert_eq!(json["max_handlers"], 3);
    }
}
