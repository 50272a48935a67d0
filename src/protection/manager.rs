//! # Admission control across signals.
//!
//! [`ProtectionManager`] owns one [`CircuitBreaker`] and one [`RateLimiter`] per
//! protected signal and answers [`is_blocked`](ProtectionManager::is_blocked)
//! before every emission.
//!
//! ## Rules
//! - Signals without a breaker or limiter are never blocked.
//! - With protection enabled, both are provisioned from [`ProtectionConfig`] the
//!   first time the signal gets a handler; explicit `register_*` calls override.
//! - The breaker is consulted first; a refusal there leaves the limiter untouched.
//! - Breaker transitions publish `CircuitOpened` / `CircuitHalfOpen` / `CircuitClosed`.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, warn};

use super::breaker::{CircuitBreaker, CircuitState};
use super::limiter::RateLimiter;
use crate::events::{Bus, Event, EventKind};
use crate::metrics::Metrics;

/// Defaults used when protection is provisioned automatically.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtectionConfig {
    /// Provision breaker + limiter for every connected signal.
    pub enabled: bool,
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time the breaker stays open before admitting trials.
    pub open_timeout: Duration,
    /// Trial emissions admitted (and successes needed) while half-open.
    pub half_open_trials: u32,
    /// Admissions per second.
    pub max_requests_per_second: u32,
}

impl Default for ProtectionConfig {
    /// `enabled = false`, `failure_threshold = 5`, `open_timeout = 60s`,
    /// `half_open_trials = 3`, `max_requests_per_second = 1000`.
    fn default() -> Self {
        Self {
            enabled: false,
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
            half_open_trials: 3,
            max_requests_per_second: 1000,
        }
    }
}

/// Per-signal circuit breakers and rate limiters.
pub struct ProtectionManager {
    config: ProtectionConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    limiters: DashMap<String, Arc<RateLimiter>>,
    bus: Bus,
}

impl ProtectionManager {
    pub fn new(config: ProtectionConfig, bus: Bus) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
            limiters: DashMap::new(),
            bus,
        }
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    /// Creates breaker and limiter for `signal` from the defaults, once.
    pub(crate) fn provision(&self, signal: &str) {
        if !self.config.enabled {
            return;
        }
        self.breakers.entry(signal.to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                self.config.failure_threshold,
                self.config.open_timeout,
                self.config.half_open_trials,
            ))
        });
        self.limiters
            .entry(signal.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(self.config.max_requests_per_second)));
    }

    /// Installs (or replaces) the breaker of `signal`.
    pub fn register_circuit_breaker(
        &self,
        signal: &str,
        failure_threshold: u32,
        open_timeout: Duration,
        half_open_trials: u32,
    ) {
        self.breakers.insert(
            signal.to_string(),
            Arc::new(CircuitBreaker::new(failure_threshold, open_timeout, half_open_trials)),
        );
    }

    /// Installs (or replaces) the limiter of `signal`.
    pub fn register_rate_limiter(&self, signal: &str, max_requests_per_second: u32) {
        self.limiters.insert(
            signal.to_string(),
            Arc::new(RateLimiter::new(max_requests_per_second)),
        );
    }

    fn breaker(&self, signal: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(signal).map(|b| Arc::clone(b.value()))
    }

    /// `true` if the breaker or the limiter refuses this emission.
    pub fn is_blocked(&self, signal: &str) -> bool {
        if let Some(breaker) = self.breaker(signal) {
            let (admitted, transition) = breaker.try_admit();
            if let Some(to) = transition {
                self.report(signal, to, &breaker);
            }
            if !admitted {
                return true;
            }
        }
        let limiter = self.limiters.get(signal).map(|l| Arc::clone(l.value()));
        match limiter {
            Some(l) => !l.try_acquire(),
            None => false,
        }
    }

    /// Feeds the signal's error counter to its breaker.
    pub fn update(&self, signal: &str, metrics: &Metrics) {
        if let Some(breaker) = self.breaker(signal) {
            if let Some(to) = breaker.observe(metrics.error_count(signal)) {
                self.report(signal, to, &breaker);
            }
        }
    }

    pub fn circuit_state(&self, signal: &str) -> Option<CircuitState> {
        self.breaker(signal).map(|b| b.state())
    }

    /// Drops breaker and limiter of `signal`; re-provisioned at its next connect.
    pub fn reset(&self, signal: &str) {
        self.breakers.remove(signal);
        self.limiters.remove(signal);
    }

    pub fn reset_all(&self) {
        self.breakers.clear();
        self.limiters.clear();
    }

    fn report(&self, signal: &str, to: CircuitState, breaker: &CircuitBreaker) {
        let kind = match to {
            CircuitState::Open => {
                warn!(signal, failures = breaker.consecutive_failures(), "circuit opened");
                EventKind::CircuitOpened
            }
            CircuitState::HalfOpen => {
                info!(signal, "circuit half-open");
                EventKind::CircuitHalfOpen
            }
            CircuitState::Closed => {
                info!(signal, "circuit closed");
                EventKind::CircuitClosed
            }
        };
        let mut ev = Event::new(kind).with_signal(signal);
        if to == CircuitState::Open {
            ev = ev.with_reason(format!("consecutive_failures={}", breaker.consecutive_failures()));
        }
        self.bus.publish(ev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled() -> ProtectionConfig {
        ProtectionConfig {
            enabled: true,
            failure_threshold: 2,
            open_timeout: Duration::from_secs(60),
            half_open_trials: 1,
            max_requests_per_second: 1000,
        }
    }

    #[test]
    fn unprotected_signals_are_never_blocked() {
        let pm = ProtectionManager::new(ProtectionConfig::default(), Bus::new(8));
        pm.provision("a");
        assert!(!pm.is_blocked("a"));
        assert_eq!(pm.circuit_state("a"), None);
    }

    #[tokio::test]
    async fn errors_open_the_circuit_and_publish() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let pm = ProtectionManager::new(enabled(), bus);
        let metrics = Metrics::new();
        pm.provision("a");

        metrics.record_error("a");
        pm.update("a", &metrics);
        metrics.record_error("a");
        pm.update("a", &metrics);

        assert_eq!(pm.circuit_state("a"), Some(CircuitState::Open));
        assert!(pm.is_blocked("a"));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::CircuitOpened);
    }

    #[test]
    fn limiter_blocks_after_breaker_admits() {
        let pm = ProtectionManager::new(ProtectionConfig::default(), Bus::new(8));
        pm.register_rate_limiter("a", 1);
        assert!(!pm.is_blocked("a"));
        assert!(pm.is_blocked("a"));
    }

    #[test]
    fn explicit_registration_overrides_and_reset_clears() {
        let pm = ProtectionManager::new(enabled(), Bus::new(8));
        pm.provision("a");
        pm.register_circuit_breaker("a", 1, Duration::from_secs(60), 1);

        let metrics = Metrics::new();
        metrics.record_error("a");
        pm.update("a", &metrics);
        assert!(pm.is_blocked("a"));

        pm.reset("a");
        assert!(!pm.is_blocked("a"));
        pm.provision("b");
        pm.reset_all();
        assert_eq!(pm.circuit_state("b"), None);
    }
}
