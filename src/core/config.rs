//! # Runtime configuration.
//!
//! [`SignalsConfig`] centralizes settings of the dispatch runtime itself; per-signal
//! behavior lives in [`SignalConfig`](crate::SignalConfig).
//!
//! ## Sentinel values
//! - `max_concurrent = 0` → unlimited (no pool semaphore created)
//! - `grace = 0s` → shutdown force-cancels in-flight handlers immediately

use std::time::Duration;

use crate::protection::ProtectionConfig;

/// Global configuration for the dispatch runtime.
///
/// ## Field semantics
/// - `grace`: maximum wait for in-flight handlers at shutdown
/// - `max_concurrent`: concurrently running pool tasks (`0` = unlimited)
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `persistent`: hand a record of every dispatch to the persistence collaborator
/// - `protection`: defaults for automatically provisioned breakers/limiters
#[derive(Clone, Debug)]
pub struct SignalsConfig {
    pub grace: Duration,
    pub max_concurrent: usize,
    pub bus_capacity: usize,
    pub persistent: bool,
    pub protection: ProtectionConfig,
}

impl SignalsConfig {
    /// Returns the pool concurrency limit as an `Option`.
    ///
    /// - `None` → unlimited
    /// - `Some(n)` → at most `n` pool tasks run simultaneously
    #[inline]
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.max_concurrent == 0 {
            None
        } else {
            Some(self.max_concurrent)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SignalsConfig {
    /// Default configuration:
    ///
    /// - `grace = 60s`
    /// - `max_concurrent = 0` (unlimited)
    /// - `bus_capacity = 1024`
    /// - `persistent = false`
    /// - `protection = ProtectionConfig::default()` (disabled)
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(60),
            max_concurrent: 0,
            bus_capacity: 1024,
            persistent: false,
            protection: ProtectionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_resolve() {
        let mut cfg = SignalsConfig::default();
        assert_eq!(cfg.concurrency_limit(), None);
        cfg.max_concurrent = 4;
        cfg.bus_capacity = 0;
        assert_eq!(cfg.concurrency_limit(), Some(4));
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert!(!cfg.protection.enabled);
    }
}
