//! # Jitter policy for redelivery delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that transactional
//! handlers failing together do not redeliver in lockstep.
//!

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Randomization applied on top of a computed backoff delay.
///
/// ## Trade-offs
/// - **None**: predictable; handlers failing together redeliver together
/// - **Full**: maximum spread, may shorten delays a lot
/// - **Equal**: keeps at least half of each delay (transaction default)
/// - **Decorrelated**: random between the floor and three times the base
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JitterPolicy {
    /// No jitter: use exact backoff delay.
    #[default]
    None,

    /// Full jitter: random delay in [0, delay].
    Full,

    /// Equal jitter: delay/2 + random[0, delay/2].
    Equal,

    /// Decorrelated jitter: random[base, prev * 3], capped at max.
    ///
    /// Needs context via [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`. `Decorrelated` passes through unchanged here;
    /// use [`apply_decorrelated`](Self::apply_decorrelated) for it.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            _ if ms == 0 => Duration::ZERO,
            JitterPolicy::Full => Duration::from_millis(rand::rng().random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let extra = if half == 0 { 0 } else { rand::rng().random_range(0..=half) };
                Duration::from_millis(half + extra)
            }
        }
    }

    /// Decorrelated jitter: uniform in `[base, min(prev * 3, max)]`.
    ///
    /// Non-decorrelated policies fall back to `apply(prev)`.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let base_ms = base.as_millis() as u64;
        let upper = (prev.as_millis() as u64)
            .saturating_mul(3)
            .min(max.as_millis() as u64)
            .max(base_ms);

        if base_ms >= upper {
            return base;
        }
        Duration::from_millis(rand::rng().random_range(base_ms..=upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(1234);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn decorrelated_with_tight_bounds_returns_base() {
        let base = Duration::from_millis(500);
        let got = JitterPolicy::Decorrelated.apply_decorrelated(base, Duration::from_millis(100), base);
        assert_eq!(got, base);
    }
}
