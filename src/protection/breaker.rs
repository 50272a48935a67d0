//! # Per-signal circuit breaker.
//!
//! ```text
//!            failures >= threshold              open_timeout elapsed
//!  Closed ───────────────────────────► Open ───────────────────────────► HalfOpen
//!    ▲                                  ▲                                   │
//!    │        half_open_trials successes│ any failure                       │
//!    └──────────────────────────────────┴───────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Closed admits everything; a success resets the consecutive-failure count.
//! - Open admits nothing until `open_timeout` has elapsed since it opened.
//! - HalfOpen admits at most `half_open_trials` emissions.
//! - Outcomes are derived from the signal's error counter: a growth since the
//!   last observation is one failure, otherwise one success.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Breaker position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    since: Instant,
    trials_admitted: u32,
    trial_successes: u32,
    last_error_count: u64,
}

/// Circuit breaker thresholds and state for one signal.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_timeout: Duration,
    half_open_trials: u32,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration, half_open_trials: u32) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            open_timeout,
            half_open_trials: half_open_trials.max(1),
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                since: Instant::now(),
                trials_admitted: 0,
                trial_successes: 0,
                last_error_count: 0,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Decides admission; returns the transition taken, if any.
    pub fn try_admit(&self) -> (bool, Option<CircuitState>) {
        let mut s = self.inner.lock();
        match s.state {
            CircuitState::Closed => (true, None),
            CircuitState::Open if s.since.elapsed() >= self.open_timeout => {
                s.state = CircuitState::HalfOpen;
                s.since = Instant::now();
                s.trials_admitted = 1;
                s.trial_successes = 0;
                (true, Some(CircuitState::HalfOpen))
            }
            CircuitState::Open => (false, None),
            CircuitState::HalfOpen if s.trials_admitted < self.half_open_trials => {
                s.trials_admitted += 1;
                (true, None)
            }
            CircuitState::HalfOpen => (false, None),
        }
    }

    /// Feeds the signal's current error count; returns the transition taken, if any.
    pub fn observe(&self, error_count: u64) -> Option<CircuitState> {
        let mut s = self.inner.lock();
        let failed = error_count > s.last_error_count;
        s.last_error_count = error_count;
        if failed {
            self.on_failure(&mut s)
        } else {
            self.on_success(&mut s)
        }
    }

    fn on_failure(&self, s: &mut BreakerState) -> Option<CircuitState> {
        match s.state {
            CircuitState::Closed => {
                s.consecutive_failures += 1;
                if s.consecutive_failures >= self.failure_threshold {
                    Some(Self::open(s))
                } else {
                    None
                }
            }
            CircuitState::HalfOpen => Some(Self::open(s)),
            CircuitState::Open => None,
        }
    }

    fn on_success(&self, s: &mut BreakerState) -> Option<CircuitState> {
        match s.state {
            CircuitState::Closed => {
                s.consecutive_failures = 0;
                None
            }
            CircuitState::HalfOpen => {
                s.trial_successes += 1;
                if s.trial_successes >= self.half_open_trials {
                    s.state = CircuitState::Closed;
                    s.since = Instant::now();
                    s.consecutive_failures = 0;
                    Some(CircuitState::Closed)
                } else {
                    None
                }
            }
            CircuitState::Open => None,
        }
    }

    fn open(s: &mut BreakerState) -> CircuitState {
        s.state = CircuitState::Open;
        s.since = Instant::now();
        s.trials_admitted = 0;
        s.trial_successes = 0;
        CircuitState::Open
    }

    /// Consecutive failures counted while closed.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }
}
