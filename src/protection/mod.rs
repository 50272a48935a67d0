//! Admission control: per-signal circuit breakers and rate limiters.

mod breaker;
mod limiter;
mod manager;

pub use breaker::{CircuitBreaker, CircuitState};
pub use limiter::RateLimiter;
pub use manager::{ProtectionConfig, ProtectionManager};
