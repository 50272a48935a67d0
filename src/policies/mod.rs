//! Redelivery delay policies.
//!
//! - [`BackoffPolicy`] how delays evolve (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization so concurrent failures spread out
//!
//! ```text
//! TransactionConfig { backoff: BackoffPolicy, .. }
//!      └─► TransactionalHandler sleeps backoff.next(attempt) between redeliveries
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
