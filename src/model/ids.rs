//! # Time-ordered handler ids.
//!
//! Snowflake-style layout packed into a `u64`:
//! ```text
//! | 41 bits: millis since EPOCH | 22 bits: per-millisecond sequence |
//! ```
//! Ids produced by one process are unique and increase monotonically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Custom epoch (2024-01-01T00:00:00Z) in milliseconds.
const EPOCH_MS: u64 = 1_704_067_200_000;
const SEQ_BITS: u64 = 22;

/// Last issued id; the next id is always strictly greater.
static LAST_ID: AtomicU64 = AtomicU64::new(0);

/// Returns the next time-ordered unique id.
pub fn next_id() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(EPOCH_MS)
        .saturating_sub(EPOCH_MS);
    let candidate = now << SEQ_BITS;

    let mut last = LAST_ID.load(Ordering::Relaxed);
    loop {
        // Same millisecond (or clock went backwards): bump the sequence.
        let next = if candidate > last { candidate } else { last + 1 };
        match LAST_ID.compare_exchange_weak(last, next, Ordering::AcqRel, Ordering::Relaxed) {
            Ok(_) => return next,
            Err(actual) => last = actual,
        }
    }
}

/// Extracts the millisecond timestamp (Unix epoch) from an id.
pub fn timestamp_ms(id: u64) -> u64 {
    (id >> SEQ_BITS) + EPOCH_MS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_strictly_increasing() {
        let mut prev = next_id();
        for _ in 0..10_000 {
            let id = next_id();
            assert!(id > prev, "{id} should be greater than {prev}");
            prev = id;
        }
    }

    #[test]
    fn ids_are_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..2_000).map(|_| next_id()).collect::<Vec<_>>()))
            .collect();
        let mut seen = HashSet::new();
        for h in handles {
            for id in h.join().unwrap() {
                assert!(seen.insert(id), "duplicate id {id}");
            }
        }
    }

    #[test]
    fn timestamp_is_recoverable() {
        let before = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis() as u64;
        let id = next_id();
        assert!(timestamp_ms(id) + 1 >= before);
    }
}
