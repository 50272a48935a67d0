//! Fixed one-second window rate limiter.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
}

/// Caps admissions per one-second window.
#[derive(Debug)]
pub struct RateLimiter {
    max_per_second: u32,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(max_per_second: u32) -> Self {
        Self {
            max_per_second,
            window: Mutex::new(Window {
                start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Counts one admission; `false` once the current window is full.
    pub fn try_acquire(&self) -> bool {
        let mut w = self.window.lock();
        if w.start.elapsed() >= WINDOW {
            w.start = Instant::now();
            w.count = 0;
        }
        if w.count < self.max_per_second {
            w.count += 1;
            true
        } else {
            false
        }
    }

    pub fn max_per_second(&self) -> u32 {
        self.max_per_second
    }
}
