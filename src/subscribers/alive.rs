//! # In-flight handler tracker.
//!
//! [`AliveTracker`] counts handler executions that are currently running, keyed by
//! `signal#handler_id`, by listening to handler lifecycle events.
//!
//! ```text
//! Bus ──► Signals listener ──► AliveTracker::update(&Event)
//!                                    │
//!          HandlerStarting(1) ──► +1 │ HandlerSucceeded / HandlerFailed ──► -1
//!                                    ▼
//!                      HashMap<"signal#id", in-flight count>
//! ```
//!
//! ## Rules
//! - Only the first attempt counts as a start; retries stay inside one execution.
//! - A key disappears once its count reaches zero.
//! - Used during shutdown to name the executions that did not finish within grace.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::events::{Event, EventKind};

/// Thread-safe tracker of in-flight handler executions.
#[derive(Default)]
pub struct AliveTracker {
    state: RwLock<HashMap<String, usize>>,
}

impl AliveTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a lifecycle event; returns `true` if the in-flight set changed.
    pub async fn update(&self, ev: &Event) -> bool {
        let Some(key) = ev.handler_key() else {
            return false;
        };
        match ev.kind {
            EventKind::HandlerStarting if ev.attempt.unwrap_or(1) == 1 => {
                *self.state.write().await.entry(key).or_insert(0) += 1;
                true
            }
            EventKind::HandlerSucceeded | EventKind::HandlerFailed => {
                let mut state = self.state.write().await;
                match state.get_mut(&key) {
                    Some(n) if *n > 1 => {
                        *n -= 1;
                        true
                    }
                    Some(_) => {
                        state.remove(&key);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Sorted `signal#id` keys of executions still running.
    pub async fn snapshot(&self) -> Vec<String> {
        let mut alive: Vec<String> = self.state.read().await.keys().cloned().collect();
        alive.sort_unstable();
        alive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(kind: EventKind, attempt: Option<u32>) -> Event {
        let mut e = Event::new(kind).with_signal("orders").with_handler("writer", 9);
        e.attempt = attempt;
        e
    }

    #[tokio::test]
    async fn tracks_running_executions() {
        let t = AliveTracker::new();
        assert!(t.update(&ev(EventKind::HandlerStarting, Some(1))).await);
        assert!(t.update(&ev(EventKind::HandlerStarting, Some(1))).await);
        assert!(!t.update(&ev(EventKind::HandlerStarting, Some(2))).await);
        assert_eq!(t.snapshot().await, vec!["orders#9".to_string()]);

        t.update(&ev(EventKind::HandlerSucceeded, None)).await;
        assert_eq!(t.snapshot().await.len(), 1);
        t.update(&ev(EventKind::HandlerFailed, None)).await;
        assert!(t.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn events_without_handler_are_ignored() {
        let t = AliveTracker::new();
        assert!(!t.update(&Event::new(EventKind::HandlerStarting)).await);
    }
}
