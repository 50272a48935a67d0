//! # Handler registry: priority-queued registration and removal.
//!
//! Structural changes never touch the live handler lists directly: `connect` and
//! `disconnect` enqueue a [`Registration`] command on one of three lock-free queues
//! and then drain.
//!
//! ## Architecture
//! ```text
//! register_handler ──► ADD{id}    ─┐
//! unregister_handler ─► REMOVE{id} ┼─► [HIGH] [MEDIUM] [LOW] ──► process_events()
//!                                  │                               │
//!                                  │           drains HIGH, then MEDIUM, then LOW
//!                                  │                               ▼
//!                                  └──────────────── handlers: signal ─► Vec<RegisteredHandler>
//! ```
//!
//! ## Rules
//! - A signal's config is resolved once, on first registration (first writer wins).
//! - ADD applies only while the list is below `max_handlers`; otherwise the command is
//!   dropped and `HandlerDropped` published. The caller still gets its id.
//! - REMOVE filters the id out; an unknown id is a no-op.
//! - Only one drain runs at a time. The busy flag is checked outside the lock, so a
//!   caller arriving mid-drain returns immediately and its command is applied by the
//!   running drain or the next one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use crate::events::{Bus, Event, EventKind};
use crate::handlers::HandlerRef;
use crate::metrics::Metrics;
use crate::model::{Context, Priority, SignalConfig, ids};

/// A handler attached to a signal.
pub struct RegisteredHandler<S, T> {
    /// Registration id returned by `connect`.
    pub id: u64,
    pub signal: String,
    pub handler: HandlerRef<S, T>,
    /// Queue the registration went through.
    pub priority: Priority,
    /// Context supplied at registration, if any.
    pub context: Option<Context>,
}

impl<S, T> RegisteredHandler<S, T> {
    /// `signal#id` key used in events and shutdown reports.
    pub fn key(&self) -> String {
        format!("{}#{}", self.signal, self.id)
    }
}

enum Command<S, T> {
    Add(HandlerRef<S, T>),
    Remove,
}

/// A queued structural change, consumed exactly once by the drain.
struct Registration<S, T> {
    id: u64,
    signal: String,
    priority: Priority,
    context: Option<Context>,
    command: Command<S, T>,
}

/// Clears the busy flag even if applying a command panics.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Signal → handler list map with per-signal configuration.
pub struct Registry<S, T> {
    handlers: DashMap<String, Vec<Arc<RegisteredHandler<S, T>>>>,
    configs: DashMap<String, SignalConfig>,
    high: SegQueue<Registration<S, T>>,
    medium: SegQueue<Registration<S, T>>,
    low: SegQueue<Registration<S, T>>,
    draining: AtomicBool,
    drain_lock: Mutex<()>,
    metrics: Arc<Metrics>,
    bus: Bus,
}

impl<S, T> Registry<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new(metrics: Arc<Metrics>, bus: Bus) -> Self {
        Self {
            handlers: DashMap::new(),
            configs: DashMap::new(),
            high: SegQueue::new(),
            medium: SegQueue::new(),
            low: SegQueue::new(),
            draining: AtomicBool::new(false),
            drain_lock: Mutex::new(()),
            metrics,
            bus,
        }
    }

    fn queue(&self, priority: Priority) -> &SegQueue<Registration<S, T>> {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }

    fn queues_empty(&self) -> bool {
        self.high.is_empty() && self.medium.is_empty() && self.low.is_empty()
    }

    /// Enqueues an ADD for `handler` and drains. Returns the new registration id.
    ///
    /// The id is returned even when the drain later drops the command because
    /// the signal is at capacity.
    pub fn register_handler(
        &self,
        signal: &str,
        handler: HandlerRef<S, T>,
        config: SignalConfig,
        context: Option<Context>,
    ) -> u64 {
        self.configs
            .entry(signal.to_string())
            .or_insert_with(|| config.clone());
        let id = ids::next_id();

        self.queue(config.priority).push(Registration {
            id,
            signal: signal.to_string(),
            priority: config.priority,
            context,
            command: Command::Add(handler),
        });
        if config.record_metrics {
            self.metrics.record_handler_added(signal);
        }
        self.process_events();
        id
    }

    /// Enqueues a REMOVE for `id` on the signal's current priority queue and drains.
    pub fn unregister_handler(&self, signal: &str, id: u64, context: Option<Context>) {
        let priority = self.config(signal).priority;
        self.queue(priority).push(Registration {
            id,
            signal: signal.to_string(),
            priority,
            context,
            command: Command::Remove,
        });
        self.metrics.record_handler_removed(signal);
        self.process_events();
    }

    /// Applies every queued command, HIGH first, then MEDIUM, then LOW.
    ///
    /// Returns immediately if another drain is running.
    pub fn process_events(&self) {
        if self.draining.load(Ordering::Acquire) {
            return;
        }
        {
            let _lock = self.drain_lock.lock();
            if self.queues_empty() {
                return;
            }
            self.draining.store(true, Ordering::Release);
        }
        let _guard = DrainGuard(&self.draining);

        for priority in Priority::DRAIN_ORDER {
            let queue = self.queue(priority);
            while let Some(reg) = queue.pop() {
                self.apply(reg);
            }
        }
    }

    fn apply(&self, reg: Registration<S, T>) {
        let max_handlers = self
            .configs
            .entry(reg.signal.clone())
            .or_default()
            .max_handlers;
        let mut list = self.handlers.entry(reg.signal.clone()).or_default();

        match reg.command {
            Command::Add(handler) => {
                let name: Arc<str> = Arc::from(handler.name());
                if list.len() < max_handlers {
                    list.push(Arc::new(RegisteredHandler {
                        id: reg.id,
                        signal: reg.signal.clone(),
                        handler,
                        priority: reg.priority,
                        context: reg.context,
                    }));
                    drop(list);
                    debug!(signal = %reg.signal, handler_id = reg.id, priority = reg.priority.as_label(), "handler registered");
                    self.bus.publish(
                        Event::new(EventKind::HandlerAdded)
                            .with_signal(reg.signal.as_str())
                            .with_handler(name, reg.id),
                    );
                } else {
                    drop(list);
                    debug!(signal = %reg.signal, handler_id = reg.id, max_handlers, "handler dropped at capacity");
                    self.bus.publish(
                        Event::new(EventKind::HandlerDropped)
                            .with_signal(reg.signal.as_str())
                            .with_handler(name, reg.id),
                    );
                }
            }
            Command::Remove => {
                list.retain(|h| h.id != reg.id);
                drop(list);
                debug!(signal = %reg.signal, handler_id = reg.id, "handler unregistered");
                self.bus.publish(
                    Event::new(EventKind::HandlerRemoved)
                        .with_signal(reg.signal.as_str())
                        .with_handler_id(reg.id),
                );
            }
        }
    }

    /// Snapshot of the signal's handlers in registration order.
    pub fn handlers(&self, signal: &str) -> Vec<Arc<RegisteredHandler<S, T>>> {
        self.handlers
            .get(signal)
            .map(|list| list.value().clone())
            .unwrap_or_default()
    }

    pub fn has_handlers(&self, signal: &str) -> bool {
        self.handlers
            .get(signal)
            .is_some_and(|list| !list.is_empty())
    }

    /// The signal's resolved config, or the default one if it was never registered.
    pub fn config(&self, signal: &str) -> SignalConfig {
        self.configs
            .get(signal)
            .map(|c| c.value().clone())
            .unwrap_or_default()
    }

    /// Sorted names of signals that have a handler list.
    pub fn registered_events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Drops handler lists and configs of the given signals.
    pub fn clear(&self, signals: &[&str]) {
        for signal in signals {
            self.handlers.remove(*signal);
            self.configs.remove(*signal);
            debug!(signal = %signal, "signal cleared");
        }
    }

    /// Drops every handler list, config and pending command.
    pub fn clear_all(&self) {
        let handlers = self.handlers.len();
        let configs = self.configs.len();
        self.handlers.clear();
        self.configs.clear();
        for priority in Priority::DRAIN_ORDER {
            let queue = self.queue(priority);
            while queue.pop().is_some() {}
        }
        debug!(handlers, configs, "all signals cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::handlers::HandlerFn;
    use crate::model::Envelope;

    fn registry() -> Registry<(), u32> {
        Registry::new(Arc::new(Metrics::new()), Bus::new(64))
    }

    fn noop(name: &'static str) -> HandlerRef<(), u32> {
        HandlerFn::arc(name, |_env: Arc<Envelope<(), u32>>| async {
            Ok::<(), HandlerError>(())
        })
    }

    fn names(reg: &Registry<(), u32>, signal: &str) -> Vec<String> {
        reg.handlers(signal)
            .iter()
            .map(|h| h.handler.name().to_string())
            .collect()
    }

    #[test]
    fn handlers_keep_registration_order() {
        let reg = registry();
        let cfg = SignalConfig::default().with_max_handlers(5);
        let a = reg.register_handler("s", noop("a"), cfg.clone(), None);
        let b = reg.register_handler("s", noop("b"), cfg, None);

        assert!(b > a);
        assert_eq!(names(&reg, "s"), ["a", "b"]);
        assert!(reg.has_handlers("s"));
        assert_eq!(reg.registered_events(), ["s"]);
    }

    #[test]
    fn registrations_past_capacity_are_dropped() {
        let reg = registry();
        let cfg = SignalConfig::default().with_max_handlers(2);
        for name in ["a", "b", "c"] {
            reg.register_handler("s", noop(name), cfg.clone(), None);
        }
        assert_eq!(names(&reg, "s"), ["a", "b"]);
    }

    #[test]
    fn first_config_wins() {
        let reg = registry();
        reg.register_handler("s", noop("a"), SignalConfig::default().with_max_retries(1), None);
        reg.register_handler("s", noop("b"), SignalConfig::default().with_max_retries(7), None);
        assert_eq!(reg.config("s").max_retries, 1);
        assert_eq!(reg.config("unknown"), SignalConfig::default());
    }

    #[test]
    fn unregister_removes_only_that_id() {
        let reg = registry();
        let cfg = SignalConfig::default();
        let a = reg.register_handler("s", noop("a"), cfg.clone(), None);
        reg.register_handler("s", noop("b"), cfg, None);

        reg.unregister_handler("s", a, None);
        assert_eq!(names(&reg, "s"), ["b"]);
        reg.unregister_handler("s", 12345, None);
        assert_eq!(names(&reg, "s"), ["b"]);
    }

    #[test]
    fn drain_applies_high_before_low() {
        let reg = registry();
        let low = SignalConfig::default()
            .with_priority(Priority::Low)
            .with_max_handlers(1);
        let high = SignalConfig::default()
            .with_priority(Priority::High)
            .with_max_handlers(1);

        // Hold the drain so both commands are applied in one pass.
        reg.draining.store(true, Ordering::Release);
        reg.register_handler("s", noop("low"), low, None);
        reg.register_handler("s", noop("high"), high, None);
        assert!(reg.handlers("s").is_empty());

        reg.draining.store(false, Ordering::Release);
        reg.process_events();
        assert_eq!(names(&reg, "s"), ["high"]);
    }

    #[test]
    fn clear_all_discards_pending_commands() {
        let reg = registry();
        reg.register_handler("s", noop("a"), SignalConfig::default(), None);
        reg.draining.store(true, Ordering::Release);
        reg.register_handler("t", noop("b"), SignalConfig::default(), None);

        reg.clear_all();
        reg.draining.store(false, Ordering::Release);
        reg.process_events();
        assert!(reg.registered_events().is_empty());
    }

    #[test]
    fn metrics_follow_record_flag() {
        let metrics = Arc::new(Metrics::new());
        let reg: Registry<(), u32> = Registry::new(Arc::clone(&metrics), Bus::new(8));
        reg.register_handler("quiet", noop("a"), SignalConfig::default(), None);
        reg.register_handler("loud", noop("b"), SignalConfig::default().with_record_metrics(true), None);

        assert_eq!(metrics.snapshot("quiet").handler_count, 0);
        assert_eq!(metrics.snapshot("loud").handler_count, 1);
    }
}
