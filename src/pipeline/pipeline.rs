//! # Interceptor → filter → transformer pipeline.
//!
//! ```text
//! process(signal, env)
//!   ├─► interceptors (by order)   before() == false ─► None
//!   ├─► filters (by priority)     filter() == false ─► None
//!   └─► transformers (in order)   each gets the incoming env; last output wins
//!                                 (none registered ─► env unchanged)
//! ```
//!
//! ## Rules
//! - Each hook invocation appends one span named `Interceptor: <name>`,
//!   `Filter: <name>` or `Transformer: <name>`, whatever its outcome.
//! - Hook lists are copied out before running, so hooks may register hooks.
//! - The transformer output always carries the incoming context.
//! - `post_process` calls every interceptor's `after` with no error.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, error, info};

use super::hooks::{Filter, Interceptor, Transformer};
use crate::model::Envelope;

type Hooks<H> = DashMap<String, Vec<Arc<H>>>;

/// Per-signal hook chains.
pub struct Pipeline<S, T> {
    interceptors: Hooks<dyn Interceptor<S, T>>,
    filters: Hooks<dyn Filter<S, T>>,
    transformers: Hooks<dyn Transformer<S, T>>,
}

impl<S, T> Default for Pipeline<S, T> {
    fn default() -> Self {
        Self {
            interceptors: DashMap::new(),
            filters: DashMap::new(),
            transformers: DashMap::new(),
        }
    }
}

fn snapshot<H: ?Sized>(hooks: &Hooks<H>, signal: &str) -> Vec<Arc<H>> {
    hooks.get(signal).map(|v| v.value().clone()).unwrap_or_default()
}

impl<S, T> Pipeline<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interceptor(&self, signal: &str, interceptor: Arc<dyn Interceptor<S, T>>) {
        info!(signal, interceptor = interceptor.name(), "interceptor added");
        let mut list = self.interceptors.entry(signal.to_string()).or_default();
        list.push(interceptor);
        list.sort_by_key(|i| i.order());
    }

    pub fn add_filter(&self, signal: &str, filter: Arc<dyn Filter<S, T>>) {
        debug!(signal, filter = filter.name(), "filter added");
        let mut list = self.filters.entry(signal.to_string()).or_default();
        list.push(filter);
        list.sort_by_key(|f| f.priority());
    }

    pub fn add_transformer(&self, signal: &str, transformer: Arc<dyn Transformer<S, T>>) {
        debug!(signal, transformer = transformer.name(), "transformer added");
        self.transformers
            .entry(signal.to_string())
            .or_default()
            .push(transformer);
    }

    /// Runs the three stages; `None` means an interceptor or filter vetoed.
    pub fn process(&self, signal: &str, envelope: Arc<Envelope<S, T>>) -> Option<Arc<Envelope<S, T>>> {
        let context = envelope.context().clone();

        for interceptor in snapshot(&self.interceptors, signal) {
            let span = context.start_span(format!("Interceptor: {}", interceptor.name()));
            let allowed = interceptor.before(signal, &envelope);
            span.finish();
            if !allowed {
                debug!(signal, interceptor = interceptor.name(), "blocked by interceptor");
                return None;
            }
        }

        for filter in snapshot(&self.filters, signal) {
            let span = context.start_span(format!("Filter: {}", filter.name()));
            let pass = filter.filter(signal, &envelope);
            span.finish();
            if !pass {
                debug!(signal, filter = filter.name(), "filtered out");
                return None;
            }
        }

        let mut output = None;
        for transformer in snapshot(&self.transformers, signal) {
            let span = context.start_span(format!("Transformer: {}", transformer.name()));
            output = Some(transformer.transform(signal, &envelope));
            span.finish();
        }
        // Handler spans must land on the emission's tree, whatever context the transformer built.
        Some(
            output
                .map(|out| Arc::new(out.with_context(context)))
                .unwrap_or(envelope),
        )
    }

    /// Notifies every interceptor that dispatch finished.
    pub fn post_process(&self, signal: &str, envelope: &Envelope<S, T>) {
        for interceptor in snapshot(&self.interceptors, signal) {
            if let Err(e) = interceptor.after(signal, envelope, None) {
                error!(signal, interceptor = interceptor.name(), error = %e, "interceptor after-hook failed");
            }
        }
    }

    /// Drops all hooks of the given signals.
    pub fn clear(&self, signals: &[&str]) {
        for signal in signals {
            self.interceptors.remove(*signal);
            self.filters.remove(*signal);
            self.transformers.remove(*signal);
        }
    }

    pub fn clear_all(&self) {
        self.interceptors.clear();
        self.filters.clear();
        self.transformers.clear();
    }
}
