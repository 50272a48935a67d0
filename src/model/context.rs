//! # Per-emission tracing context.
//!
//! A [`Context`] carries the emission's `event_id`, the id of the span that is
//! currently "open" (the parent for the next span), free-form attributes and an
//! append-only list of finished [`Span`]s.
//!
//! ## Span tree
//! ```text
//! event_id ─┬─► Interceptor: audit
//!           │      └─► Filter: non-empty
//!           │             └─► Transformer: enrich
//!           │                    └─► Handler: order-writer
//!           └─ ...
//! ```
//!
//! ## Rules
//! - Every pipeline stage and every handler execution appends **exactly one** span.
//! - A span's parent is the span most recently made current, or the `event_id`.
//! - Opening a span makes it current; it stays current after it finishes.
//! - `Context` is a cheap handle (`Arc` inside); clones share one tree.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

/// A timed, named unit of work inside an emission's trace tree.
#[derive(Debug, Clone, Serialize)]
pub struct Span {
    /// Unique span id.
    pub span_id: String,
    /// Parent span id (or the emission's event id for roots).
    pub parent_span_id: String,
    /// Operation label, e.g. `"Filter: non-empty"`.
    pub operation: String,
    /// Wall-clock start.
    pub start: SystemTime,
    /// Wall-clock end.
    pub end: SystemTime,
}

impl Span {
    /// Elapsed time between start and end (zero if the clock went backwards).
    pub fn duration(&self) -> Duration {
        self.end.duration_since(self.start).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct State {
    parent_span_id: Option<String>,
    attributes: HashMap<String, String>,
    spans: Vec<Span>,
}

#[derive(Debug)]
struct Inner {
    event_id: String,
    state: Mutex<State>,
}

/// Shared tracing context of one emission.
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Creates a context with a fresh random event id.
    pub fn new() -> Self {
        Self::with_event_id(Uuid::new_v4().to_string())
    }

    /// Creates a context rooted at the given event id.
    pub fn with_event_id(event_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                event_id: event_id.into(),
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Root id of the span tree.
    pub fn event_id(&self) -> &str {
        &self.inner.event_id
    }

    /// Id of the span currently open as parent, if any.
    pub fn parent_span_id(&self) -> Option<String> {
        self.inner.state.lock().parent_span_id.clone()
    }

    /// Overrides the current parent span.
    pub fn set_parent_span_id(&self, span_id: impl Into<String>) {
        self.inner.state.lock().parent_span_id = Some(span_id.into());
    }

    /// Sets an attribute, returning the previous value.
    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.inner
            .state
            .lock()
            .attributes
            .insert(key.into(), value.into())
    }

    /// Reads an attribute.
    pub fn attribute(&self, key: &str) -> Option<String> {
        self.inner.state.lock().attributes.get(key).cloned()
    }

    /// Snapshot of all attributes.
    pub fn attributes(&self) -> HashMap<String, String> {
        self.inner.state.lock().attributes.clone()
    }

    /// Appends a finished span.
    pub fn add_span(&self, span: Span) {
        self.inner.state.lock().spans.push(span);
    }

    /// Snapshot of finished spans in completion order.
    pub fn spans(&self) -> Vec<Span> {
        self.inner.state.lock().spans.clone()
    }

    /// Opens a span: parent is the current span (or the event id) and the new
    /// span becomes current. The span is appended when the guard finishes or drops.
    pub fn start_span(&self, operation: impl Into<String>) -> ActiveSpan {
        let span_id = Uuid::new_v4().to_string();
        let parent_span_id = {
            let mut state = self.inner.state.lock();
            state
                .parent_span_id
                .replace(span_id.clone())
                .unwrap_or_else(|| self.inner.event_id.clone())
        };
        ActiveSpan {
            context: self.clone(),
            span: Some(Span {
                span_id,
                parent_span_id,
                operation: operation.into(),
                start: SystemTime::now(),
                end: SystemTime::now(),
            }),
        }
    }

    /// Renders the span tree as indented text, children in start order.
    ///
    /// ```text
    /// event 6b1f...
    /// └─ Interceptor: audit (0ms)
    ///    └─ Handler: writer (12ms)
    /// ```
    pub fn render_tree(&self) -> String {
        let mut spans = self.spans();
        spans.sort_by_key(|s| s.start);

        let mut children: HashMap<&str, Vec<&Span>> = HashMap::new();
        for span in &spans {
            children
                .entry(span.parent_span_id.as_str())
                .or_default()
                .push(span);
        }

        let mut out = format!("event {}\n", self.event_id());
        render_children(&mut out, &children, self.event_id(), 0);
        out
    }
}

fn render_children(out: &mut String, children: &HashMap<&str, Vec<&Span>>, parent: &str, depth: usize) {
    let Some(kids) = children.get(parent) else { return };
    for span in kids {
        let _ = writeln!(
            out,
            "{}└─ {} ({}ms)",
            "   ".repeat(depth),
            span.operation,
            span.duration().as_millis()
        );
        render_children(out, children, &span.span_id, depth + 1);
    }
}

/// Guard for an open span; records end time and appends on [`finish`](Self::finish) or drop.
#[must_use = "a span is recorded when the guard is finished or dropped"]
pub struct ActiveSpan {
    context: Context,
    span: Option<Span>,
}

impl ActiveSpan {
    /// Id of the open span.
    pub fn span_id(&self) -> &str {
        self.span.as_ref().map(|s| s.span_id.as_str()).unwrap_or_default()
    }

    /// Closes the span now.
    pub fn finish(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(mut span) = self.span.take() {
            span.end = SystemTime::now();
            self.context.add_span(span);
        }
    }
}

impl Drop for ActiveSpan {
    fn drop(&mut self) {
        self.close();
    }
}
