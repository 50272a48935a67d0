//! # Pattern bindings for pipeline hooks.
//!
//! A [`Binding`] attaches one hook to every signal matching its patterns:
//!
//! - `"*"` matches every currently registered signal
//! - `"order.*"` is a glob, matched against currently registered signals
//! - `"order.created"` is taken literally, registered or not
//!
//! Globs are expanded once, when the binding is applied; signals registered later
//! are not picked up.

use std::sync::Arc;

use regex::Regex;
use tracing::warn;

use crate::pipeline::{Filter, Interceptor, Transformer};

/// Hook carried by a [`Binding`].
pub enum Component<S, T> {
    Interceptor(Arc<dyn Interceptor<S, T>>),
    Filter(Arc<dyn Filter<S, T>>),
    Transformer(Arc<dyn Transformer<S, T>>),
}

impl<S: 'static, T: 'static> Component<S, T> {
    pub fn name(&self) -> &str {
        match self {
            Component::Interceptor(i) => i.name(),
            Component::Filter(f) => f.name(),
            Component::Transformer(t) => t.name(),
        }
    }
}

/// One hook and the signal patterns it applies to.
pub struct Binding<S, T> {
    patterns: Vec<String>,
    component: Component<S, T>,
}

impl<S, T> Binding<S, T> {
    pub fn new<I, P>(patterns: I, component: Component<S, T>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self {
            patterns: patterns.into_iter().map(Into::into).collect(),
            component,
        }
    }

    pub fn interceptor<I, P>(patterns: I, interceptor: Arc<dyn Interceptor<S, T>>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self::new(patterns, Component::Interceptor(interceptor))
    }

    pub fn filter<I, P>(patterns: I, filter: Arc<dyn Filter<S, T>>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self::new(patterns, Component::Filter(filter))
    }

    pub fn transformer<I, P>(patterns: I, transformer: Arc<dyn Transformer<S, T>>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        Self::new(patterns, Component::Transformer(transformer))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn component(&self) -> &Component<S, T> {
        &self.component
    }

    /// Signals this binding applies to, given the registered ones. No duplicates.
    pub fn resolve(&self, registered: &[String]) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for pattern in &self.patterns {
            for signal in expand(pattern, registered) {
                if !out.contains(&signal) {
                    out.push(signal);
                }
            }
        }
        out
    }
}

/// Expands one pattern against the registered signal names.
pub fn expand(pattern: &str, registered: &[String]) -> Vec<String> {
    if pattern == "*" {
        return registered.to_vec();
    }
    if !pattern.contains('*') {
        return vec![pattern.to_string()];
    }
    match glob_regex(pattern) {
        Ok(re) => registered.iter().filter(|s| re.is_match(s)).cloned().collect(),
        Err(err) => {
            warn!(pattern = %pattern, error = %err, "invalid binding pattern");
            Vec::new()
        }
    }
}

fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let body = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{body}$"))
}
