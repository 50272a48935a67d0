//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(Arc<Envelope<S, T>>) -> Fut`, producing a
//! fresh future per delivery. Shared state goes in an explicit `Arc<...>` captured
//! by the closure.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use signalvisor::{Envelope, HandlerError, HandlerFn, HandlerRef};
//!
//! let h: HandlerRef<(), String> = HandlerFn::arc("printer", |env: Arc<Envelope<(), String>>| async move {
//!     println!("got {}", env.payload());
//!     Ok::<_, HandlerError>(())
//! });
//!
//! assert_eq!(h.name(), "printer");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::handlers::handler::Handler;
use crate::model::Envelope;

/// Function-backed handler implementation.
#[derive(Debug)]
pub struct HandlerFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    ///
    /// Prefer [`HandlerFn::arc`] when you immediately need a [`HandlerRef`](crate::HandlerRef).
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { name: name.into(), f }
    }

    /// Creates the handler behind an `Arc`.
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<S, T, F, Fut> Handler<S, T> for HandlerFn<F>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
    F: Fn(Arc<Envelope<S, T>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope<S, T>>) -> Result<(), HandlerError> {
        (self.f)(envelope).await
    }
}
