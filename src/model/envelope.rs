//! # Envelope delivered to handlers.
//!
//! An [`Envelope`] bundles the signal name, the sender, the payload and the
//! emission's [`Context`]. It is immutable once built and shared with handlers
//! behind an `Arc`; transformers produce new envelopes instead of mutating.

use super::context::Context;

/// Sender, payload and tracing context of one emission.
#[derive(Debug, Clone)]
pub struct Envelope<S, T> {
    event_type: String,
    sender: S,
    payload: T,
    context: Context,
}

impl<S, T> Envelope<S, T> {
    /// Creates an envelope with a fresh [`Context`].
    pub fn new(event_type: impl Into<String>, sender: S, payload: T) -> Self {
        Self {
            event_type: event_type.into(),
            sender,
            payload,
            context: Context::new(),
        }
    }

    /// Replaces the context (e.g. to continue an existing trace).
    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Signal name this envelope was built for.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The emitting party.
    pub fn sender(&self) -> &S {
        &self.sender
    }

    /// The payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Shared tracing context.
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Builds a sibling envelope carrying a new payload and the same context.
    ///
    /// ```
    /// use signalvisor::Envelope;
    ///
    /// let env = Envelope::new("order.created", "api", 41u32);
    /// let next = env.with_payload(42u32);
    /// assert_eq!(*next.payload(), 42);
    /// assert_eq!(next.context().event_id(), env.context().event_id());
    /// ```
    pub fn with_payload(&self, payload: T) -> Self
    where
        S: Clone,
    {
        Self {
            event_type: self.event_type.clone(),
            sender: self.sender.clone(),
            payload,
            context: self.context.clone(),
        }
    }

    /// Consumes the envelope, returning `(sender, payload)`.
    pub fn into_parts(self) -> (S, T) {
        (self.sender, self.payload)
    }
}
