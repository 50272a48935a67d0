//! # Handler abstraction.
//!
//! A [`Handler`] receives every envelope emitted on the signals it is connected
//! to. The shared handle type is [`HandlerRef`], an `Arc<dyn Handler>` stored in
//! the registry and cloned into worker tasks.
//!
//! Handlers never see cancellation directly: a timed-out or shut-down attempt is
//! simply dropped at its next `.await`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::model::Envelope;

/// # Asynchronous signal consumer.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use signalvisor::{Envelope, Handler, HandlerError};
///
/// struct Audit;
///
/// #[async_trait]
/// impl Handler<String, u64> for Audit {
///     fn name(&self) -> &str { "audit" }
///
///     async fn handle(&self, env: Arc<Envelope<String, u64>>) -> Result<(), HandlerError> {
///         if *env.payload() == 0 {
///             return Err("empty order".into());
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<S, T>: Send + Sync + 'static {
    /// Stable, human-readable name used in spans, events and logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Processes one envelope. An `Err` counts as a failed attempt.
    async fn handle(&self, envelope: Arc<Envelope<S, T>>) -> Result<(), HandlerError>;
}

/// Shared handle to a handler.
pub type HandlerRef<S, T> = Arc<dyn Handler<S, T>>;
