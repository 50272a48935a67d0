//! Pipeline hook traits.
//!
//! All hooks are synchronous and run on the emitting task before dispatch.

use crate::error::{HandlerError, SignalError};
use crate::model::Envelope;

/// Veto point run before filters, plus a post-dispatch notification.
pub trait Interceptor<S, T>: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Returns `false` to stop the emission.
    fn before(&self, _signal: &str, _envelope: &Envelope<S, T>) -> bool {
        true
    }

    /// Called after dispatch. Errors are logged and do not stop other interceptors.
    fn after(
        &self,
        _signal: &str,
        _envelope: &Envelope<S, T>,
        _error: Option<&SignalError>,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Position among the signal's interceptors (ascending, ties keep registration order).
    fn order(&self) -> i32 {
        0
    }
}

/// Gate evaluated after interceptors; the first `false` stops the emission.
pub trait Filter<S, T>: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn filter(&self, signal: &str, envelope: &Envelope<S, T>) -> bool;

    /// Evaluation position (ascending).
    fn priority(&self) -> i32 {
        0
    }
}

/// Rewrites the envelope before dispatch.
///
/// Every transformer receives the envelope as it entered the transformer stage;
/// only the last transformer's output is dispatched.
pub trait Transformer<S, T>: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn transform(&self, signal: &str, envelope: &Envelope<S, T>) -> Envelope<S, T>;
}
