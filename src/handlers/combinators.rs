//! # Handler composition.
//!
//! - [`and_then`] runs two handlers in sequence on the same envelope; the second
//!   only runs if the first succeeded.
//! - [`when`] runs a handler only for envelopes accepted by a predicate.
//!
//! ```rust
//! use std::sync::Arc;
//! use signalvisor::{Envelope, HandlerError, HandlerFn, HandlerRef, and_then, when};
//!
//! let save: HandlerRef<(), u32> = HandlerFn::arc("save", |_env: Arc<Envelope<(), u32>>| async {
//!     Ok::<_, HandlerError>(())
//! });
//! let notify: HandlerRef<(), u32> = HandlerFn::arc("notify", |_env: Arc<Envelope<(), u32>>| async {
//!     Ok::<_, HandlerError>(())
//! });
//!
//! let pipeline = and_then(save, notify);
//! let big_only = when(pipeline, |env: &Envelope<(), u32>| *env.payload() > 100);
//! assert_eq!(big_only.name(), "when(save+notify)");
//! ```

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::handlers::handler::{Handler, HandlerRef};
use crate::model::Envelope;

struct AndThen<S, T> {
    name: String,
    first: HandlerRef<S, T>,
    second: HandlerRef<S, T>,
}

#[async_trait]
impl<S, T> Handler<S, T> for AndThen<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope<S, T>>) -> Result<(), HandlerError> {
        self.first.handle(Arc::clone(&envelope)).await?;
        self.second.handle(envelope).await
    }
}

/// Runs `first`, then `second` if `first` succeeded.
pub fn and_then<S, T>(first: HandlerRef<S, T>, second: HandlerRef<S, T>) -> HandlerRef<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    let name = format!("{}+{}", first.name(), second.name());
    Arc::new(AndThen {
        name,
        first,
        second,
    })
}

struct When<S, T, P> {
    name: String,
    inner: HandlerRef<S, T>,
    predicate: P,
}

#[async_trait]
impl<S, T, P> Handler<S, T> for When<S, T, P>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
    P: Fn(&Envelope<S, T>) -> bool + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope<S, T>>) -> Result<(), HandlerError> {
        if (self.predicate)(&envelope) {
            self.inner.handle(envelope).await
        } else {
            Ok(())
        }
    }
}

/// Runs `inner` only when `predicate` accepts the envelope; otherwise succeeds.
pub fn when<S, T, P>(inner: HandlerRef<S, T>, predicate: P) -> HandlerRef<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
    P: Fn(&Envelope<S, T>) -> bool + Send + Sync + 'static,
{
    let name = format!("when({})", inner.name());
    Arc::new(When {
        name,
        inner,
        predicate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerFn;
    use parking_lot::Mutex;

    fn recorder(name: &'static str, log: Arc<Mutex<Vec<&'static str>>>, fail: bool) -> HandlerRef<(), i32> {
        HandlerFn::arc(name, move |_env: Arc<Envelope<(), i32>>| {
            let log = Arc::clone(&log);
            async move {
                log.lock().push(name);
                if fail { Err::<(), HandlerError>("nope".into()) } else { Ok(()) }
            }
        })
    }

    #[tokio::test]
    async fn and_then_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let h = and_then(recorder("a", log.clone(), false), recorder("b", log.clone(), false));
        h.handle(Arc::new(Envelope::new("s", (), 1))).await.unwrap();
        assert_eq!(*log.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn and_then_stops_after_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let h = and_then(recorder("a", log.clone(), true), recorder("b", log.clone(), false));
        assert!(h.handle(Arc::new(Envelope::new("s", (), 1))).await.is_err());
        assert_eq!(*log.lock(), vec!["a"]);
    }

    #[tokio::test]
    async fn when_skips_rejected_envelopes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let h = when(recorder("a", log.clone(), false), |env: &Envelope<(), i32>| *env.payload() > 0);
        h.handle(Arc::new(Envelope::new("s", (), -1))).await.unwrap();
        assert!(log.lock().is_empty());
        h.handle(Arc::new(Envelope::new("s", (), 5))).await.unwrap();
        assert_eq!(*log.lock(), vec!["a"]);
    }
}
