//! Handlers: the consumers of emitted signals.
//!
//! ## Contents
//! - [`Handler`], [`HandlerRef`] the async consumer trait and its shared handle
//! - [`HandlerFn`] closure-backed handler
//! - [`and_then`], [`when`] composition helpers
//! - [`TransactionalHandler`] transaction/redelivery/dead-letter decorator with
//!   [`TransactionConfig`], [`TransactionManager`], [`DeadLetterSink`], [`DeadLetterQueue`]

mod combinators;
mod handler;
mod handler_fn;
mod transactional;

pub use combinators::{and_then, when};
pub use handler::{Handler, HandlerRef};
pub use handler_fn::HandlerFn;
pub use transactional::{
    DeadLetter, DeadLetterQueue, DeadLetterSink, Transaction, TransactionConfig, TransactionManager,
    TransactionalHandler,
};
