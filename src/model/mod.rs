//! Data model shared by every dispatch stage.
//!
//! ## Contents
//! - [`Envelope`] sender + payload + context delivered to handlers
//! - [`Context`], [`Span`], [`ActiveSpan`] per-emission trace tree
//! - [`SignalConfig`] per-signal dispatch settings
//! - [`Priority`] registration queue selector
//! - [`ids`] time-ordered handler ids

mod context;
mod envelope;
pub mod ids;
mod priority;
mod signal_config;

pub use context::{ActiveSpan, Context, Span};
pub use envelope::Envelope;
pub use priority::Priority;
pub use signal_config::SignalConfig;
