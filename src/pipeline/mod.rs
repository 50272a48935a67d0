//! Pre-dispatch hook pipeline: [`Interceptor`], [`Filter`], [`Transformer`].

mod hooks;
mod pipeline;

pub use hooks::{Filter, Interceptor, Transformer};
pub use pipeline::Pipeline;
