//! Error types used by the signalvisor runtime and handlers.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`]: errors raised by the dispatch runtime itself (shutdown).
//! - [`SignalError`]: outcomes and failures of a single emission or handler execution.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics
//! and additional utilities such as [`SignalError::is_retryable`].

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error type returned by user handlers, hooks and collaborators.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced by the signalvisor runtime.
///
/// These represent failures in the dispatch system itself, such as a
/// shutdown sequence exceeding its grace period or a failed startup.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; in-flight handlers were force-cancelled.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Handlers (`signal#id`) that were still executing.
        stuck: Vec<String>,
    },

    /// The timeout scheduler thread or its runtime could not be started.
    #[error("timeout scheduler unavailable: {reason}")]
    SchedulerUnavailable {
        /// Underlying I/O error text.
        reason: String,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use signalvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::SchedulerUnavailable { .. } => "runtime_scheduler_unavailable",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::GraceExceeded { grace, stuck } => {
                format!("grace exceeded after {grace:?}; stuck handlers={stuck:?}")
            }
            RuntimeError::SchedulerUnavailable { reason } => {
                format!("scheduler unavailable: {reason}")
            }
        }
    }
}

/// # Outcomes and failures of signal dispatch.
///
/// The first three variants are admission outcomes handled entirely inside
/// `emit`; they only ever reach a caller-supplied callback. The rest originate
/// from handler execution and also reach the error handler.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum SignalError {
    /// Admission control (circuit breaker or rate limiter) refused the emission.
    #[error("signal [{signal}] blocked by protection")]
    Blocked {
        /// Signal name.
        signal: String,
    },

    /// An interceptor or filter vetoed the emission.
    #[error("signal [{signal}] blocked by pipeline")]
    PipelineRejected {
        /// Signal name.
        signal: String,
    },

    /// No handler is registered for the signal.
    #[error("no handlers for signal: {signal}")]
    NoHandlers {
        /// Signal name.
        signal: String,
    },

    /// The handler's own error, surfaced unchanged after the retry budget.
    #[error("handler failed: {source}")]
    Handler {
        /// The error returned by the handler.
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// Handler exceeded its configured duration.
    #[error("signal handler execution timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The waiting or sleeping task was interrupted by runtime shutdown.
    #[error("signal handler interrupted")]
    Interrupted,

    /// The execution substrate failed without a handler error (e.g. a panic).
    #[error("unexpected signal handler error: {reason}")]
    UnexpectedExecution {
        /// Panic message or join failure description.
        reason: String,
    },
}

impl SignalError {
    /// Wraps a handler-returned error.
    pub fn handler(error: HandlerError) -> Self {
        SignalError::Handler {
            source: Arc::from(error),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use signalvisor::SignalError;
    /// use std::time::Duration;
    ///
    /// let err = SignalError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "handler_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            SignalError::Blocked { .. } => "signal_blocked",
            SignalError::PipelineRejected { .. } => "pipeline_rejected",
            SignalError::NoHandlers { .. } => "no_handlers",
            SignalError::Handler { .. } => "handler_failed",
            SignalError::Timeout { .. } => "handler_timeout",
            SignalError::Interrupted => "handler_interrupted",
            SignalError::UnexpectedExecution { .. } => "unexpected_execution",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            SignalError::Blocked { signal } => format!("blocked: {signal}"),
            SignalError::PipelineRejected { signal } => format!("rejected: {signal}"),
            SignalError::NoHandlers { signal } => format!("no handlers: {signal}"),
            SignalError::Handler { source } => format!("error: {source}"),
            SignalError::Timeout { timeout } => format!("timeout: {timeout:?}"),
            SignalError::Interrupted => "interrupted".to_string(),
            SignalError::UnexpectedExecution { reason } => format!("unexpected: {reason}"),
        }
    }

    /// Indicates whether another attempt may be made after this failure.
    ///
    /// `Interrupted` means the runtime is shutting down, so it is never retried;
    /// admission outcomes never reach the retry loop.
    ///
    /// # Example
    /// ```
    /// use signalvisor::SignalError;
    ///
    /// let failed = SignalError::handler("boom".into());
    /// assert!(failed.is_retryable());
    /// assert!(!SignalError::Interrupted.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SignalError::Handler { .. }
                | SignalError::Timeout { .. }
                | SignalError::UnexpectedExecution { .. }
        )
    }

    /// Returns `true` for admission outcomes that short-circuit `emit`.
    pub fn is_admission(&self) -> bool {
        matches!(
            self,
            SignalError::Blocked { .. }
                | SignalError::PipelineRejected { .. }
                | SignalError::NoHandlers { .. }
        )
    }
}
