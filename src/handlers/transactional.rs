//! # Transactional handler decoration and dead letters.
//!
//! [`TransactionalHandler`] wraps a handler so each delivery runs inside a
//! transaction obtained from a [`TransactionManager`]:
//!
//! ```text
//! handle(env)
//!   loop attempt in 0..=max_retries (1 attempt if retry disabled)
//!     ├─ begin ──► inner.handle(env) ──► Ok  ──► commit ──► return Ok
//!     │                              └─► Err ──► rollback
//!     └─ sleep(backoff.next(attempt))
//!   exhausted:
//!     ├─ dead letters enabled + sink ──► push DeadLetter, return Ok (error swallowed)
//!     └─ otherwise                   ──► return last error
//! ```
//!
//! The wrapper is applied explicitly by `Signals::connect_*` when the signal's
//! [`SignalConfig::transaction`](crate::SignalConfig) is set and a manager was
//! given to the builder.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::HandlerError;
use crate::handlers::handler::{Handler, HandlerRef};
use crate::model::{Context, Envelope};
use crate::policies::BackoffPolicy;

/// Transactional delivery settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionConfig {
    /// Run deliveries inside a transaction; `false` calls the handler directly.
    pub enabled: bool,
    /// Redeliver after a rolled-back attempt.
    pub retry_enabled: bool,
    /// Dead-letter (and swallow) the error once redelivery is exhausted.
    pub dead_letter_enabled: bool,
    /// Redeliveries after the first attempt.
    pub max_retries: u32,
    /// Delay between redeliveries.
    pub backoff: BackoffPolicy,
}

impl Default for TransactionConfig {
    /// `enabled`, `retry_enabled`, `dead_letter_enabled` all `true`; `max_retries = 3`;
    /// backoff `1s → 60s`, `×2`, equal jitter.
    fn default() -> Self {
        Self {
            enabled: true,
            retry_enabled: true,
            dead_letter_enabled: true,
            max_retries: 3,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Open transaction handle passed back to `commit`/`rollback`.
#[derive(Clone, Debug)]
pub struct Transaction {
    pub id: String,
    pub signal: String,
    pub event_id: String,
}

/// Transaction boundary provider (database, message broker, ...).
#[async_trait]
pub trait TransactionManager: Send + Sync + 'static {
    async fn begin(&self, signal: &str, context: &Context) -> Result<Transaction, HandlerError>;
    async fn commit(&self, tx: &Transaction) -> Result<(), HandlerError>;
    async fn rollback(&self, tx: &Transaction) -> Result<(), HandlerError>;
}

/// A delivery that failed every transactional attempt.
#[derive(Clone, Debug, Serialize)]
pub struct DeadLetter {
    pub id: String,
    pub signal: String,
    pub handler: String,
    pub event_id: String,
    pub error: String,
    pub attempts: u32,
    pub at: SystemTime,
}

/// Destination for dead letters.
#[async_trait]
pub trait DeadLetterSink: Send + Sync + 'static {
    async fn push(&self, letter: DeadLetter) -> Result<(), HandlerError>;
}

/// In-memory dead-letter queue, oldest first.
#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    letters: Mutex<VecDeque<DeadLetter>>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }

    /// Copies of the queued letters without removing them.
    pub fn snapshot(&self) -> Vec<DeadLetter> {
        self.letters.lock().iter().cloned().collect()
    }

    /// Removes and returns every queued letter.
    pub fn drain(&self) -> Vec<DeadLetter> {
        self.letters.lock().drain(..).collect()
    }
}

#[async_trait]
impl DeadLetterSink for DeadLetterQueue {
    async fn push(&self, letter: DeadLetter) -> Result<(), HandlerError> {
        self.letters.lock().push_back(letter);
        Ok(())
    }
}

/// Handler decorator adding transactions, redelivery and dead-lettering.
pub struct TransactionalHandler<S, T> {
    name: String,
    inner: HandlerRef<S, T>,
    config: TransactionConfig,
    manager: Arc<dyn TransactionManager>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl<S, T> TransactionalHandler<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    pub fn new(
        inner: HandlerRef<S, T>,
        config: TransactionConfig,
        manager: Arc<dyn TransactionManager>,
        dead_letters: Option<Arc<dyn DeadLetterSink>>,
    ) -> Self {
        Self {
            name: inner.name().to_string(),
            inner,
            config,
            manager,
            dead_letters,
        }
    }

    /// One transactional attempt.
    async fn run_once(&self, envelope: &Arc<Envelope<S, T>>) -> Result<(), HandlerError> {
        let signal = envelope.event_type();
        let tx = self.manager.begin(signal, envelope.context()).await?;

        match self.inner.handle(Arc::clone(envelope)).await {
            Ok(()) => self.manager.commit(&tx).await,
            Err(e) => {
                if let Err(rb) = self.manager.rollback(&tx).await {
                    error!(signal, tx = %tx.id, error = %rb, "transaction rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn dead_letter(&self, envelope: &Envelope<S, T>, err: &HandlerError, attempts: u32) -> bool {
        let Some(sink) = self.dead_letters.as_ref().filter(|_| self.config.dead_letter_enabled) else {
            return false;
        };
        let letter = DeadLetter {
            id: Uuid::new_v4().to_string(),
            signal: envelope.event_type().to_string(),
            handler: self.name.clone(),
            event_id: envelope.context().event_id().to_string(),
            error: err.to_string(),
            attempts,
            at: SystemTime::now(),
        };
        let id = letter.id.clone();
        match sink.push(letter).await {
            Ok(()) => {
                info!(signal = envelope.event_type(), handler = %self.name, dead_letter = %id, "dead letter recorded");
                true
            }
            Err(e) => {
                error!(signal = envelope.event_type(), handler = %self.name, error = %e, "dead letter push failed");
                false
            }
        }
    }
}

#[async_trait]
impl<S, T> Handler<S, T> for TransactionalHandler<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, envelope: Arc<Envelope<S, T>>) -> Result<(), HandlerError> {
        if !self.config.enabled {
            return self.inner.handle(envelope).await;
        }

        let attempts = if self.config.retry_enabled {
            self.config.max_retries.saturating_add(1)
        } else {
            1
        };

        let mut attempt = 0;
        let last_err = loop {
            match self.run_once(&envelope).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt + 1 >= attempts => break e,
                Err(e) => {
                    let delay = self.config.backoff.next(attempt);
                    warn!(
                        signal = envelope.event_type(),
                        handler = %self.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transaction rolled back; redelivering"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        };

        error!(signal = envelope.event_type(), handler = %self.name, error = %last_err, "transactional delivery exhausted");
        if self.dead_letter(&envelope, &last_err, attempt + 1).await {
            Ok(())
        } else {
            Err(last_err)
        }
    }
}
