use std::marker::PhantomData;
use std::sync::Arc;

use crate::{
    core::SignalsConfig,
    error::RuntimeError,
    events::Bus,
    handlers::{DeadLetterSink, TransactionManager},
    metrics::Metrics,
    persistence::Persistence,
    protection::ProtectionManager,
    subscribers::{Subscribe, SubscriberSet},
};
use super::{
    emitter::Emitter,
    pool::WorkerPool,
    processor::Processor,
    scheduler::TimeoutScheduler,
    signals::{Parts, Signals},
};

/// Builder for constructing [`Signals`] with optional collaborators.
pub struct SignalsBuilder<S, T> {
    cfg: SignalsConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    pool: Option<WorkerPool>,
    persistence: Option<Arc<dyn Persistence>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    _types: PhantomData<fn() -> (S, T)>,
}

impl<S, T> SignalsBuilder<S, T>
where
    S: Send + Sync + 'static,
    T: Send + Sync + 'static,
{
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SignalsConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            pool: None,
            persistence: None,
            transactions: None,
            dead_letters: None,
            _types: PhantomData,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (emissions, handler lifecycle, circuit
    /// transitions) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Runs handlers on the given pool instead of one built on the current runtime.
    ///
    /// `SignalsConfig::max_concurrent` is not applied to a supplied pool.
    pub fn with_pool(mut self, pool: WorkerPool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Backend receiving dispatch records when `SignalsConfig::persistent` is set.
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Enables transactional decoration of handlers whose config carries a
    /// `TransactionConfig`.
    pub fn with_transaction_manager(mut self, manager: Arc<dyn TransactionManager>) -> Self {
        self.transactions = Some(manager);
        self
    }

    /// Where exhausted transactional deliveries go.
    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    /// Builds and returns the dispatcher.
    ///
    /// Initializes the event bus, subscriber workers, worker pool, timeout
    /// scheduler thread, metrics, protection manager and the bus listener.
    ///
    /// # Panics
    /// Outside a tokio runtime when no pool was supplied.
    pub fn build(self) -> Result<Arc<Signals<S, T>>, RuntimeError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(self.subscribers, bus.clone());
        let pool = self.pool.unwrap_or_else(|| {
            WorkerPool::current().with_max_concurrent(self.cfg.concurrency_limit().unwrap_or(0))
        });
        let scheduler = Arc::new(TimeoutScheduler::start()?);

        let metrics = Arc::new(Metrics::new());
        let protection = Arc::new(ProtectionManager::new(self.cfg.protection.clone(), bus.clone()));
        let processor = Processor::new(
            pool.clone(),
            Arc::clone(&scheduler),
            Arc::clone(&metrics),
            Arc::clone(&protection),
            bus.clone(),
        );
        let emitter = Emitter::new(
            processor,
            pool.clone(),
            Arc::clone(&metrics),
            Arc::clone(&protection),
            bus.clone(),
        );

        Ok(Arc::new(Signals::from_parts(Parts {
            cfg: self.cfg,
            bus,
            subs,
            pool,
            scheduler,
            metrics,
            protection,
            emitter,
            persistence: self.persistence,
            transactions: self.transactions,
            dead_letters: self.dead_letters,
        })))
    }
}
