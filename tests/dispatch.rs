//! End-to-end dispatch behavior through the `Signals` facade.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use signalvisor::{
    Binding, CircuitState, Context, DeadLetterQueue, EmitOutcome, Envelope, Event, EventKind,
    Filter, HandlerError, HandlerFn, HandlerRef, Interceptor, LoggingCallback, Persistence, PersistenceRecord,
    Priority, ProtectionConfig, RuntimeError, SignalCallback, SignalConfig, SignalError, Signals,
    SignalsConfig, Subscribe, Transaction, TransactionConfig, TransactionManager, Transformer, BackoffPolicy,
};

type Env = Envelope<&'static str, u32>;

fn signals() -> Arc<Signals<&'static str, u32>> {
    Signals::builder(SignalsConfig::default()).build().unwrap()
}

fn sync_config() -> SignalConfig {
    SignalConfig::default()
        .with_async(false)
        .with_retry_delay(Duration::from_millis(1))
        .with_timeout(Duration::ZERO)
}

fn env(signal: &str) -> Env {
    Envelope::new(signal, "test", 7)
}

/// Fails until call number `succeed_on` (1-based); counts calls.
fn flaky(name: &'static str, calls: Arc<AtomicU32>, succeed_on: u32) -> HandlerRef<&'static str, u32> {
    HandlerFn::arc(name, move |_env: Arc<Env>| {
        let calls = Arc::clone(&calls);
        async move {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= succeed_on {
                Ok(())
            } else {
                Err::<(), HandlerError>(format!("{name} failed on call {n}").into())
            }
        }
    })
}

fn counting(name: &'static str, calls: Arc<AtomicU32>) -> HandlerRef<&'static str, u32> {
    flaky(name, calls, 1)
}

fn collect_errors() -> (Arc<Mutex<Vec<SignalError>>>, impl Fn(&SignalError) + Send + Sync + 'static) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    (errors, move |err: &SignalError| sink.lock().push(err.clone()))
}

#[derive(Default)]
struct Recorder {
    log: Mutex<Vec<String>>,
}

impl SignalCallback<&'static str, u32> for Recorder {
    fn on_success(&self, signal: &str, _env: &Env) {
        self.log.lock().push(format!("success:{signal}"));
    }
    fn on_error(&self, signal: &str, _env: &Env, error: &SignalError) {
        self.log.lock().push(format!("error:{signal}:{}", error.as_label()));
    }
    fn on_complete(&self, signal: &str, _env: &Env) {
        self.log.lock().push(format!("complete:{signal}"));
    }
}

#[tokio::test]
async fn registrations_never_exceed_max_handlers() {
    let signals = signals();
    let cfg = sync_config().with_max_handlers(3);
    let ids: Vec<u64> = (0..5)
        .map(|_| signals.connect_with_config("capped", counting("h", Arc::default()), cfg.clone()))
        .collect();

    assert_eq!(ids.len(), 5);
    assert_eq!(signals.handlers("capped").len(), 3);
    let kept: Vec<u64> = signals.handlers("capped").iter().map(|h| h.id).collect();
    assert_eq!(kept, ids[..3].to_vec());
}

#[tokio::test]
async fn connect_then_disconnect_leaves_no_handlers() {
    let signals = signals();
    let id = signals.connect("s", counting("h", Arc::default()));
    signals.disconnect("s", id);
    assert!(!signals.has_handlers("s"));
}

#[tokio::test]
async fn always_failing_handler_is_invoked_retries_plus_one_times() {
    let signals = signals();
    let calls = Arc::new(AtomicU32::new(0));
    signals.connect_with_config("s", flaky("bad", Arc::clone(&calls), u32::MAX), sync_config().with_max_retries(4));

    let (errors, on_error) = collect_errors();
    assert_eq!(signals.emit("s", env("s"), on_error).await, EmitOutcome::Dispatched);

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].to_string(), "handler failed: bad failed on call 5");
}

#[tokio::test]
async fn slow_handler_times_out_and_is_retried() {
    let signals = signals();
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let slow: HandlerRef<&'static str, u32> = HandlerFn::arc("slow", move |_env: Arc<Env>| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<(), HandlerError>(())
        }
    });
    let cfg = sync_config()
        .with_max_retries(1)
        .with_timeout(Duration::from_millis(30));
    signals.connect_with_config("s", slow, cfg);

    let (errors, on_error) = collect_errors();
    signals.emit("s", env("s"), on_error).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(matches!(errors.lock()[..], [SignalError::Timeout { .. }]));
    // one per timed-out attempt plus the final failure
    assert_eq!(signals.metrics().error_count("s"), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_registrations_of_all_priorities_are_applied() {
    let signals = signals();
    let threads: Vec<_> = [Priority::High, Priority::Medium, Priority::Low]
        .into_iter()
        .map(|priority| {
            let signals = Arc::clone(&signals);
            std::thread::spawn(move || {
                let cfg = SignalConfig::default().with_priority(priority);
                signals.connect_with_config("s", counting(priority.as_label(), Arc::default()), cfg)
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }
    signals.process_events();

    let mut names: Vec<String> = signals
        .handlers("s")
        .iter()
        .map(|h| h.handler.name().to_string())
        .collect();
    names.sort();
    assert_eq!(names, ["high", "low", "medium"]);
}

struct Reject;

impl Filter<&'static str, u32> for Reject {
    fn name(&self) -> &str {
        "reject"
    }
    fn filter(&self, _signal: &str, _env: &Env) -> bool {
        false
    }
}

#[tokio::test]
async fn rejecting_filter_stops_dispatch_without_metrics() {
    let signals = signals();
    let calls = Arc::new(AtomicU32::new(0));
    signals.connect_with_config("s", counting("h", Arc::clone(&calls)), sync_config().with_record_metrics(true));
    signals.add_filter("s", Arc::new(Reject));

    let recorder = Arc::new(Recorder::default());
    let (errors, on_error) = collect_errors();
    let outcome = signals
        .emit_with_callback("s", env("s"), recorder.clone(), on_error)
        .await;

    assert_eq!(outcome, EmitOutcome::PipelineRejected);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(errors.lock().is_empty());
    assert_eq!(*recorder.log.lock(), ["error:s:pipeline_rejected", "complete:s"]);

    let snap = signals.metrics().snapshot("s");
    assert_eq!((snap.emit_count, snap.processed_count, snap.error_count), (0, 0, 0));
}

#[tokio::test]
async fn flaky_sync_handler_recovers_on_third_attempt() {
    let signals = signals();
    let calls = Arc::new(AtomicU32::new(0));
    let cfg = sync_config()
        .with_max_retries(3)
        .with_retry_delay(Duration::from_millis(10));
    signals.connect_with_config("order.created", flaky("writer", Arc::clone(&calls), 3), cfg);

    let recorder = Arc::new(Recorder::default());
    let (errors, on_error) = collect_errors();
    let started = Instant::now();
    signals
        .emit_with_callback("order.created", env("order.created"), recorder.clone(), on_error)
        .await;

    assert!(started.elapsed() >= Duration::from_millis(20));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(errors.lock().is_empty());
    assert_eq!(*recorder.log.lock(), ["success:order.created", "complete:order.created"]);
}

#[tokio::test]
async fn logging_callback_accepts_every_outcome() {
    let signals = signals();
    let calls = Arc::new(AtomicU32::new(0));
    signals.connect_with_config("s", flaky("bad", Arc::clone(&calls), u32::MAX), sync_config().with_max_retries(0));

    let (errors, on_error) = collect_errors();
    let outcome = signals
        .emit_with_callback("s", env("s"), Arc::new(LoggingCallback), on_error)
        .await;

    assert_eq!(outcome, EmitOutcome::Dispatched);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(errors.lock().len(), 1);
}

#[tokio::test]
async fn breaker_blocks_after_threshold_until_open_timeout() {
    let cfg = SignalsConfig {
        protection: ProtectionConfig {
            enabled: true,
            failure_threshold: 2,
            open_timeout: Duration::from_millis(100),
            ..ProtectionConfig::default()
        },
        ..SignalsConfig::default()
    };
    let signals: Arc<Signals<&'static str, u32>> = Signals::builder(cfg).build().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    signals.connect_with_config("s", flaky("bad", Arc::clone(&calls), u32::MAX), sync_config().with_max_retries(0));

    for _ in 0..2 {
        assert_eq!(signals.emit("s", env("s"), |_| {}).await, EmitOutcome::Dispatched);
    }
    assert_eq!(signals.protection().circuit_state("s"), Some(CircuitState::Open));

    let recorder = Arc::new(Recorder::default());
    let outcome = signals.emit_with_callback("s", env("s"), recorder.clone(), |_| {}).await;
    assert_eq!(outcome, EmitOutcome::Blocked);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*recorder.log.lock(), ["error:s:signal_blocked", "complete:s"]);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(signals.emit("s", env("s"), |_| {}).await, EmitOutcome::Dispatched);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn unknown_signal_reports_no_handlers() {
    let signals = signals();
    let recorder = Arc::new(Recorder::default());
    let outcome = signals.emit_with_callback("nobody", env("nobody"), recorder.clone(), |_| {}).await;
    assert_eq!(outcome, EmitOutcome::NoHandlers);
    assert_eq!(*recorder.log.lock(), ["error:nobody:no_handlers", "complete:nobody"]);
}

struct Notify(mpsc::UnboundedSender<String>);

impl SignalCallback<&'static str, u32> for Notify {
    fn on_success(&self, _signal: &str, _env: &Env) {
        let _ = self.0.send("success".into());
    }
    fn on_error(&self, _signal: &str, _env: &Env, error: &SignalError) {
        let _ = self.0.send(error.as_label().into());
    }
}

#[tokio::test]
async fn async_dispatch_reports_from_the_worker() {
    let signals = signals();
    let a = Arc::new(AtomicU32::new(0));
    let cfg = SignalConfig::default().with_max_retries(0);
    signals.connect_with_config("s", counting("a", Arc::clone(&a)), cfg.clone());
    signals.connect_with_config("s", flaky("b", Arc::default(), u32::MAX), cfg);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let outcome = signals.emit_with_callback("s", env("s"), Arc::new(Notify(tx)), |_| {}).await;
    assert_eq!(outcome, EmitOutcome::Dispatched);

    let mut seen = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
    seen.sort();
    assert_eq!(seen, ["handler_failed", "success"]);
    // traced execution plus the re-check run
    assert_eq!(a.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn capped_pool_still_runs_timed_async_handlers() {
    let cfg = SignalsConfig {
        max_concurrent: 1,
        ..SignalsConfig::default()
    };
    let signals = Signals::<&'static str, u32>::builder(cfg).build().unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    // default config: async dispatch with a 10s timeout
    signals.connect_with_config("s", counting("h", Arc::clone(&calls)), SignalConfig::default());
    signals.connect_with_config("s", counting("g", Arc::clone(&calls)), SignalConfig::default());

    let (tx, mut rx) = mpsc::unbounded_channel();
    signals.emit_with_callback("s", env("s"), Arc::new(Notify(tx)), |_| {}).await;

    for _ in 0..2 {
        let seen = tokio::time::timeout(Duration::from_secs(3), rx.recv()).await;
        assert_eq!(seen.expect("handler starved by the pool cap").as_deref(), Some("success"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

struct Rebuild;

impl Transformer<&'static str, u32> for Rebuild {
    fn name(&self) -> &str {
        "rebuild"
    }
    fn transform(&self, signal: &str, env: &Env) -> Env {
        Envelope::new(signal, "rebuild", env.payload() + 1)
    }
}

#[tokio::test]
async fn handler_spans_stay_on_the_emission_tree_after_a_rebuilding_transformer() {
    let signals = signals();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler = HandlerFn::arc("h", move |env: Arc<Env>| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push((*env.payload(), env.context().event_id().to_string()));
            Ok::<(), HandlerError>(())
        }
    });
    signals.connect_with_config("s", handler, sync_config());
    signals.add_transformer("s", Arc::new(Rebuild));

    let ctx = Context::with_event_id("evt-t");
    signals.emit("s", env("s").with_context(ctx.clone()), |_| {}).await;

    assert_eq!(*seen.lock(), [(8, "evt-t".to_string())]);
    let spans = ctx.spans();
    let ops: Vec<&str> = spans.iter().map(|s| s.operation.as_str()).collect();
    assert_eq!(ops, ["Transformer: rebuild", "Handler: h"]);
    assert_eq!(spans[1].parent_span_id, spans[0].span_id);
}

struct Audit {
    after: Mutex<Vec<Option<String>>>,
}

impl Interceptor<&'static str, u32> for Audit {
    fn name(&self) -> &str {
        "audit"
    }
    fn after(&self, _signal: &str, _env: &Env, error: Option<&SignalError>) -> Result<(), HandlerError> {
        self.after.lock().push(error.map(|e| e.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn after_hooks_run_without_error_and_spans_root_at_event_id() {
    let signals = signals();
    signals.connect_with_config("s", flaky("bad", Arc::default(), u32::MAX), sync_config().with_max_retries(0));
    let audit = Arc::new(Audit { after: Mutex::new(Vec::new()) });
    signals.add_interceptor("s", audit.clone());

    let ctx = Context::with_event_id("evt-1");
    signals.emit("s", env("s").with_context(ctx.clone()), |_| {}).await;

    assert_eq!(*audit.after.lock(), [None::<String>]);
    let spans = ctx.spans();
    let ops: Vec<&str> = spans.iter().map(|s| s.operation.as_str()).collect();
    assert_eq!(ops, ["Interceptor: audit", "Handler: bad"]);
    assert_eq!(spans[0].parent_span_id, "evt-1");
    assert_eq!(spans[1].parent_span_id, spans[0].span_id);
    assert!(ctx.render_tree().contains("   └─ Handler: bad"));
}

#[tokio::test]
async fn bindings_expand_globs_against_registered_signals() {
    let signals = signals();
    for signal in ["order.created", "order.paid", "user.created"] {
        signals.connect_with_config(signal, counting("h", Arc::default()), sync_config());
    }
    let reject: Arc<dyn Filter<&'static str, u32>> = Arc::new(Reject);
    let attached = signals.bind([Binding::filter(["order.*"], reject)]);
    assert_eq!(attached, 2);

    assert_eq!(signals.emit("order.paid", env("order.paid"), |_| {}).await, EmitOutcome::PipelineRejected);
    assert_eq!(signals.emit("user.created", env("user.created"), |_| {}).await, EmitOutcome::Dispatched);
}

#[derive(Default)]
struct Tx {
    rolled_back: AtomicU32,
}

#[async_trait]
impl TransactionManager for Tx {
    async fn begin(&self, signal: &str, context: &Context) -> Result<Transaction, HandlerError> {
        Ok(Transaction {
            id: "tx".into(),
            signal: signal.to_string(),
            event_id: context.event_id().to_string(),
        })
    }
    async fn commit(&self, _tx: &Transaction) -> Result<(), HandlerError> {
        Ok(())
    }
    async fn rollback(&self, _tx: &Transaction) -> Result<(), HandlerError> {
        self.rolled_back.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn transactional_handler_dead_letters_after_redelivery() {
    let tx = Arc::new(Tx::default());
    let dead = Arc::new(DeadLetterQueue::new());
    let signals: Arc<Signals<&'static str, u32>> = Signals::builder(SignalsConfig::default())
        .with_transaction_manager(tx.clone())
        .with_dead_letters(dead.clone())
        .build()
        .unwrap();

    let calls = Arc::new(AtomicU32::new(0));
    let cfg = sync_config().with_max_retries(0).with_transaction(TransactionConfig {
        max_retries: 2,
        backoff: BackoffPolicy::constant(Duration::from_millis(1)),
        ..TransactionConfig::default()
    });
    signals.connect_with_config("s", flaky("bad", Arc::clone(&calls), u32::MAX), cfg);

    let (errors, on_error) = collect_errors();
    signals.emit("s", env("s"), on_error).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(tx.rolled_back.load(Ordering::SeqCst), 3);
    assert!(errors.lock().is_empty());
    let letters = dead.snapshot();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].attempts, 3);
    assert_eq!(letters[0].signal, "s");
}

struct Store(mpsc::UnboundedSender<PersistenceRecord>);

#[async_trait]
impl Persistence for Store {
    async fn save(&self, record: PersistenceRecord) -> Result<(), HandlerError> {
        self.0.send(record).map_err(|e| e.to_string().into())
    }
}

#[tokio::test]
async fn persistent_runtime_hands_records_to_the_backend() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cfg = SignalsConfig {
        persistent: true,
        ..SignalsConfig::default()
    };
    let signals: Arc<Signals<&'static str, u32>> = Signals::builder(cfg)
        .with_persistence(Arc::new(Store(tx)))
        .build()
        .unwrap();
    let id = signals.connect_with_config("s", counting("h", Arc::default()), sync_config());

    let ctx = Context::with_event_id("evt-9");
    signals.emit("s", env("s").with_context(ctx), |_| {}).await;

    let record = rx.recv().await.unwrap();
    assert_eq!(record.signal, "s");
    assert_eq!(record.handler_id, id);
    assert_eq!(record.event_id, "evt-9");
    assert_eq!(record.spans.len(), 1);
    let json = serde_json::to_value(&record).unwrap();
    assert_eq!(json["handler"], "h");
}

#[tokio::test]
async fn shutdown_reports_handlers_stuck_past_grace() {
    let cfg = SignalsConfig {
        grace: Duration::from_millis(50),
        ..SignalsConfig::default()
    };
    let signals: Arc<Signals<&'static str, u32>> = Signals::builder(cfg).build().unwrap();
    let stuck: HandlerRef<&'static str, u32> = HandlerFn::arc("stuck", |_env: Arc<Env>| async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok::<(), HandlerError>(())
    });
    let id = signals.connect_with_config("s", stuck, SignalConfig::default().with_timeout(Duration::ZERO));
    signals.emit("s", env("s"), |_| {}).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    match signals.shutdown().await {
        Err(RuntimeError::GraceExceeded { stuck, .. }) => assert_eq!(stuck, [format!("s#{id}")]),
        other => panic!("expected grace exceeded, got {other:?}"),
    }
    assert!(signals.registered_events().is_empty());
}

struct Kinds(Arc<Mutex<Vec<EventKind>>>);

#[async_trait]
impl Subscribe for Kinds {
    async fn on_event(&self, ev: &Event) {
        self.0.lock().push(ev.kind);
    }
    fn name(&self) -> &'static str {
        "kinds"
    }
}

#[tokio::test]
async fn subscribers_see_the_handler_lifecycle() {
    let kinds = Arc::new(Mutex::new(Vec::new()));
    let signals: Arc<Signals<&'static str, u32>> = Signals::builder(SignalsConfig::default())
        .with_subscribers(vec![Arc::new(Kinds(Arc::clone(&kinds)))])
        .build()
        .unwrap();
    signals.connect_with_config("s", flaky("h", Arc::default(), 2), sync_config());
    signals.emit("s", env("s"), |_| {}).await;
    signals.shutdown().await.unwrap();

    let kinds = kinds.lock();
    let pos = |k: EventKind| kinds.iter().position(|x| *x == k);
    assert!(pos(EventKind::HandlerAdded) < pos(EventKind::SignalEmitted));
    assert!(pos(EventKind::RetryScheduled) < pos(EventKind::HandlerSucceeded));
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::HandlerStarting).count(), 2);
    assert_eq!(kinds.last(), Some(&EventKind::AllStoppedWithin));
}
