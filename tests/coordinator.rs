use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulsevisor::{
    Broker, BrokerError, Config, Coordinator, Event, EventKind, MemoryBroker, Observe,
    OperationFn, RetryItem, RuntimeError, ScoreOp, Subscription, TaskError, TaskFn, TaskId,
    TaskRef, TaskSpec,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const IDENTITY: &str = "worker-a";

fn config() -> Config {
    Config {
        heartbeat_interval: Duration::from_millis(100).into(),
        health_interval: Duration::from_millis(100).into(),
        retry_interval: Duration::from_millis(100).into(),
        grace: Duration::from_secs(1).into(),
        ..Config::default()
    }
}

fn start(
    coordinator: &Arc<Coordinator>,
    initial: Vec<TaskSpec>,
) -> JoinHandle<Result<(), RuntimeError>> {
    let c = Arc::clone(coordinator);
    tokio::spawn(async move { c.run(initial).await })
}

async fn wait_for(rx: &mut broadcast::Receiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match rx.recv().await {
                Ok(ev) if pred(&ev) => return ev,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("bus closed"),
            }
        }
    })
    .await
    .expect("event not observed in time")
}

fn until_canceled(flag: Arc<AtomicBool>) -> TaskRef {
    TaskFn::arc("until-canceled", move |ctx: CancellationToken| {
        let flag = flag.clone();
        async move {
            ctx.cancelled().await;
            flag.store(true, Ordering::SeqCst);
            Err::<(), _>(TaskError::Canceled)
        }
    })
}

#[tokio::test(start_paused = true)]
async fn heartbeat_record_lives_as_long_as_the_process() {
    let broker = Arc::new(MemoryBroker::new());
    let coordinator = Coordinator::builder(config())
        .with_broker(broker.clone())
        .with_identity(IDENTITY)
        .build()
        .unwrap();
    let key = coordinator.config().liveness_key.clone();

    let handle = start(&coordinator, Vec::new());
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert!(broker.score_of(&key, IDENTITY).is_some());
    assert_eq!(
        broker.count_calls(|op| matches!(op, ScoreOp::InsertIfAbsent(_))),
        1
    );
    assert!(broker.count_calls(|op| matches!(op, ScoreOp::UpdateIfPresent(_))) >= 2);

    coordinator.shutdown();
    handle.await.unwrap().unwrap();

    assert_eq!(broker.score_of(&key, IDENTITY), None);
    assert_eq!(broker.count_calls(|op| *op == ScoreOp::Remove), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_request_stops_only_the_named_task() {
    let broker = Arc::new(MemoryBroker::new());
    let coordinator = Coordinator::builder(config())
        .with_broker(broker)
        .with_identity(IDENTITY)
        .build()
        .unwrap();
    let mut events = coordinator.bus().subscribe();

    let seven = Arc::new(AtomicBool::new(false));
    let eight = Arc::new(AtomicBool::new(false));
    let handle = start(
        &coordinator,
        vec![
            TaskSpec::new(7u64, until_canceled(seven.clone())),
            TaskSpec::new(8u64, until_canceled(eight.clone())),
        ],
    );
    wait_for(&mut events, |ev| ev.kind == EventKind::SubscriptionEstablished).await;

    let receivers = coordinator.request_cancel(&TaskId::from(7u64)).await.unwrap();
    assert_eq!(receivers, 1);

    let concluded = wait_for(&mut events, |ev| {
        ev.kind == EventKind::TaskConcluded && ev.subject.as_deref() == Some("7")
    })
    .await;
    assert_eq!(concluded.reason.as_deref(), Some("canceled"));
    assert!(seven.load(Ordering::SeqCst));
    assert!(!eight.load(Ordering::SeqCst));
    assert_eq!(coordinator.registry().ids(), vec![TaskId::from(8u64)]);

    coordinator.request_cancel(&TaskId::from(7u64)).await.unwrap();
    let ev = wait_for(&mut events, |ev| ev.kind == EventKind::CancelUnknown).await;
    assert_eq!(ev.subject.as_deref(), Some("7"));
    assert!(!eight.load(Ordering::SeqCst));

    coordinator.shutdown();
    handle.await.unwrap().unwrap();
    assert!(eight.load(Ordering::SeqCst));
    assert!(coordinator.registry().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_cancellation_is_harmless() {
    let coordinator = Coordinator::builder(config())
        .with_broker(Arc::new(MemoryBroker::new()))
        .build()
        .unwrap();
    let mut events = coordinator.bus().subscribe();
    let handle = start(&coordinator, Vec::new());
    wait_for(&mut events, |ev| ev.kind == EventKind::SubscriptionEstablished).await;

    coordinator.request_cancel(&TaskId::from("ghost")).await.unwrap();
    let ev = wait_for(&mut events, |ev| ev.kind == EventKind::CancelUnknown).await;
    assert_eq!(ev.subject.as_deref(), Some("ghost"));

    coordinator.shutdown();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn broker_outage_shuts_the_process_down_once() {
    let broker = Arc::new(MemoryBroker::new());
    let coordinator = Coordinator::builder(config())
        .with_broker(broker.clone())
        .with_identity(IDENTITY)
        .build()
        .unwrap();
    let mut events = coordinator.bus().subscribe();

    let flag = Arc::new(AtomicBool::new(false));
    let handle = start(
        &coordinator,
        vec![TaskSpec::new("long", until_canceled(flag.clone()))],
    );
    wait_for(&mut events, |ev| ev.kind == EventKind::SubscriptionEstablished).await;

    broker.set_reachable(false);
    handle.await.unwrap().unwrap();

    let signal = coordinator.shutdown_signal();
    assert!(signal.is_fired());
    assert!(signal.reason().unwrap().contains("health check"));
    assert!(flag.load(Ordering::SeqCst), "running task observed shutdown");

    let mut requested = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::ShutdownRequested {
            requested += 1;
        }
    }
    assert_eq!(requested, 1);
}

#[tokio::test(start_paused = true)]
async fn submitted_tasks_and_retries_run_while_alive() {
    let coordinator = Coordinator::builder(config())
        .with_broker(Arc::new(MemoryBroker::new()))
        .build()
        .unwrap();
    let mut events = coordinator.bus().subscribe();
    let handle = start(&coordinator, Vec::new());

    let done: TaskRef = TaskFn::arc("done", |_ctx: CancellationToken| async {
        Ok::<(), TaskError>(())
    });
    coordinator.submit(TaskSpec::new(1u64, done.clone())).await.unwrap();
    let ev = wait_for(&mut events, |ev| ev.kind == EventKind::TaskConcluded).await;
    assert_eq!(ev.reason.as_deref(), Some("completed"));

    coordinator.try_submit(TaskSpec::new(2u64, done)).unwrap();
    let ev = wait_for(&mut events, |ev| ev.kind == EventKind::TaskConcluded).await;
    assert_eq!(ev.subject.as_deref(), Some("2"));

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let flaky = RetryItem::new(OperationFn::arc(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n < 2 {
                Err(TaskError::fail("not yet"))
            } else {
                Ok(())
            }
        }
    }))
    .with_tag("flaky");
    coordinator.retry_queue().submit(flaky).await.unwrap();

    let ev = wait_for(&mut events, |ev| ev.kind == EventKind::RetrySucceeded).await;
    assert_eq!(ev.attempt, Some(3));
    assert_eq!(coordinator.retry_queue().pending(), 0);

    coordinator.shutdown();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn deadline_concludes_task_context() {
    let mut cfg = config();
    cfg.task_timeout = Duration::from_millis(300).into();
    let coordinator = Coordinator::builder(cfg)
        .with_broker(Arc::new(MemoryBroker::new()))
        .build()
        .unwrap();
    let mut events = coordinator.bus().subscribe();

    let flag = Arc::new(AtomicBool::new(false));
    let handle = start(
        &coordinator,
        vec![TaskSpec::new(3u64, until_canceled(flag.clone()))],
    );

    let ev = wait_for(&mut events, |ev| ev.kind == EventKind::TaskConcluded).await;
    assert_eq!(ev.reason.as_deref(), Some("timed_out"));
    assert!(coordinator.registry().is_empty());
    assert!(!coordinator.shutdown_signal().is_fired());

    coordinator.shutdown();
    handle.await.unwrap().unwrap();
}

/// Broker whose removals never complete.
struct StuckRemoval(MemoryBroker);

#[async_trait]
impl Broker for StuckRemoval {
    async fn score(&self, key: &str, member: &str, op: ScoreOp) -> Result<i64, BrokerError> {
        if op == ScoreOp::Remove {
            std::future::pending::<()>().await;
        }
        self.0.score(key, member, op).await
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        self.0.ping().await
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, BrokerError> {
        self.0.publish(channel, payload).await
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        self.0.subscribe(channel).await
    }
}

#[tokio::test(start_paused = true)]
async fn stuck_component_exceeds_grace() {
    let mut cfg = config();
    cfg.grace = Duration::from_millis(500).into();
    let coordinator = Coordinator::builder(cfg)
        .with_broker(Arc::new(StuckRemoval(MemoryBroker::new())))
        .build()
        .unwrap();
    let mut events = coordinator.bus().subscribe();
    let handle = start(&coordinator, Vec::new());
    wait_for(&mut events, |ev| ev.kind == EventKind::HeartbeatCreated).await;

    coordinator.shutdown();
    let err = handle.await.unwrap().unwrap_err();
    match err {
        RuntimeError::GraceExceeded { grace, stuck } => {
            assert_eq!(grace, Duration::from_millis(500));
            assert!(stuck.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn second_run_is_rejected() {
    let coordinator = Coordinator::builder(config())
        .with_broker(Arc::new(MemoryBroker::new()))
        .build()
        .unwrap();
    coordinator.shutdown();
    coordinator.run(Vec::new()).await.unwrap();

    let err = coordinator.run(Vec::new()).await.unwrap_err();
    assert_eq!(err.as_label(), "runtime_already_started");
}

struct Counting(Arc<AtomicUsize>);

#[async_trait]
impl Observe for Counting {
    async fn on_event(&self, ev: &Event) {
        if ev.kind == EventKind::AllStoppedWithin {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn observers_see_the_final_events() {
    let seen = Arc::new(AtomicUsize::new(0));
    let coordinator = Coordinator::builder(config())
        .with_broker(Arc::new(MemoryBroker::new()))
        .with_observers(vec![Arc::new(Counting(seen.clone()))])
        .build()
        .unwrap();
    let handle = start(&coordinator, Vec::new());

    tokio::time::sleep(Duration::from_millis(150)).await;
    coordinator.shutdown();
    handle.await.unwrap().unwrap();

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

struct AlwaysPanics {
    calls: Arc<AtomicUsize>,
    saw_internal: Arc<AtomicBool>,
}

#[async_trait]
impl Observe for AlwaysPanics {
    async fn on_event(&self, ev: &Event) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if ev.is_observer_internal() {
            self.saw_internal.store(true, Ordering::SeqCst);
        }
        panic!("observer bug");
    }

    fn name(&self) -> &'static str {
        "always-panics"
    }
}

#[tokio::test(start_paused = true)]
async fn panicking_observer_does_not_feed_itself() {
    let calls = Arc::new(AtomicUsize::new(0));
    let saw_internal = Arc::new(AtomicBool::new(false));
    let coordinator = Coordinator::builder(config())
        .with_broker(Arc::new(MemoryBroker::new()))
        .with_observers(vec![Arc::new(AlwaysPanics {
            calls: calls.clone(),
            saw_internal: saw_internal.clone(),
        })])
        .build()
        .unwrap();
    let mut events = coordinator.bus().subscribe();
    let handle = start(&coordinator, Vec::new());

    tokio::time::sleep(Duration::from_millis(350)).await;
    coordinator.shutdown();
    handle.await.unwrap().unwrap();

    let mut panicked = 0;
    let mut delivered = 0;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::ObserverPanicked {
            assert_eq!(ev.subject.as_deref(), Some("always-panics"));
            panicked += 1;
        } else if !ev.is_observer_internal() {
            delivered += 1;
        }
    }

    let calls = calls.load(Ordering::SeqCst);
    assert!(calls > 0);
    assert_eq!(calls, delivered);
    assert_eq!(panicked, calls);
    assert!(!saw_internal.load(Ordering::SeqCst));
}
