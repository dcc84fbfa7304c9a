//! # Example: cancel_task
//!
//! Cancels a running task through the broker channel, in one process, on the
//! in-memory broker.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► spawn Coordinator::run([worker #7])
//!   │     └─► TaskRunner registers 7 ──► CancellationRegistry
//!   └─► driver
//!         ├─► sleep 1s (let the worker tick)
//!         ├─► request_cancel(7) ──► PUBLISH pulsevisor:cancel "7"
//!         │     └─► CancellationSubscriber: lookup(7).cancel()
//!         ├─► wait for TaskConcluded(7)
//!         └─► shutdown()
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example cancel_task
//! ```

use std::sync::Arc;
use std::time::Duration;

use pulsevisor::{
    Config, Coordinator, EventKind, MemoryBroker, TaskError, TaskFn, TaskId, TaskRef, TaskSpec,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut cfg = Config::default();
    cfg.grace = Duration::from_secs(5).into();
    cfg.heartbeat_interval = Duration::from_millis(500).into();

    let coordinator = Coordinator::builder(cfg)
        .with_broker(Arc::new(MemoryBroker::new()))
        .with_identity("demo")
        .build()?;
    let mut events = coordinator.bus().subscribe();

    let worker: TaskRef = TaskFn::arc("worker", |ctx: CancellationToken| async move {
        let mut tick = 0u32;
        loop {
            if ctx.is_cancelled() {
                println!("[worker] cancellation observed after {tick} ticks");
                return Err::<(), _>(TaskError::Canceled);
            }
            tick += 1;
            println!("[worker] tick #{tick}");
            tokio::select! {
                _ = ctx.cancelled() => {}
                _ = tokio::time::sleep(Duration::from_millis(200)) => {}
            }
        }
    });

    let runtime = {
        let c = Arc::clone(&coordinator);
        tokio::spawn(async move { c.run(vec![TaskSpec::new(7u64, worker)]).await })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    let id = TaskId::from(7u64);
    let receivers = coordinator.request_cancel(&id).await?;
    println!("[driver] cancel request for {id} reached {receivers} subscriber(s)");

    while let Ok(ev) = events.recv().await {
        if ev.kind == EventKind::TaskConcluded && ev.subject.as_deref() == Some("7") {
            println!("[driver] task 7 concluded: {}", ev.reason.as_deref().unwrap_or("-"));
            break;
        }
    }
    assert!(coordinator.registry().is_empty());

    coordinator.shutdown();
    runtime.await??;
    println!("[driver] done");
    Ok(())
}
