//! # Example: coordinator
//!
//! Runs a full coordinator against the broker at `REDIS_URL` until Ctrl-C.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► Config::init_from_env()
//!   ├─► Coordinator::builder(cfg).with_observers([Console]).build()
//!   └─► run([ticker #1, ticker #2])
//!         ├─► heartbeat renews ZSET pulsevisor:liveness <identity>
//!         ├─► health checker pings the broker
//!         ├─► subscriber listens on pulsevisor:cancel
//!         └─► retry scheduler sweeps the retry buffer
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info HEARTBEAT_INTERVAL=1000 cargo run --example coordinator
//! # in another shell:
//! redis-cli ZRANGE pulsevisor:liveness 0 -1 WITHSCORES
//! redis-cli PUBLISH pulsevisor:cancel 1
//! ```

use std::sync::Arc;
use std::time::Duration;

use envconfig::Envconfig;
use pulsevisor::{
    Config, Coordinator, Event, EventKind, Observe, OperationFn, RetryItem, TaskError, TaskFn,
    TaskRef, TaskSpec,
};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Console;

#[async_trait::async_trait]
impl Observe for Console {
    async fn on_event(&self, ev: &Event) {
        match ev.kind {
            EventKind::HeartbeatRenewed | EventKind::RetryFailed => {}
            kind => println!(
                "[event #{}] {:?} subject={} reason={}",
                ev.seq,
                kind,
                ev.subject.as_deref().unwrap_or("-"),
                ev.reason.as_deref().unwrap_or("-"),
            ),
        }
    }

    fn name(&self) -> &'static str {
        "console"
    }
}

fn ticker(id: u64, every: Duration, cfg: &Config) -> TaskSpec {
    let task: TaskRef = TaskFn::arc("ticker", move |ctx: CancellationToken| async move {
        let mut n = 0u64;
        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Err::<(), _>(TaskError::Canceled),
                _ = tokio::time::sleep(every) => {
                    n += 1;
                    info!(task = id, tick = n, "tick");
                }
            }
        }
    });
    TaskSpec::with_defaults(id, task, cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = Config::init_from_env()?;
    let coordinator = Coordinator::builder(cfg)
        .with_observers(vec![Arc::new(Console)])
        .build()?;
    info!(identity = coordinator.identity(), "starting");

    coordinator
        .retry_queue()
        .submit(
            RetryItem::new(OperationFn::arc(|| async {
                info!("flushing buffered report");
                Ok::<(), TaskError>(())
            }))
            .with_tag("flush-report"),
        )
        .await?;

    coordinator
        .run(vec![
            ticker(1, Duration::from_secs(1), coordinator.config()),
            ticker(2, Duration::from_secs(3), coordinator.config()),
        ])
        .await?;
    Ok(())
}
