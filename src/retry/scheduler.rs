use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SubmitError;
use crate::events::{Bus, Event, EventKind};
use crate::retry::RetryItem;

/// Producer side of the retry buffer. Cheap to clone.
#[derive(Clone, Debug)]
pub struct RetryQueue {
    tx: mpsc::Sender<RetryItem>,
    pending: Arc<AtomicUsize>,
}

impl RetryQueue {
    /// Buffers `item`, waiting for room if the queue is full.
    pub async fn submit(&self, item: RetryItem) -> Result<(), SubmitError> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.tx.send(item).await.map_err(|err| {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            err.into()
        })
    }

    /// Buffers `item` without waiting.
    pub fn try_submit(&self, item: RetryItem) -> Result<(), SubmitError> {
        self.pending.fetch_add(1, Ordering::Relaxed);
        self.tx.try_send(item).map_err(|err| {
            self.pending.fetch_sub(1, Ordering::Relaxed);
            err.into()
        })
    }

    /// Items submitted and not yet dropped by the scheduler.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }
}

/// Consumer side: owns the working set and sweeps it on a fixed interval.
pub struct RetryScheduler {
    interval: Duration,
    rx: mpsc::Receiver<RetryItem>,
    pending: Arc<AtomicUsize>,
    bus: Bus,
}

impl RetryScheduler {
    /// Creates the scheduler and its queue; `capacity` bounds the queue (min 1).
    pub fn new(interval: Duration, capacity: usize) -> (RetryScheduler, RetryQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));
        let scheduler = RetryScheduler {
            interval,
            rx,
            pending: Arc::clone(&pending),
            bus: Bus::default(),
        };
        (scheduler, RetryQueue { tx, pending })
    }

    /// Publishes per-item outcomes on `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    /// Runs until `token` is cancelled; the working set is dropped on exit.
    pub async fn run(mut self, token: CancellationToken) {
        info!(interval = ?self.interval, "retry scheduler started");
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut working: Vec<RetryItem> = Vec::new();
        let mut open = true;
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                item = self.rx.recv(), if open => match item {
                    Some(item) => working.push(item),
                    None => open = false,
                },
                _ = ticker.tick() => {
                    working = self.sweep(working, &token).await;
                }
            }
        }

        self.rx.close();
        while let Ok(item) = self.rx.try_recv() {
            working.push(item);
        }
        let dropped = working.len();
        self.pending.fetch_sub(dropped, Ordering::Relaxed);
        info!(dropped, "retry scheduler stopped");
    }

    /// Attempts every due item once; returns the items still buffered.
    async fn sweep(&self, working: Vec<RetryItem>, token: &CancellationToken) -> Vec<RetryItem> {
        let now = Instant::now();
        let total = working.len();
        let mut kept = Vec::with_capacity(total);
        let mut items = working.into_iter();

        while let Some(mut item) = items.next() {
            if !item.is_due(now) {
                kept.push(item);
                continue;
            }

            let op = Arc::clone(&item.operation);
            let res = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                res = op.run() => Some(res),
            };
            let Some(res) = res else {
                kept.push(item);
                kept.extend(items);
                break;
            };
            item.attempts = item.attempts.saturating_add(1);

            match res {
                Ok(()) => {
                    debug!(tag = item.label(), attempt = item.attempts, "retried operation succeeded");
                    self.bus.publish(
                        Event::new(EventKind::RetrySucceeded)
                            .with_subject(item.label())
                            .with_attempt(item.attempts),
                    );
                    self.pending.fetch_sub(1, Ordering::Relaxed);
                }
                Err(err) if item.exhausted() => {
                    warn!(tag = item.label(), attempt = item.attempts, error = %err, "retried operation given up");
                    self.bus.publish(
                        Event::new(EventKind::RetryExhausted)
                            .with_subject(item.label())
                            .with_attempt(item.attempts)
                            .with_reason(err.to_string()),
                    );
                    self.pending.fetch_sub(1, Ordering::Relaxed);
                }
                Err(err) => {
                    if err.is_retryable() {
                        debug!(tag = item.label(), attempt = item.attempts, error = %err, "retried operation failed again");
                    } else {
                        warn!(tag = item.label(), attempt = item.attempts, error = %err, "retried operation failed with a non-retryable error, kept");
                    }
                    self.bus.publish(
                        Event::new(EventKind::RetryFailed)
                            .with_subject(item.label())
                            .with_attempt(item.attempts)
                            .with_reason(err.to_string()),
                    );
                    kept.push(item);
                }
            }
        }

        debug!(total, kept = kept.len(), "retry sweep done");
        kept
    }
}
