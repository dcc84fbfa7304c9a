//! # CancellationSubscriber: broker channel to registry.
//!
//! ```text
//!            ┌──────────── backoff wait ◄──────────────┐
//!            ▼                                          │ subscribe failed
//!       Connecting ──subscribe ok──► Subscribed ──► Dispatching
//!            ▲                                          │ payload: parse, lookup, cancel
//!            └──────── stream ended (SubscriptionLost) ◄┘
//!
//!   token cancelled in any state ──► Closed (subscription dropped)
//! ```
//!
//! Cancellation is best effort: a request for an id that is not (or not yet)
//! registered is logged and dropped. Entries are never removed here; the
//! runner removes them when the task's context concludes.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::{Broker, BrokerRef};
use crate::cancel::{CancellationRegistry, TaskId};
use crate::error::BrokerError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::{Backoff, BackoffPolicy};

/// Where the subscriber is in its connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Opening (or reopening) the subscription.
    Connecting,
    /// The broker confirmed the subscription.
    Subscribed,
    /// Receiving and dispatching cancellation requests.
    Dispatching,
    /// Stopped after shutdown.
    Closed,
}

/// Listens on the cancellation channel and invokes registered controls.
pub struct CancellationSubscriber {
    broker: BrokerRef,
    channel: String,
    registry: Arc<CancellationRegistry>,
    bus: Bus,
    backoff: BackoffPolicy,
    state: watch::Sender<SubscriberState>,
}

impl CancellationSubscriber {
    pub fn new(
        broker: BrokerRef,
        channel: impl Into<String>,
        registry: Arc<CancellationRegistry>,
        bus: Bus,
    ) -> Self {
        let (state, _) = watch::channel(SubscriberState::Connecting);
        Self {
            broker,
            channel: channel.into(),
            registry,
            bus,
            backoff: BackoffPolicy::default(),
            state,
        }
    }

    /// Replaces the reconnect backoff.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Receiver tracking the current [`SubscriberState`].
    pub fn state(&self) -> watch::Receiver<SubscriberState> {
        self.state.subscribe()
    }

    /// Runs until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        info!(channel = %self.channel, "cancellation subscriber started");
        let mut backoff = Backoff::new(self.backoff);

        'connect: loop {
            self.set_state(SubscriberState::Connecting);
            let attempt = tokio::select! {
                biased;
                _ = token.cancelled() => break 'connect,
                res = self.broker.subscribe(&self.channel) => res,
            };
            let mut sub = match attempt {
                Ok(sub) => sub,
                Err(err) => {
                    let delay = backoff.next_delay();
                    self.lost(&err, delay);
                    if !wait_or_cancel(&token, delay).await {
                        break 'connect;
                    }
                    continue 'connect;
                }
            };

            backoff.reset();
            self.set_state(SubscriberState::Subscribed);
            info!(channel = sub.channel(), "subscribed to cancellation channel");
            self.bus
                .publish(Event::new(EventKind::SubscriptionEstablished).with_subject(sub.channel()));

            self.set_state(SubscriberState::Dispatching);
            loop {
                let payload = tokio::select! {
                    biased;
                    _ = token.cancelled() => break 'connect,
                    msg = sub.recv() => msg,
                };
                match payload {
                    Some(payload) => self.dispatch(&payload),
                    None => break,
                }
            }

            drop(sub);
            let err = BrokerError::SubscriptionLost {
                channel: self.channel.clone(),
            };
            let delay = backoff.next_delay();
            self.lost(&err, delay);
            if !wait_or_cancel(&token, delay).await {
                break 'connect;
            }
        }

        self.set_state(SubscriberState::Closed);
        info!(channel = %self.channel, "cancellation subscriber stopped");
    }

    fn dispatch(&self, payload: &str) {
        let id = match payload.parse::<TaskId>() {
            Ok(id) => id,
            Err(err) => {
                warn!(channel = %self.channel, payload, error = %err, "dropping invalid cancellation request");
                self.bus.publish(
                    Event::new(EventKind::CancelUnknown)
                        .with_subject(payload)
                        .with_reason(err.to_string()),
                );
                return;
            }
        };

        match self.registry.lookup(&id) {
            Ok(control) => {
                control.cancel();
                info!(task = %id, "cancellation dispatched");
                self.bus
                    .publish(Event::new(EventKind::CancelDispatched).with_subject(&id));
            }
            Err(err) => {
                debug!(task = %id, "no running task for cancellation request");
                self.bus.publish(
                    Event::new(EventKind::CancelUnknown)
                        .with_subject(&id)
                        .with_reason(err.as_label()),
                );
            }
        }
    }

    fn lost(&self, err: &BrokerError, delay: Duration) {
        warn!(channel = %self.channel, error = %err, ?delay, "cancellation subscription unavailable, reconnecting");
        self.bus.publish(
            Event::new(EventKind::SubscriptionLost)
                .with_subject(self.channel.as_str())
                .with_reason(err.to_string())
                .with_delay(delay),
        );
    }

    fn set_state(&self, state: SubscriberState) {
        self.state.send_replace(state);
    }
}

/// Sleeps for `delay`; returns `false` if `token` was cancelled first.
async fn wait_or_cancel(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = time::sleep(delay) => true,
    }
}

/// Publishes a cancellation request for `id` on `channel`.
///
/// Returns the number of subscribers that received it. Delivery is best
/// effort: zero receivers, or a task not yet registered, drops the request.
pub async fn request_cancel(
    broker: &dyn Broker,
    channel: &str,
    id: &TaskId,
) -> Result<u64, BrokerError> {
    let receivers = broker.publish(channel, id.as_str()).await?;
    debug!(task = %id, channel, receivers, "cancellation requested");
    Ok(receivers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use crate::cancel::CancelFn;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;

    const CHANNEL: &str = "cancel";

    struct Harness {
        broker: Arc<MemoryBroker>,
        registry: Arc<CancellationRegistry>,
        events: broadcast::Receiver<Event>,
        state: watch::Receiver<SubscriberState>,
        token: CancellationToken,
        handle: tokio::task::JoinHandle<()>,
    }

    fn start(broker: Arc<MemoryBroker>) -> Harness {
        let registry = Arc::new(CancellationRegistry::new());
        let bus = Bus::new(128);
        let events = bus.subscribe();
        let sub = CancellationSubscriber::new(broker.clone(), CHANNEL, registry.clone(), bus);
        let state = sub.state();
        let token = CancellationToken::new();
        let handle = tokio::spawn(sub.run(token.clone()));
        Harness {
            broker,
            registry,
            events,
            state,
            token,
            handle,
        }
    }

    async fn next_of(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    }

    fn counting(hits: &Arc<AtomicUsize>) -> crate::cancel::CancelRef {
        let hits = hits.clone();
        CancelFn::arc(move || {
            hits.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_request_invokes_control_once_until_removed() {
        let mut h = start(Arc::new(MemoryBroker::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        h.registry
            .register(TaskId::from(7u64), counting(&hits))
            .unwrap();
        h.state
            .wait_for(|s| *s == SubscriberState::Dispatching)
            .await
            .unwrap();

        let receivers = request_cancel(h.broker.as_ref(), CHANNEL, &TaskId::from(7u64))
            .await
            .unwrap();
        assert_eq!(receivers, 1);

        let ev = next_of(&mut h.events, EventKind::CancelDispatched).await;
        assert_eq!(ev.subject.as_deref(), Some("7"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(
            h.registry.contains(&TaskId::from(7u64)),
            "subscriber never removes entries"
        );

        assert!(h.registry.remove(&TaskId::from(7u64)));
        request_cancel(h.broker.as_ref(), CHANNEL, &TaskId::from(7u64))
            .await
            .unwrap();
        let ev = next_of(&mut h.events, EventKind::CancelUnknown).await;
        assert_eq!(ev.subject.as_deref(), Some("7"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        h.token.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_and_invalid_requests_are_dropped() {
        let mut h = start(Arc::new(MemoryBroker::new()));
        h.state
            .wait_for(|s| *s == SubscriberState::Dispatching)
            .await
            .unwrap();

        h.broker.publish(CHANNEL, "99").await.unwrap();
        let ev = next_of(&mut h.events, EventKind::CancelUnknown).await;
        assert_eq!(ev.subject.as_deref(), Some("99"));
        assert_eq!(ev.reason.as_deref(), Some("registry_not_found"));

        h.broker.publish(CHANNEL, "   ").await.unwrap();
        let ev = next_of(&mut h.events, EventKind::CancelUnknown).await;
        assert_eq!(ev.subject.as_deref(), Some("   "));

        assert!(!h.handle.is_finished());
        h.token.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_failed_subscribes() {
        let broker = Arc::new(MemoryBroker::new());
        broker.fail_next_subscribes(2);
        let mut h = start(broker);

        h.state
            .wait_for(|s| *s == SubscriberState::Dispatching)
            .await
            .unwrap();

        let first = next_of(&mut h.events, EventKind::SubscriptionLost).await;
        let second = next_of(&mut h.events, EventKind::SubscriptionLost).await;
        assert!(first.delay_ms.is_some() && second.delay_ms.is_some());
        next_of(&mut h.events, EventKind::SubscriptionEstablished).await;
        assert_eq!(h.broker.subscriber_count(CHANNEL), 1);

        h.token.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_subscription_is_reopened() {
        let mut h = start(Arc::new(MemoryBroker::new()));
        let hits = Arc::new(AtomicUsize::new(0));
        h.registry
            .register(TaskId::from("job-a"), counting(&hits))
            .unwrap();

        next_of(&mut h.events, EventKind::SubscriptionEstablished).await;
        h.broker.drop_subscribers(CHANNEL);

        let lost = next_of(&mut h.events, EventKind::SubscriptionLost).await;
        assert_eq!(lost.subject.as_deref(), Some(CHANNEL));
        next_of(&mut h.events, EventKind::SubscriptionEstablished).await;

        h.broker.publish(CHANNEL, "job-a").await.unwrap();
        next_of(&mut h.events, EventKind::CancelDispatched).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        h.token.cancel();
        h.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_closes_subscription() {
        let mut h = start(Arc::new(MemoryBroker::new()));
        h.state
            .wait_for(|s| *s == SubscriberState::Dispatching)
            .await
            .unwrap();
        assert_eq!(h.broker.subscriber_count(CHANNEL), 1);

        h.token.cancel();
        h.handle.await.unwrap();

        assert_eq!(*h.state.borrow(), SubscriberState::Closed);
        assert_eq!(h.broker.subscriber_count(CHANNEL), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff_wait() {
        let broker = Arc::new(MemoryBroker::new());
        broker.set_reachable(false);
        let policy = BackoffPolicy {
            first: Duration::from_secs(3600),
            max: Duration::from_secs(3600),
            ..BackoffPolicy::default()
        };
        let registry = Arc::new(CancellationRegistry::new());
        let sub = CancellationSubscriber::new(broker, CHANNEL, registry, Bus::new(8))
            .with_backoff(policy);
        let token = CancellationToken::new();
        let handle = tokio::spawn(sub.run(token.clone()));

        time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("backoff wait is cancellable")
            .unwrap();
    }
}
