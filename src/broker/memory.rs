use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Broker, ScoreOp, Subscription};
use crate::error::BrokerError;

const SUBSCRIPTION_BUFFER: usize = 256;

/// One sorted-set operation that reached the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreCall {
    pub key: String,
    pub member: String,
    pub op: ScoreOp,
    /// Integer reply the operation produced.
    pub reply: i64,
}

#[derive(Default)]
struct State {
    sets: HashMap<String, HashMap<String, i64>>,
    channels: HashMap<String, Vec<mpsc::Sender<String>>>,
    calls: Vec<ScoreCall>,
}

/// In-process broker for tests and demos.
///
/// Sorted sets and pub/sub live behind one lock, so every [`ScoreOp`] is
/// atomic. Every operation that reached the broker is logged, and
/// reachability can be toggled to simulate an outage.
pub struct MemoryBroker {
    state: Mutex<State>,
    reachable: AtomicBool,
    pings: AtomicUsize,
    failing_subscribes: AtomicUsize,
}

impl MemoryBroker {
    pub fn new() -> MemoryBroker {
        MemoryBroker {
            state: Mutex::new(State::default()),
            reachable: AtomicBool::new(true),
            pings: AtomicUsize::new(0),
            failing_subscribes: AtomicUsize::new(0),
        }
    }

    /// Simulates an outage (`false`) or a recovery (`true`).
    ///
    /// Going unreachable drops every open subscription.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if !reachable {
            self.lock().channels.clear();
        }
    }

    /// Makes the next `n` subscribe calls fail.
    pub fn fail_next_subscribes(&self, n: usize) {
        self.failing_subscribes.store(n, Ordering::SeqCst);
    }

    /// Drops every open subscription on `channel`, as a broker restart would.
    pub fn drop_subscribers(&self, channel: &str) {
        self.lock().channels.remove(channel);
    }

    /// Number of open subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock()
            .channels
            .get(channel)
            .map(|subs| subs.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }

    /// Current score of `member` in `key`.
    pub fn score_of(&self, key: &str, member: &str) -> Option<i64> {
        self.lock()
            .sets
            .get(key)
            .and_then(|set| set.get(member))
            .copied()
    }

    /// Every sorted-set operation that reached the broker, in order.
    pub fn score_calls(&self) -> Vec<ScoreCall> {
        self.lock().calls.clone()
    }

    /// Number of logged operations matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&ScoreOp) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(&c.op)).count()
    }

    /// Number of probes that reached the broker or failed because it was down.
    pub fn ping_count(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), BrokerError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("connection refused".to_string()))
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn score(&self, key: &str, member: &str, op: ScoreOp) -> Result<i64, BrokerError> {
        self.check_reachable()?;

        let mut state = self.lock();
        let set = state.sets.entry(key.to_string()).or_default();
        let reply = match op {
            ScoreOp::InsertIfAbsent(score) => {
                if set.contains_key(member) {
                    0
                } else {
                    set.insert(member.to_string(), score);
                    1
                }
            }
            ScoreOp::UpdateIfPresent(score) => match set.get_mut(member) {
                Some(current) => {
                    *current = score;
                    1
                }
                None => 0,
            },
            ScoreOp::Remove => i64::from(set.remove(member).is_some()),
        };
        if set.is_empty() {
            state.sets.remove(key);
        }

        state.calls.push(ScoreCall {
            key: key.to_string(),
            member: member.to_string(),
            op,
            reply,
        });
        Ok(reply)
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, BrokerError> {
        self.check_reachable()?;

        let mut state = self.lock();
        let Some(subs) = state.channels.get_mut(channel) else {
            return Ok(0);
        };
        let mut delivered = 0;
        subs.retain(|tx| match tx.try_send(payload.to_string()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        self.check_reachable()?;
        let failing = self
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(BrokerError::Unavailable("subscribe refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        self.lock()
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(tx);
        Ok(Subscription::new(channel, rx))
    }
}
