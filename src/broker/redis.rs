use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::{AsyncCommands, Script};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::warn;

use super::{Broker, ScoreOp, Subscription};
use crate::error::BrokerError;

const INSERT_IF_ABSENT: &str = r"
if redis.call('ZSCORE', KEYS[1], ARGV[2]) then
    return 0
end
return redis.call('ZADD', KEYS[1], ARGV[1], ARGV[2])
";

const UPDATE_IF_PRESENT: &str = r"
if redis.call('ZSCORE', KEYS[1], ARGV[2]) then
    redis.call('ZADD', KEYS[1], 'XX', ARGV[1], ARGV[2])
    return 1
end
return 0
";

const REMOVE_MEMBER: &str = r"
return redis.call('ZREM', KEYS[1], ARGV[1])
";

/// Buffered payloads between the pub/sub connection and the subscriber.
const SUBSCRIPTION_BUFFER: usize = 256;

/// Broker backed by Redis.
///
/// Each call opens its own connection and is bounded by `timeout`; scripts are
/// sent with `EVALSHA` and loaded on first use.
pub struct RedisBroker {
    client: redis::Client,
    timeout: Duration,
    insert_if_absent: Script,
    update_if_present: Script,
    remove_member: Script,
}

impl RedisBroker {
    pub fn new(addr: &str, timeout: Duration) -> Result<RedisBroker, BrokerError> {
        let client = redis::Client::open(addr)?;

        Ok(RedisBroker {
            client,
            timeout,
            insert_if_absent: Script::new(INSERT_IF_ABSENT),
            update_if_present: Script::new(UPDATE_IF_PRESENT),
            remove_member: Script::new(REMOVE_MEMBER),
        })
    }

    async fn connection(&self) -> Result<redis::aio::Connection, BrokerError> {
        Ok(timeout(self.timeout, self.client.get_async_connection()).await??)
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn score(&self, key: &str, member: &str, op: ScoreOp) -> Result<i64, BrokerError> {
        let mut conn = self.connection().await?;

        let invocation = match op {
            ScoreOp::InsertIfAbsent(score) => {
                let mut inv = self.insert_if_absent.prepare_invoke();
                inv.key(key).arg(score).arg(member);
                inv
            }
            ScoreOp::UpdateIfPresent(score) => {
                let mut inv = self.update_if_present.prepare_invoke();
                inv.key(key).arg(score).arg(member);
                inv
            }
            ScoreOp::Remove => {
                let mut inv = self.remove_member.prepare_invoke();
                inv.key(key).arg(member);
                inv
            }
        };

        let reply = timeout(self.timeout, invocation.invoke_async::<_, i64>(&mut conn)).await?;
        reply.map_err(|err| match err.kind() {
            redis::ErrorKind::IoError => BrokerError::Unavailable(err.to_string()),
            _ => BrokerError::Script {
                script: op.name(),
                error: err.to_string(),
            },
        })
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        let mut conn = self.connection().await?;
        let pong = timeout(
            self.timeout,
            redis::cmd("PING").query_async::<_, String>(&mut conn),
        )
        .await??;

        if pong == "PONG" {
            Ok(())
        } else {
            Err(BrokerError::Unavailable(format!("unexpected PING reply {pong}")))
        }
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, BrokerError> {
        let mut conn = self.connection().await?;
        let receivers = timeout(self.timeout, conn.publish::<_, _, u64>(channel, payload)).await??;

        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let mut pubsub = self.connection().await?.into_pubsub();
        timeout(self.timeout, pubsub.subscribe(channel)).await??;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let name = channel.to_string();
        let forwarder = tokio::spawn(async move {
            let mut messages = Box::pin(pubsub.into_on_message());
            while let Some(msg) = messages.next().await {
                match msg.get_payload::<String>() {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(channel = %name, error = %err, "dropping non-text payload"),
                }
            }
        });

        Ok(Subscription::with_forwarder(channel, rx, forwarder))
    }
}
