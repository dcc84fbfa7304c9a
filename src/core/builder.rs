use std::sync::Arc;

use tokio::sync::mpsc;

use crate::broker::{BrokerRef, RedisBroker};
use crate::config::Config;
use crate::core::coordinator::{Coordinator, Startup};
use crate::error::RuntimeError;
use crate::events::Bus;
use crate::observers::Observe;
use crate::retry::RetryScheduler;

/// Capacity of the task submission channel.
const SUBMIT_CAPACITY: usize = 256;

/// Builder for a [`Coordinator`].
///
/// Without [`with_broker`](Self::with_broker) a [`RedisBroker`] is created from
/// `cfg.redis_url`; without [`with_identity`](Self::with_identity) the identity
/// comes from `cfg.identity` or is generated.
pub struct CoordinatorBuilder {
    cfg: Config,
    broker: Option<BrokerRef>,
    observers: Vec<Arc<dyn Observe>>,
    identity: Option<String>,
}

impl CoordinatorBuilder {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            broker: None,
            observers: Vec::new(),
            identity: None,
        }
    }

    /// Uses `broker` instead of connecting to `cfg.redis_url`.
    pub fn with_broker(mut self, broker: BrokerRef) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Observers receiving every runtime event through their own bounded queue.
    pub fn with_observers(mut self, observers: Vec<Arc<dyn Observe>>) -> Self {
        self.observers = observers;
        self
    }

    /// Overrides the liveness identity of this process.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Validates the configuration and assembles the coordinator.
    pub fn build(self) -> Result<Arc<Coordinator>, RuntimeError> {
        validate(&self.cfg)?;

        let broker: BrokerRef = match self.broker {
            Some(broker) => broker,
            None => Arc::new(RedisBroker::new(
                &self.cfg.redis_url,
                self.cfg.broker_timeout.0,
            )?),
        };
        let identity = match self.identity {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => self.cfg.identity_or_generated(),
        };

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let (specs_tx, specs_rx) = mpsc::channel(SUBMIT_CAPACITY);
        let (retry, retry_queue) =
            RetryScheduler::new(self.cfg.retry_interval.0, self.cfg.retry_queue_capacity);

        Ok(Arc::new(Coordinator::new_internal(
            self.cfg,
            identity,
            broker,
            bus,
            specs_tx,
            retry_queue,
            Startup {
                observers: self.observers,
                specs: specs_rx,
                retry,
            },
        )))
    }
}

fn validate(cfg: &Config) -> Result<(), RuntimeError> {
    let periods = [
        ("HEARTBEAT_INTERVAL", cfg.heartbeat_interval.0),
        ("HEALTH_INTERVAL", cfg.health_interval.0),
        ("RETRY_INTERVAL", cfg.retry_interval.0),
    ];
    for (name, period) in periods {
        if period.is_zero() {
            return Err(RuntimeError::Config(format!("{name} must be positive")));
        }
    }
    if cfg.liveness_key.trim().is_empty() {
        return Err(RuntimeError::Config("LIVENESS_KEY is empty".into()));
    }
    if cfg.cancel_channel.trim().is_empty() {
        return Err(RuntimeError::Config("CANCEL_CHANNEL is empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MemoryBroker;
    use std::time::Duration;

    #[test]
    fn test_zero_interval_is_rejected() {
        let cfg = Config {
            health_interval: Duration::ZERO.into(),
            ..Config::default()
        };
        let err = CoordinatorBuilder::new(cfg)
            .with_broker(Arc::new(MemoryBroker::new()))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "runtime_config");
        assert!(err.to_string().contains("HEALTH_INTERVAL"));
    }

    #[test]
    fn test_identity_precedence() {
        let cfg = Config {
            identity: "from-config".into(),
            ..Config::default()
        };
        let broker: BrokerRef = Arc::new(MemoryBroker::new());

        let c = CoordinatorBuilder::new(cfg.clone())
            .with_broker(broker.clone())
            .build()
            .unwrap();
        assert_eq!(c.identity(), "from-config");

        let c = CoordinatorBuilder::new(cfg)
            .with_broker(broker.clone())
            .with_identity("  explicit ")
            .build()
            .unwrap();
        assert_eq!(c.identity(), "explicit");

        let c = CoordinatorBuilder::new(Config::default())
            .with_broker(broker)
            .build()
            .unwrap();
        assert!(c.identity().starts_with(&format!("{}-", std::process::id())));
    }

    #[test]
    fn test_invalid_redis_url_fails_build() {
        let cfg = Config {
            redis_url: "not a url".into(),
            ..Config::default()
        };
        let err = CoordinatorBuilder::new(cfg).build().err().unwrap();
        assert_eq!(err.as_label(), "runtime_broker");
    }
}
