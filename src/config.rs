//! # Runtime configuration.
//!
//! [`Config`] centralizes the settings of a [`Coordinator`](crate::Coordinator).
//! It can be built from the environment with [`envconfig::Envconfig::init_from_env`]
//! or constructed in code starting from [`Config::default`].
//!
//! ## Sentinel values
//! - `task_timeout = 0` → tasks without an explicit deadline run unbounded
//! - `bus_capacity = 0` → clamped to 1
//! - `identity = ""` → a process-unique identity is generated

use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

/// Duration parsed from an integer number of milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
    type Err = ParseEnvMsDurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ms = s.trim().parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;

        Ok(EnvMsDuration(Duration::from_millis(ms)))
    }
}

impl From<Duration> for EnvMsDuration {
    fn from(d: Duration) -> Self {
        EnvMsDuration(d)
    }
}

/// Configuration for the coordinator and its components.
#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    /// Connection string of the broker.
    #[envconfig(from = "REDIS_URL", default = "redis://localhost:6379/")]
    pub redis_url: String,

    /// Stable identity of this process in the liveness set (empty = generated).
    #[envconfig(from = "IDENTITY", default = "")]
    pub identity: String,

    /// Sorted-set key holding one liveness record per process.
    #[envconfig(from = "LIVENESS_KEY", default = "pulsevisor:liveness")]
    pub liveness_key: String,

    /// Pub/sub channel carrying cancellation requests (payload = task id).
    #[envconfig(from = "CANCEL_CHANNEL", default = "pulsevisor:cancel")]
    pub cancel_channel: String,

    /// Period between liveness renewals.
    #[envconfig(from = "HEARTBEAT_INTERVAL", default = "5000")]
    pub heartbeat_interval: EnvMsDuration,

    /// Period between broker reachability probes.
    #[envconfig(from = "HEALTH_INTERVAL", default = "5000")]
    pub health_interval: EnvMsDuration,

    /// Period between two sweeps of the retry buffer.
    #[envconfig(from = "RETRY_INTERVAL", default = "5000")]
    pub retry_interval: EnvMsDuration,

    /// Capacity of the queue feeding the retry scheduler.
    #[envconfig(from = "RETRY_QUEUE_CAPACITY", default = "1024")]
    pub retry_queue_capacity: usize,

    /// Default task deadline (`0` = none).
    #[envconfig(from = "TASK_TIMEOUT", default = "0")]
    pub task_timeout: EnvMsDuration,

    /// Maximum wait for components to stop after shutdown was requested.
    #[envconfig(from = "GRACE", default = "30000")]
    pub grace: EnvMsDuration,

    /// Capacity of the event bus ring buffer.
    #[envconfig(from = "BUS_CAPACITY", default = "1024")]
    pub bus_capacity: usize,

    /// Per-call timeout for broker commands.
    #[envconfig(from = "BROKER_TIMEOUT", default = "1000")]
    pub broker_timeout: EnvMsDuration,
}

impl Config {
    /// Returns the default task deadline as an `Option`.
    #[inline]
    pub fn default_task_timeout(&self) -> Option<Duration> {
        match self.task_timeout.0 {
            Duration::ZERO => None,
            d => Some(d),
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the configured identity, or a generated `pid-uuid` one when unset.
    pub fn identity_or_generated(&self) -> String {
        let trimmed = self.identity.trim();
        if trimmed.is_empty() {
            format!("{}-{}", std::process::id(), uuid::Uuid::now_v7())
        } else {
            trimmed.to_string()
        }
    }
}

impl Default for Config {
    /// Same values as the environment defaults.
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379/".to_string(),
            identity: String::new(),
            liveness_key: "pulsevisor:liveness".to_string(),
            cancel_channel: "pulsevisor:cancel".to_string(),
            heartbeat_interval: Duration::from_secs(5).into(),
            health_interval: Duration::from_secs(5).into(),
            retry_interval: Duration::from_secs(5).into(),
            retry_queue_capacity: 1024,
            task_timeout: Duration::ZERO.into(),
            grace: Duration::from_secs(30).into(),
            bus_capacity: 1024,
            broker_timeout: Duration::from_secs(1).into(),
        }
    }
}
