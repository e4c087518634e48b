//! Pipeline configuration

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::reliability::BackoffPolicy;

/// Highest accepted failure rate (out of 10)
pub const MAX_FAILURE_RATE: u8 = 10;

/// Capacities of the four pipeline queues
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueCapacities {
    /// New items from the producer
    pub orders: usize,
    /// Items resubmitted by the worker
    pub retries: usize,
    /// Fan-in of orders and retries, consumed by the worker
    pub merged: usize,
    /// Items that exhausted their retries
    pub dead_letter: usize,
}

impl Default for QueueCapacities {
    fn default() -> Self {
        Self::uniform(10)
    }
}

impl QueueCapacities {
    /// Same capacity for every queue
    pub fn uniform(capacity: usize) -> Self {
        Self {
            orders: capacity,
            retries: capacity,
            merged: capacity,
            dead_letter: capacity,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let queues = [
            ("orders", self.orders),
            ("retries", self.retries),
            ("merged", self.merged),
            ("dead_letter", self.dead_letter),
        ];
        for (name, capacity) in queues {
            if capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} queue capacity must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// Pipeline configuration
///
/// # Example
///
/// ```
/// use conveyor_pipeline::{PipelineConfig, QueueCapacities};
/// use std::time::Duration;
///
/// let config = PipelineConfig::default()
///     .with_item_count(50)
///     .with_capacities(QueueCapacities::uniform(5))
///     .with_max_retries(3)
///     .with_worker_timeout(Duration::from_millis(250));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Number of items the producer generates
    pub item_count: u64,

    /// Queue capacities
    pub capacities: QueueCapacities,

    /// Retries allowed per item before it is dead-lettered
    pub max_retries: u32,

    /// Processing deadline per item
    #[serde(with = "duration_millis")]
    pub worker_timeout: Duration,

    /// Simulated delivery failure rate, out of 10
    pub failure_rate: u8,

    /// Producer backoff under backpressure
    pub backoff: BackoffPolicy,

    /// Router inactivity window before it re-evaluates shutdown
    #[serde(with = "duration_millis")]
    pub idle_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            item_count: 20,
            capacities: QueueCapacities::default(),
            max_retries: 2,
            worker_timeout: Duration::from_millis(500),
            failure_rate: 2,
            backoff: BackoffPolicy::default(),
            idle_timeout: Duration::from_secs(1),
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables (all optional, defaults otherwise):
    /// - `CONVEYOR_ITEM_COUNT`
    /// - `CONVEYOR_QUEUE_CAPACITY`: applied to all four queues, then
    ///   overridden by `CONVEYOR_ORDERS_CAPACITY`, `CONVEYOR_RETRIES_CAPACITY`,
    ///   `CONVEYOR_MERGED_CAPACITY`, `CONVEYOR_DEAD_LETTER_CAPACITY`
    /// - `CONVEYOR_MAX_RETRIES`
    /// - `CONVEYOR_WORKER_TIMEOUT_MS`
    /// - `CONVEYOR_FAILURE_RATE`
    /// - `CONVEYOR_IDLE_TIMEOUT_MS`
    /// - `CONVEYOR_BACKOFF_BASE_MS`, `CONVEYOR_BACKOFF_MULTIPLIER`,
    ///   `CONVEYOR_BACKOFF_CAP_MS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, "CONVEYOR_ITEM_COUNT")? {
            config.item_count = v;
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_QUEUE_CAPACITY")? {
            config.capacities = QueueCapacities::uniform(v);
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_ORDERS_CAPACITY")? {
            config.capacities.orders = v;
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_RETRIES_CAPACITY")? {
            config.capacities.retries = v;
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_MERGED_CAPACITY")? {
            config.capacities.merged = v;
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_DEAD_LETTER_CAPACITY")? {
            config.capacities.dead_letter = v;
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_MAX_RETRIES")? {
            config.max_retries = v;
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_WORKER_TIMEOUT_MS")? {
            config.worker_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_FAILURE_RATE")? {
            config.failure_rate = v;
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_IDLE_TIMEOUT_MS")? {
            config.idle_timeout = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_BACKOFF_BASE_MS")? {
            config.backoff.base = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_BACKOFF_MULTIPLIER")? {
            config.backoff.multiplier = v;
        }
        if let Some(v) = parse_var(&lookup, "CONVEYOR_BACKOFF_CAP_MS")? {
            config.backoff.cap = Duration::from_millis(v);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the number of items to produce
    pub fn with_item_count(mut self, count: u64) -> Self {
        self.item_count = count;
        self
    }

    /// Set the queue capacities
    pub fn with_capacities(mut self, capacities: QueueCapacities) -> Self {
        self.capacities = capacities;
        self
    }

    /// Set the retry limit
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the processing deadline
    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Set the simulated failure rate (out of 10)
    pub fn with_failure_rate(mut self, rate: u8) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Set the producer backoff policy
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Set the router idle window
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.capacities.validate()?;
        self.backoff.validate()?;

        if self.failure_rate > MAX_FAILURE_RATE {
            return Err(ConfigError::Invalid(format!(
                "failure_rate must be within 0-{MAX_FAILURE_RATE}, got {}",
                self.failure_rate
            )));
        }
        if self.worker_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "worker_timeout must be greater than zero".into(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "idle_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.item_count, 20);
        assert_eq!(config.capacities, QueueCapacities::uniform(10));
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.worker_timeout, Duration::from_millis(500));
        assert_eq!(config.failure_rate, 2);
        assert_eq!(config.idle_timeout, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = PipelineConfig::new()
            .with_item_count(3)
            .with_capacities(QueueCapacities::uniform(1))
            .with_max_retries(0)
            .with_worker_timeout(Duration::from_millis(10))
            .with_failure_rate(10)
            .with_idle_timeout(Duration::from_millis(20));

        assert_eq!(config.item_count, 3);
        assert_eq!(config.capacities.dead_letter, 1);
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.failure_rate, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = PipelineConfig::new().with_capacities(QueueCapacities {
            merged: 0,
            ..QueueCapacities::default()
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("merged"));
    }

    #[test]
    fn test_rejects_failure_rate_above_ten() {
        assert!(PipelineConfig::new()
            .with_failure_rate(11)
            .validate()
            .is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        assert!(PipelineConfig::new()
            .with_worker_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(PipelineConfig::new()
            .with_idle_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_lookup_empty_uses_defaults() {
        let config = PipelineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = PipelineConfig::from_lookup(lookup(&[
            ("CONVEYOR_ITEM_COUNT", "5"),
            ("CONVEYOR_QUEUE_CAPACITY", "3"),
            ("CONVEYOR_DEAD_LETTER_CAPACITY", "7"),
            ("CONVEYOR_MAX_RETRIES", "4"),
            ("CONVEYOR_WORKER_TIMEOUT_MS", "250"),
            ("CONVEYOR_FAILURE_RATE", "0"),
            ("CONVEYOR_BACKOFF_MULTIPLIER", "1.5"),
        ]))
        .unwrap();

        assert_eq!(config.item_count, 5);
        assert_eq!(config.capacities.orders, 3);
        assert_eq!(config.capacities.dead_letter, 7);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.worker_timeout, Duration::from_millis(250));
        assert_eq!(config.failure_rate, 0);
        assert_eq!(config.backoff.multiplier, 1.5);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = PipelineConfig::from_lookup(lookup(&[("CONVEYOR_MAX_RETRIES", "lots")]))
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Env {
                name: "CONVEYOR_MAX_RETRIES".into(),
                value: "lots".into(),
            }
        );
    }

    #[test]
    fn test_serialization() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"worker_timeout\":500"));
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}
