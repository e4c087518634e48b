//! Exponential backoff for enqueue retries

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::duration_millis;
use crate::error::ConfigError;

/// Backoff applied by the producer when the orders queue is full
///
/// The delay for a given number of previous attempts is
/// `min(base * multiplier^attempts, cap)`, then scaled by a symmetric jitter
/// factor drawn from `[-jitter, +jitter]`.
///
/// # Example
///
/// ```
/// use conveyor_pipeline::BackoffPolicy;
/// use std::time::Duration;
///
/// let policy = BackoffPolicy::default()
///     .with_base(Duration::from_millis(50))
///     .with_cap(Duration::from_secs(1));
///
/// assert_eq!(policy.delay_for(0), Duration::from_millis(50));
/// assert_eq!(policy.delay_for(1), Duration::from_millis(100));
/// assert_eq!(policy.delay_for(10), Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    #[serde(with = "duration_millis")]
    pub base: Duration,

    /// Growth factor per attempt
    pub multiplier: f64,

    /// Upper bound on the un-jittered delay
    #[serde(with = "duration_millis")]
    pub cap: Duration,

    /// Jitter ratio (0.0-1.0); 0.2 means ±20%
    pub jitter: f64,
}

impl Default for BackoffPolicy {
    /// - 50ms base
    /// - 2x multiplier
    /// - 1 second cap
    /// - ±20% jitter
    fn default() -> Self {
        Self {
            base: Duration::from_millis(50),
            multiplier: 2.0,
            cap: Duration::from_secs(1),
            jitter: 0.2,
        }
    }
}

impl BackoffPolicy {
    /// Set the base delay
    pub fn with_base(mut self, base: Duration) -> Self {
        self.base = base;
        self
    }

    /// Set the growth factor
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Set the delay cap
    pub fn with_cap(mut self, cap: Duration) -> Self {
        self.cap = cap;
        self
    }

    /// Set the jitter ratio (clamped to 0.0-1.0)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Un-jittered delay after `attempts` previous attempts
    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = i32::try_from(attempts).unwrap_or(i32::MAX);
        let raw = self.base.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.cap.as_secs_f64());
        if capped.is_finite() {
            Duration::from_secs_f64(capped.max(0.0))
        } else {
            self.cap
        }
    }

    /// Apply a jitter sample to a delay
    ///
    /// `sample` is expected in `[-1.0, 1.0]` and is scaled by the policy's
    /// jitter ratio, so `0.0` returns the delay unchanged.
    pub fn jittered(&self, delay: Duration, sample: f64) -> Duration {
        let factor = 1.0 + sample.clamp(-1.0, 1.0) * self.jitter;
        Duration::from_secs_f64((delay.as_secs_f64() * factor).max(0.0))
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.base > self.cap {
            return Err(ConfigError::Invalid(
                "backoff base must not exceed the cap".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(ConfigError::Invalid(format!(
                "backoff jitter must be within 0.0-1.0, got {}",
                self.jitter
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.base, Duration::from_millis(50));
        assert_eq!(policy.multiplier, 2.0);
        assert_eq!(policy.cap, Duration::from_secs(1));
        assert_eq!(policy.jitter, 0.2);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_exponential_growth() {
        let policy = BackoffPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(50));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_cap() {
        let policy = BackoffPolicy::default().with_cap(Duration::from_millis(300));
        assert_eq!(policy.delay_for(3), Duration::from_millis(300));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(300));
    }

    fn assert_close(actual: Duration, expected: Duration) {
        let diff = if actual > expected {
            actual - expected
        } else {
            expected - actual
        };
        assert!(
            diff < Duration::from_micros(1),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = BackoffPolicy::default();
        let delay = Duration::from_millis(100);

        assert_eq!(policy.jittered(delay, 0.0), delay);
        assert_close(policy.jittered(delay, 1.0), Duration::from_millis(120));
        assert_close(policy.jittered(delay, -1.0), Duration::from_millis(80));
        // Samples outside [-1, 1] are clamped
        assert_close(policy.jittered(delay, 5.0), Duration::from_millis(120));
    }

    #[test]
    fn test_no_jitter() {
        let policy = BackoffPolicy::default().with_jitter(0.0);
        let delay = Duration::from_millis(100);
        assert_eq!(policy.jittered(delay, 1.0), delay);
    }

    #[test]
    fn test_validation() {
        assert!(BackoffPolicy::default()
            .with_multiplier(0.5)
            .validate()
            .is_err());
        assert!(BackoffPolicy::default()
            .with_base(Duration::from_secs(2))
            .validate()
            .is_err());
        assert!(BackoffPolicy::default()
            .with_multiplier(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_serialization() {
        let policy = BackoffPolicy::default().with_multiplier(3.0);
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"base\":50"));
        let parsed: BackoffPolicy = serde_json::from_str(&json).unwrap();
        assert_eq!(policy, parsed);
    }
}
