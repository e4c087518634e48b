//! Timing and failure sources for the simulated stages
//!
//! Stages never draw random numbers themselves. Think time, processing time,
//! backoff jitter and simulated delivery failures all come from a [`Timing`]
//! implementation injected at construction. [`RandomTiming`] is the default;
//! [`FixedTiming`] gives deterministic runs.

use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::item::WorkItem;

/// Source of simulated latencies and failures
pub trait Timing: Send + Sync {
    /// Pause after the producer successfully enqueues an item
    fn think_time(&self) -> Duration;

    /// How long processing this item takes
    fn processing_time(&self, item: &WorkItem) -> Duration;

    /// Jitter sample in `[-1.0, 1.0]`
    fn jitter_sample(&self) -> f64;

    /// Whether delivery of a processed item fails, given a rate out of 10
    fn delivery_fails(&self, item: &WorkItem, failure_rate: u8) -> bool;
}

/// Random timings
///
/// - think time: uniform in `[0, think_max)` (default 100ms)
/// - processing time: uniform in `[0, processing_max)` (default 1s)
/// - delivery fails when a roll in `0..10` is below the failure rate
pub struct RandomTiming {
    rng: Mutex<StdRng>,
    think_max: Duration,
    processing_max: Duration,
}

impl Default for RandomTiming {
    fn default() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl RandomTiming {
    /// Random timings seeded from the OS
    pub fn new() -> Self {
        Self::default()
    }

    /// Reproducible random timings
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            think_max: Duration::from_millis(100),
            processing_max: Duration::from_secs(1),
        }
    }

    /// Set the upper bound for producer think time
    pub fn with_think_max(mut self, max: Duration) -> Self {
        self.think_max = max;
        self
    }

    /// Set the upper bound for processing time
    pub fn with_processing_max(mut self, max: Duration) -> Self {
        self.processing_max = max;
        self
    }

    fn uniform(&self, max: Duration) -> Duration {
        let millis = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
        if millis == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(self.rng.lock().gen_range(0..millis))
    }
}

impl Timing for RandomTiming {
    fn think_time(&self) -> Duration {
        self.uniform(self.think_max)
    }

    fn processing_time(&self, _item: &WorkItem) -> Duration {
        self.uniform(self.processing_max)
    }

    fn jitter_sample(&self) -> f64 {
        self.rng.lock().gen_range(-1.0..=1.0)
    }

    fn delivery_fails(&self, _item: &WorkItem, failure_rate: u8) -> bool {
        self.rng.lock().gen_range(0..10u8) < failure_rate
    }
}

/// Deterministic timings
///
/// Delivery fails for items whose retry attempt is below
/// `failing_attempts`, independent of the configured rate. The default
/// never fails and has zero latencies.
///
/// # Example
///
/// ```
/// use conveyor_pipeline::timing::{FixedTiming, Timing};
/// use conveyor_pipeline::WorkItem;
/// use std::time::Duration;
///
/// let timing = FixedTiming::default()
///     .with_processing(Duration::from_millis(10))
///     .with_failing_attempts(1);
///
/// assert!(timing.delivery_fails(&WorkItem::new(1), 0));
/// assert!(!timing.delivery_fails(&WorkItem::new(1).retry(1), 0));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FixedTiming {
    think: Duration,
    processing: Duration,
    jitter: f64,
    failing_attempts: u32,
}

impl FixedTiming {
    /// Set the producer think time
    pub fn with_think(mut self, think: Duration) -> Self {
        self.think = think;
        self
    }

    /// Set the processing time for every item
    pub fn with_processing(mut self, processing: Duration) -> Self {
        self.processing = processing;
        self
    }

    /// Set the jitter sample (clamped to `[-1.0, 1.0]`)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(-1.0, 1.0);
        self
    }

    /// Fail delivery for attempts below `attempts`
    pub fn with_failing_attempts(mut self, attempts: u32) -> Self {
        self.failing_attempts = attempts;
        self
    }
}

impl Timing for FixedTiming {
    fn think_time(&self) -> Duration {
        self.think
    }

    fn processing_time(&self, _item: &WorkItem) -> Duration {
        self.processing
    }

    fn jitter_sample(&self) -> f64 {
        self.jitter
    }

    fn delivery_fails(&self, item: &WorkItem, _failure_rate: u8) -> bool {
        item.attempt() < self.failing_attempts
    }
}
