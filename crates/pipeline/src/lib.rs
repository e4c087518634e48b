//! # Conveyor Pipeline
//!
//! An in-process work pipeline built from bounded queues and four concurrent
//! stages.
//!
//! ## Features
//!
//! - **Backpressure**: the producer answers a full orders queue with capped
//!   exponential backoff and jitter
//! - **Timeout racing**: the worker races each item's processing against a
//!   fixed deadline
//! - **Bounded retries**: a shared tracker keyed by normalized item identity
//!   caps how often an item is attempted
//! - **Dead letters**: items past their limit are drained to a pluggable sink
//! - **Structured events**: every outcome is emitted as a [`PipelineEvent`]
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐ orders ┌──────────┐ merged ┌──────────┐
//! │ Producer │───────▶│  Router  │───────▶│  Worker  │──▶ delivered
//! └──────────┘        └──────────┘        └──────────┘
//!                       ▲      │               │
//!                       │      │ dead_letter   │ retries
//!                       │      ▼               │
//!                       │  ┌──────────────┐    │
//!                       │  │ Dead letters │    │
//!                       │  └──────────────┘    │
//!                       └──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use conveyor_pipeline::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let config = PipelineConfig::default()
//!     .with_item_count(5)
//!     .with_max_retries(2)
//!     .with_worker_timeout(Duration::from_millis(200));
//!
//! let sink = Arc::new(MemoryDeadLetterSink::new());
//! let report = Pipeline::new(config)?
//!     .with_timing(Arc::new(FixedTiming::default()))
//!     .with_dead_letter_sink(sink.clone())
//!     .run()
//!     .await?;
//!
//! assert_eq!(report.stats.delivered, 5);
//! assert!(sink.is_empty());
//! # Ok::<(), PipelineError>(())
//! # }).unwrap();
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod item;
pub mod pipeline;
pub mod queue;
pub mod reliability;
pub mod stages;
pub mod timing;
pub mod tracker;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{PipelineConfig, QueueCapacities};
    pub use crate::error::{ConfigError, PipelineError};
    pub use crate::events::{Outcome, PipelineEvent, RetryReason, Stage};
    pub use crate::item::WorkItem;
    pub use crate::pipeline::{Pipeline, PipelineReport};
    pub use crate::reliability::BackoffPolicy;
    pub use crate::stages::{DeadLetterSink, LoggingDeadLetterSink, MemoryDeadLetterSink};
    pub use crate::timing::{FixedTiming, RandomTiming, Timing};
    pub use crate::tracker::RetryTracker;
}

// Re-export key types at crate root
pub use config::{PipelineConfig, QueueCapacities};
pub use error::{ConfigError, PipelineError, Result};
pub use events::{EventEmitter, Outcome, PipelineEvent, RetryReason, Stage, StatsSnapshot};
pub use item::{normalize, WorkItem};
pub use pipeline::{Pipeline, PipelineReport};
pub use queue::{bounded, Offer, QueueReceiver, QueueSender};
pub use reliability::{race_timeout, BackoffPolicy, RaceOutcome};
pub use stages::{DeadLetterSink, LoggingDeadLetterSink, MemoryDeadLetterSink};
pub use timing::{FixedTiming, RandomTiming, Timing};
pub use tracker::RetryTracker;
