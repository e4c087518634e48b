//! Pipeline orchestration
//!
//! Wires the four stages to one tracker and four bounded queues, runs them as
//! independent tokio tasks and collects a [`PipelineReport`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::events::{EventEmitter, Outcome, PipelineEvent, Stage, StatsSnapshot};
use crate::item::WorkItem;
use crate::queue::bounded;
use crate::stages::{
    DeadLetterDrain, DeadLetterSink, InFlight, LoggingDeadLetterSink, Producer, ProducerSummary,
    Router, RouterSummary, StageContext, Worker, WorkerSummary,
};
use crate::timing::{RandomTiming, Timing};
use crate::tracker::RetryTracker;

/// A configured pipeline, ready to run once
///
/// # Example
///
/// ```
/// use conveyor_pipeline::{FixedTiming, Pipeline, PipelineConfig};
/// use std::sync::Arc;
///
/// # tokio_test::block_on(async {
/// let config = PipelineConfig::default().with_item_count(3);
/// let report = Pipeline::new(config)?
///     .with_timing(Arc::new(FixedTiming::default()))
///     .run()
///     .await?;
///
/// assert_eq!(report.stats.delivered, 3);
/// # Ok::<(), conveyor_pipeline::PipelineError>(())
/// # }).unwrap();
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    timing: Arc<dyn Timing>,
    sink: Arc<dyn DeadLetterSink>,
    events: EventEmitter,
}

impl Pipeline {
    /// Create a pipeline from a validated configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            timing: Arc::new(RandomTiming::new()),
            sink: Arc::new(LoggingDeadLetterSink),
            events: EventEmitter::new(),
        })
    }

    /// Replace the timing source
    pub fn with_timing(mut self, timing: Arc<dyn Timing>) -> Self {
        self.timing = timing;
        self
    }

    /// Replace the dead-letter sink
    pub fn with_dead_letter_sink(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Receive every event of the run
    ///
    /// The stream ends when [`run`](Pipeline::run) returns.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Configuration this pipeline runs with
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run all stages to completion
    ///
    /// The dead-letter queue is closed only after the router has returned,
    /// since the router is its only writer.
    pub async fn run(self) -> Result<PipelineReport> {
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();
        let start = Instant::now();
        let span = info_span!("pipeline", %run_id);
        let config = &self.config;

        info!(
            parent: &span,
            items = config.item_count,
            max_retries = config.max_retries,
            failure_rate = config.failure_rate,
            "Pipeline starting"
        );

        let tracker = Arc::new(RetryTracker::new(config.max_retries));
        let in_flight = Arc::new(InFlight::new());
        let ctx = StageContext::new(tracker.clone(), self.timing.clone(), self.events.clone());

        let caps = &config.capacities;
        let (orders_tx, orders_rx) = bounded::<WorkItem>("orders", caps.orders);
        let (retries_tx, retries_rx) = bounded::<WorkItem>("retries", caps.retries);
        let (merged_tx, merged_rx) = bounded::<WorkItem>("merged", caps.merged);
        let (dead_tx, dead_rx) = bounded::<WorkItem>("dead_letter", caps.dead_letter);

        let producer = Producer::new(ctx.clone(), config.item_count, config.backoff.clone());
        let router = Router::new(ctx.clone(), in_flight.clone(), config.idle_timeout);
        let worker = Worker::new(
            ctx,
            in_flight,
            config.worker_timeout,
            config.failure_rate,
        );
        let drain = DeadLetterDrain::new(self.sink.clone());

        let producer_task = tokio::spawn(
            async move { producer.run(orders_tx).await }.instrument(span.clone()),
        );
        let router_task = tokio::spawn(
            async move {
                let summary = router
                    .run(orders_rx, retries_rx, merged_tx, &dead_tx)
                    .await;
                dead_tx.close();
                summary
            }
            .instrument(span.clone()),
        );
        let worker_task = tokio::spawn(
            async move { worker.run(merged_rx, retries_tx).await }.instrument(span.clone()),
        );
        let drain_task =
            tokio::spawn(async move { drain.run(dead_rx).await }.instrument(span.clone()));

        let (producer, router, worker, dead_letters) =
            tokio::join!(producer_task, router_task, worker_task, drain_task);
        self.events.close();

        let producer = joined(Stage::Producer, producer)?;
        let router = joined(Stage::Router, router)?;
        let worker = joined(Stage::Worker, worker)?;
        let dead_letters = joined(Stage::DeadLetter, dead_letters)?;

        let outcomes = self.events.outcomes();
        let delivered = outcomes
            .iter()
            .filter(|(_, outcome)| **outcome == Outcome::Delivered)
            .map(|(key, _)| key.clone())
            .collect();

        let report = PipelineReport {
            run_id,
            started_at,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            config: self.config.clone(),
            stats: self.events.stats(),
            producer,
            router,
            worker,
            delivered,
            dead_letters,
            outcomes,
            attempts: tracker.snapshot(),
        };

        info!(
            parent: &span,
            delivered = report.stats.delivered,
            dead = report.stats.dead,
            dropped = report.stats.dropped,
            abandoned = report.stats.abandoned,
            elapsed_ms = report.elapsed_ms,
            "Pipeline finished"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

fn joined<T>(stage: Stage, result: std::result::Result<T, tokio::task::JoinError>) -> Result<T> {
    result.map_err(|source| PipelineError::TaskJoin { stage, source })
}

/// Summary of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Unique run id
    pub run_id: Uuid,
    /// Wall-clock start time
    pub started_at: DateTime<Utc>,
    /// Run duration in milliseconds
    pub elapsed_ms: u64,
    /// Configuration used
    pub config: PipelineConfig,
    /// Event counters
    pub stats: StatsSnapshot,
    /// Producer counts
    pub producer: ProducerSummary,
    /// Router counts
    pub router: RouterSummary,
    /// Worker counts
    pub worker: WorkerSummary,
    /// Keys of delivered items, sorted
    pub delivered: Vec<String>,
    /// Labels recorded by the dead-letter sink, in arrival order
    pub dead_letters: Vec<String>,
    /// Terminal outcome per key
    pub outcomes: BTreeMap<String, Outcome>,
    /// Final attempt count per key that was ever retried
    pub attempts: BTreeMap<String, u32>,
}

impl PipelineReport {
    /// Keys that ended with the given outcome
    pub fn keys_with(&self, outcome: Outcome) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| **o == outcome)
            .map(|(key, _)| key.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::QueueCapacities;
    use crate::error::ConfigError;
    use crate::stages::MemoryDeadLetterSink;
    use crate::timing::FixedTiming;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = PipelineConfig::default().with_capacities(QueueCapacities::uniform(0));
        let err = Pipeline::new(config).unwrap_err();
        assert!(matches!(err, PipelineError::Config(ConfigError::Invalid(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reports_per_stage_counts() {
        let sink = Arc::new(MemoryDeadLetterSink::new());
        let config = PipelineConfig::default()
            .with_item_count(4)
            .with_max_retries(1)
            .with_worker_timeout(Duration::from_millis(50))
            .with_idle_timeout(Duration::from_millis(20));
        let timing = FixedTiming::default().with_failing_attempts(1);

        let report = Pipeline::new(config)
            .unwrap()
            .with_timing(Arc::new(timing))
            .with_dead_letter_sink(sink.clone())
            .run()
            .await
            .unwrap();

        // Every first attempt fails delivery, every retry succeeds
        assert_eq!(report.producer.enqueued, 4);
        assert_eq!(report.worker.processed, 8);
        assert_eq!(report.worker.resubmitted, 4);
        assert_eq!(report.router.retries_forwarded, 4);
        assert_eq!(report.stats.delivered, 4);
        assert_eq!(report.delivered.len(), 4);
        assert!(report.dead_letters.is_empty());
        assert!(sink.is_empty());
        assert_eq!(report.attempts.get("Item #2"), Some(&1));
        assert_eq!(report.keys_with(Outcome::Delivered).len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriber_stream_ends_with_run() {
        let config = PipelineConfig::default().with_item_count(2);
        let pipeline = Pipeline::new(config)
            .unwrap()
            .with_timing(Arc::new(FixedTiming::default()));
        let mut events = pipeline.subscribe();

        pipeline.run().await.unwrap();

        let mut types = Vec::new();
        while let Some(event) = events.recv().await {
            types.push(event.event_type());
        }
        assert_eq!(types.iter().filter(|t| **t == "enqueued").count(), 2);
        assert_eq!(types.iter().filter(|t| **t == "delivered").count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_serializes() {
        let report = Pipeline::new(PipelineConfig::default().with_item_count(1))
            .unwrap()
            .with_timing(Arc::new(FixedTiming::default()))
            .run()
            .await
            .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["stats"]["delivered"], 1);
        assert_eq!(json["outcomes"]["Item #1"], "delivered");
        assert_eq!(json["config"]["item_count"], 1);
    }
}
