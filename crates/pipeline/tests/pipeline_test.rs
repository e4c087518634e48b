//! End-to-end tests for the pipeline
//!
//! Most tests run on a paused clock so timeouts and backoff delays resolve
//! instantly and deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use conveyor_pipeline::prelude::*;
use tokio::sync::mpsc::UnboundedReceiver;

async fn collect(mut events: UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        collected.push(event);
    }
    collected
}

fn assert_every_item_accounted(report: &PipelineReport, item_count: u64) {
    let stats = report.stats;
    assert_eq!(
        stats.delivered + stats.dead + stats.dropped + stats.abandoned,
        item_count,
        "each item ends in exactly one terminal outcome: {stats:?}"
    );
    assert_eq!(report.outcomes.len() as u64, item_count);
    for id in 1..=item_count {
        assert!(
            report.outcomes.contains_key(&format!("Item #{id}")),
            "Item #{id} has no outcome"
        );
    }
}

#[test_log::test(tokio::test(start_paused = true))]
async fn test_always_timing_out_item_is_dead_lettered() {
    let config = PipelineConfig::default()
        .with_item_count(1)
        .with_max_retries(2)
        .with_worker_timeout(Duration::from_millis(50))
        .with_idle_timeout(Duration::from_millis(20));
    let timing = FixedTiming::default().with_processing(Duration::from_secs(1));
    let sink = Arc::new(MemoryDeadLetterSink::new());

    let pipeline = Pipeline::new(config)
        .unwrap()
        .with_timing(Arc::new(timing))
        .with_dead_letter_sink(sink.clone());
    let events = pipeline.subscribe();

    let report = pipeline.run().await.unwrap();
    let events = collect(events).await;

    let retries: Vec<(String, u32, RetryReason)> = events
        .iter()
        .filter_map(|event| match event {
            PipelineEvent::Retried {
                label,
                attempt,
                reason,
                ..
            } => Some((label.clone(), *attempt, *reason)),
            _ => None,
        })
        .collect();
    assert_eq!(
        retries,
        vec![
            ("Item #1 (retry 1)".to_string(), 1, RetryReason::Timeout),
            ("Item #1 (retry 2)".to_string(), 2, RetryReason::Timeout),
        ]
    );
    assert_eq!(report.stats.retried, 2);

    assert_eq!(sink.len(), 1);
    assert_eq!(sink.labels(), vec!["Item #1 (retry 3)".to_string()]);
    assert_eq!(report.dead_letters, sink.labels());
    assert_eq!(report.stats.dead, 1);
    assert_eq!(report.stats.delivered, 0);
    assert!(report.delivered.is_empty());
    assert_eq!(report.worker.processed, 3);
    assert_eq!(report.worker.timed_out, 3);
    assert_eq!(report.attempts["Item #1"], 3);
    assert_eq!(report.outcomes["Item #1"], Outcome::Dead);
}

#[tokio::test(start_paused = true)]
async fn test_roomy_queues_deliver_everything_once() {
    let item_count = 10;
    let config = PipelineConfig::default()
        .with_item_count(item_count)
        .with_capacities(QueueCapacities::uniform(10))
        .with_worker_timeout(Duration::from_millis(100));
    let timing = FixedTiming::default()
        .with_think(Duration::from_millis(1))
        .with_processing(Duration::from_millis(10));
    let sink = Arc::new(MemoryDeadLetterSink::new());

    let pipeline = Pipeline::new(config)
        .unwrap()
        .with_timing(Arc::new(timing))
        .with_dead_letter_sink(sink.clone());
    let events = pipeline.subscribe();

    let report = pipeline.run().await.unwrap();
    let events = collect(events).await;

    let mut deliveries: HashMap<&str, usize> = HashMap::new();
    for event in &events {
        if let PipelineEvent::Delivered { key, .. } = event {
            *deliveries.entry(key.as_str()).or_default() += 1;
        }
    }
    assert_eq!(deliveries.len(), item_count as usize);
    assert!(deliveries.values().all(|count| *count == 1));

    assert_eq!(report.stats.delivered, item_count);
    assert_eq!(report.stats.retried, 0);
    assert_eq!(report.stats.dead, 0);
    assert_eq!(report.router.retries_forwarded, 0);
    assert_eq!(report.worker.resubmitted, 0);
    assert!(report.attempts.is_empty());
    assert!(sink.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_single_slot_queues_terminate_and_account() {
    let item_count = 25;
    let config = PipelineConfig::default()
        .with_item_count(item_count)
        .with_capacities(QueueCapacities::uniform(1))
        .with_max_retries(2)
        .with_failure_rate(3)
        .with_worker_timeout(Duration::from_millis(50))
        .with_idle_timeout(Duration::from_millis(20));
    let timing = RandomTiming::seeded(1234)
        .with_think_max(Duration::from_millis(5))
        .with_processing_max(Duration::from_millis(100));

    let run = Pipeline::new(config)
        .unwrap()
        .with_timing(Arc::new(timing))
        .with_dead_letter_sink(Arc::new(MemoryDeadLetterSink::new()))
        .run();
    let report = tokio::time::timeout(Duration::from_secs(3600), run)
        .await
        .expect("pipeline must terminate")
        .unwrap();

    assert_every_item_accounted(&report, item_count);
    assert_eq!(
        report.producer.enqueued + report.producer.abandoned,
        item_count
    );
    assert!(report
        .attempts
        .values()
        .all(|count| *count <= report.config.max_retries + 1));
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_sends_first_failure_to_dead_letter() {
    let config = PipelineConfig::default()
        .with_item_count(3)
        .with_max_retries(0)
        .with_worker_timeout(Duration::from_millis(50))
        .with_idle_timeout(Duration::from_millis(20));
    let timing = FixedTiming::default().with_failing_attempts(1);
    let sink = Arc::new(MemoryDeadLetterSink::new());

    let report = Pipeline::new(config)
        .unwrap()
        .with_timing(Arc::new(timing))
        .with_dead_letter_sink(sink.clone())
        .run()
        .await
        .unwrap();

    assert_eq!(sink.len(), 3);
    assert_eq!(report.stats.delivered, 0);
    assert_eq!(report.keys_with(Outcome::Dead).len(), 3);
    assert_every_item_accounted(&report, 3);
}

#[tokio::test(start_paused = true)]
async fn test_orders_reach_worker_in_fifo_order() {
    let config = PipelineConfig::default()
        .with_item_count(8)
        .with_capacities(QueueCapacities::uniform(1))
        .with_worker_timeout(Duration::from_millis(100));
    let timing = FixedTiming::default().with_processing(Duration::from_millis(3));

    let pipeline = Pipeline::new(config)
        .unwrap()
        .with_timing(Arc::new(timing));
    let events = pipeline.subscribe();
    let report = pipeline.run().await.unwrap();

    let delivered: Vec<String> = collect(events)
        .await
        .into_iter()
        .filter(|event| matches!(event, PipelineEvent::Delivered { .. }))
        .map(|event| event.key().to_string())
        .collect();
    let expected: Vec<String> = (1..=8).map(|id| format!("Item #{id}")).collect();

    assert_eq!(report.stats.delivered, 8);
    assert_eq!(delivered, expected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_random_run_on_multi_thread_runtime() {
    let item_count = 30;
    let config = PipelineConfig::default()
        .with_item_count(item_count)
        .with_capacities(QueueCapacities::uniform(2))
        .with_max_retries(3)
        .with_failure_rate(2)
        .with_worker_timeout(Duration::from_millis(8))
        .with_idle_timeout(Duration::from_millis(10))
        .with_backoff(
            BackoffPolicy::default()
                .with_base(Duration::from_millis(1))
                .with_cap(Duration::from_millis(10)),
        );
    let timing = RandomTiming::seeded(7)
        .with_think_max(Duration::from_millis(1))
        .with_processing_max(Duration::from_millis(10));

    let run = Pipeline::new(config)
        .unwrap()
        .with_timing(Arc::new(timing))
        .with_dead_letter_sink(Arc::new(MemoryDeadLetterSink::new()))
        .run();
    let report = tokio::time::timeout(Duration::from_secs(60), run)
        .await
        .expect("pipeline must terminate")
        .unwrap();

    assert_every_item_accounted(&report, item_count);
}

#[test]
fn test_invalid_failure_rate_is_rejected() {
    let config = PipelineConfig::default().with_failure_rate(11);
    let err = Pipeline::new(config).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
    assert!(err.to_string().contains("failure_rate"));
}
