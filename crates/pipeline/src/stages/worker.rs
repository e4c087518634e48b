//! Worker stage
//!
//! Consumes the merged queue until it is closed and drained. Each item's
//! simulated processing races a fixed deadline; timeouts and failed
//! deliveries are resubmitted to the retries queue without blocking.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, instrument};

use super::{InFlight, StageContext};
use crate::events::{RetryReason, Stage};
use crate::item::WorkItem;
use crate::queue::{Offer, QueueReceiver, QueueSender};
use crate::reliability::{race_timeout, RaceOutcome};

/// Counts reported by the worker when it finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerSummary {
    /// Items whose processing was attempted
    pub processed: u64,
    /// Items delivered
    pub delivered: u64,
    /// Items placed on the retries queue
    pub resubmitted: u64,
    /// Items whose processing lost the race against the deadline
    pub timed_out: u64,
    /// Retries discarded because the retries queue was full or closed
    pub dropped: u64,
    /// Items received after their retry budget was already spent
    pub abandoned: u64,
}

/// Processes merged items one at a time
pub struct Worker {
    ctx: StageContext,
    in_flight: Arc<InFlight>,
    timeout: Duration,
    failure_rate: u8,
}

impl Worker {
    /// Create a worker with a processing deadline and a failure rate out of 10
    pub fn new(
        ctx: StageContext,
        in_flight: Arc<InFlight>,
        timeout: Duration,
        failure_rate: u8,
    ) -> Self {
        Self {
            ctx,
            in_flight,
            timeout,
            failure_rate,
        }
    }

    /// Process items until the merged queue is closed, then close retries
    #[instrument(skip_all, fields(stage = %Stage::Worker))]
    pub async fn run(
        &self,
        mut merged: QueueReceiver<WorkItem>,
        retries: QueueSender<WorkItem>,
    ) -> WorkerSummary {
        let mut summary = WorkerSummary::default();

        while let Some(item) = merged.recv().await {
            self.handle(item, &retries, &mut summary).await;
            self.in_flight.settled();
        }

        retries.close();
        info!(
            processed = summary.processed,
            delivered = summary.delivered,
            resubmitted = summary.resubmitted,
            dropped = summary.dropped,
            "Worker finished"
        );
        summary
    }

    async fn handle(
        &self,
        item: WorkItem,
        retries: &QueueSender<WorkItem>,
        summary: &mut WorkerSummary,
    ) {
        let ctx = &self.ctx;
        if !ctx.tracker.should_process(&item) {
            summary.abandoned += 1;
            let attempts = ctx.tracker.count(&item);
            ctx.events
                .abandoned(item.label(), item.key(), Stage::Worker, attempts);
            return;
        }

        summary.processed += 1;
        let processing = ctx.timing.processing_time(&item);
        debug!(item = %item, ?processing, timeout = ?self.timeout, "Processing item");

        match race_timeout(self.timeout, sleep(processing)).await {
            RaceOutcome::Completed(()) => {
                if ctx.timing.delivery_fails(&item, self.failure_rate) {
                    self.resubmit(item, RetryReason::DeliveryFailed, retries, summary);
                } else {
                    summary.delivered += 1;
                    ctx.events.delivered(item.label(), item.key());
                }
            }
            RaceOutcome::TimedOut { limit } => {
                summary.timed_out += 1;
                debug!(item = %item, ?limit, "Processing timed out");
                self.resubmit(item, RetryReason::Timeout, retries, summary);
            }
        }
    }

    fn resubmit(
        &self,
        item: WorkItem,
        reason: RetryReason,
        retries: &QueueSender<WorkItem>,
        summary: &mut WorkerSummary,
    ) {
        let attempt = self.ctx.tracker.increment(&item);
        let retry = item.retry(attempt);
        let (label, key) = (retry.label(), retry.key());

        match retries.offer(retry) {
            // Past the limit the router dead-letters it; that is not a retry
            Offer::Accepted => {
                summary.resubmitted += 1;
                if self.ctx.tracker.should_process(&item) {
                    self.ctx.events.retried(label, key, attempt, reason);
                }
            }
            Offer::Full(_) | Offer::Closed(_) => {
                summary.dropped += 1;
                self.ctx.events.dropped(label, key, Stage::Worker);
            }
        }
    }
}
