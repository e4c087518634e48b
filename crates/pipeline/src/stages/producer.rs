//! Producer stage
//!
//! Generates `Item #1..=N` onto the orders queue. A full queue is answered
//! with exponential backoff on the same item; every backoff counts against
//! the item's retry budget.

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use super::StageContext;
use crate::events::{RetryReason, Stage};
use crate::item::WorkItem;
use crate::queue::{Offer, QueueSender};
use crate::reliability::BackoffPolicy;

/// Counts reported by the producer when it finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProducerSummary {
    /// Items placed on the orders queue
    pub enqueued: u64,
    /// Items given up on before they were enqueued
    pub abandoned: u64,
    /// Backoff rounds caused by a full orders queue
    pub backoffs: u64,
    /// Items discarded because the orders queue was closed
    pub dropped: u64,
}

/// Generates the item sequence
pub struct Producer {
    ctx: StageContext,
    item_count: u64,
    backoff: BackoffPolicy,
}

impl Producer {
    /// Create a producer for `item_count` items
    pub fn new(ctx: StageContext, item_count: u64, backoff: BackoffPolicy) -> Self {
        Self {
            ctx,
            item_count,
            backoff,
        }
    }

    /// Produce every item, then close the orders queue
    #[instrument(skip_all, fields(stage = %Stage::Producer, items = self.item_count))]
    pub async fn run(&self, orders: QueueSender<WorkItem>) -> ProducerSummary {
        let mut summary = ProducerSummary::default();

        for id in 1..=self.item_count {
            if !self.submit(WorkItem::new(id), &orders, &mut summary).await {
                warn!(queue = orders.name(), "Orders queue closed, stopping producer");
                break;
            }
        }

        orders.close();
        info!(
            enqueued = summary.enqueued,
            abandoned = summary.abandoned,
            backoffs = summary.backoffs,
            dropped = summary.dropped,
            "Producer finished"
        );
        summary
    }

    /// Resolve one item slot; returns `false` if the orders queue is gone
    async fn submit(
        &self,
        mut item: WorkItem,
        orders: &QueueSender<WorkItem>,
        summary: &mut ProducerSummary,
    ) -> bool {
        let ctx = &self.ctx;
        loop {
            if !ctx.tracker.should_process(&item) {
                summary.abandoned += 1;
                let attempts = ctx.tracker.count(&item);
                ctx.events
                    .abandoned(item.label(), item.key(), Stage::Producer, attempts);
                return true;
            }

            let (label, key) = (item.label(), item.key());
            match orders.offer(item) {
                Offer::Accepted => {
                    summary.enqueued += 1;
                    ctx.events.enqueued(label, key);
                    sleep(ctx.timing.think_time()).await;
                    return true;
                }
                Offer::Closed(_) => {
                    summary.dropped += 1;
                    ctx.events.dropped(label, key, Stage::Producer);
                    return false;
                }
                Offer::Full(returned) => item = returned,
            }

            summary.backoffs += 1;
            let attempts = ctx.tracker.count(&item);
            let delay = self
                .backoff
                .jittered(self.backoff.delay_for(attempts), ctx.timing.jitter_sample());
            debug!(item = %item, attempts, ?delay, "Orders queue full, backing off");
            sleep(delay).await;

            let attempt = ctx.tracker.increment(&item);
            if ctx.tracker.should_process(&item) {
                ctx.events
                    .retried(label, key, attempt, RetryReason::Backpressure);
            }
        }
    }
}
