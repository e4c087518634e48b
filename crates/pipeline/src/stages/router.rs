//! Router stage
//!
//! Fans in new orders and worker retries onto the merged queue and sends
//! items past their retry limit to the dead-letter queue.
//!
//! The router stays active while the orders queue is open or the pipeline is
//! not quiescent. Quiescent means the worker holds nothing unsettled and the
//! retries queue is empty (or the worker has gone away). Once both hold the
//! router closes the merged queue, which lets the worker drain and exit.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{debug, info, instrument, trace, warn};

use super::{InFlight, StageContext};
use crate::events::Stage;
use crate::item::WorkItem;
use crate::queue::{Offer, QueueReceiver, QueueSender};

/// Counts reported by the router when it finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RouterSummary {
    /// New items forwarded from the orders queue
    pub orders_forwarded: u64,
    /// Retries forwarded back to the worker
    pub retries_forwarded: u64,
    /// Items placed on the dead-letter queue
    pub dead_lettered: u64,
    /// Items discarded because the dead-letter or merged queue was unavailable
    pub dropped: u64,
}

/// Fan-in of orders and retries
pub struct Router {
    ctx: StageContext,
    in_flight: Arc<InFlight>,
    idle_timeout: Duration,
}

impl Router {
    /// Create a router with the given inactivity window
    pub fn new(ctx: StageContext, in_flight: Arc<InFlight>, idle_timeout: Duration) -> Self {
        Self {
            ctx,
            in_flight,
            idle_timeout,
        }
    }

    /// Route until orders are closed and the pipeline is quiescent
    ///
    /// Closes the merged queue on return. The dead-letter queue is borrowed
    /// and left open; its owner closes it once this future has completed.
    #[instrument(skip_all, fields(stage = %Stage::Router))]
    pub async fn run(
        &self,
        mut orders: QueueReceiver<WorkItem>,
        mut retries: QueueReceiver<WorkItem>,
        merged: QueueSender<WorkItem>,
        dead_letter: &QueueSender<WorkItem>,
    ) -> RouterSummary {
        let mut summary = RouterSummary::default();
        let mut orders_open = true;
        let mut worker_gone = false;

        loop {
            if !orders_open && self.quiescent(&retries, worker_gone) {
                break;
            }

            tokio::select! {
                received = orders.recv(), if orders_open => match received {
                    Some(item) => {
                        if self.forward(item, &merged, &mut summary).await {
                            summary.orders_forwarded += 1;
                        }
                    }
                    None => {
                        debug!(queue = orders.name(), "Orders queue closed");
                        orders_open = false;
                    }
                },
                received = retries.recv(), if !worker_gone => match received {
                    Some(item) => self.route_retry(item, &merged, dead_letter, &mut summary).await,
                    None => {
                        debug!(queue = retries.name(), "Retries queue closed");
                        worker_gone = true;
                    }
                },
                _ = self.in_flight.changed(), if !orders_open => {
                    trace!(in_flight = self.in_flight.current(), "Worker settled an item");
                }
                _ = sleep(self.idle_timeout) => {
                    if !orders_open && self.quiescent(&retries, worker_gone) {
                        debug!(idle = ?self.idle_timeout, "Router idle, shutting down");
                        break;
                    }
                    trace!(
                        orders_open,
                        in_flight = self.in_flight.current(),
                        retries = retries.len(),
                        "Router idle"
                    );
                }
            }
        }

        merged.close();
        info!(
            orders = summary.orders_forwarded,
            retries = summary.retries_forwarded,
            dead_lettered = summary.dead_lettered,
            dropped = summary.dropped,
            "Router finished"
        );
        summary
    }

    /// No retry can appear any more
    ///
    /// The gauge is read before the queue: the worker offers a retry before
    /// it settles the item, so an idle gauge guarantees the offer is visible.
    fn quiescent(&self, retries: &QueueReceiver<WorkItem>, worker_gone: bool) -> bool {
        worker_gone || (self.in_flight.is_idle() && retries.is_empty())
    }

    /// Blocking enqueue onto merged; returns whether the worker got the item
    async fn forward(
        &self,
        item: WorkItem,
        merged: &QueueSender<WorkItem>,
        summary: &mut RouterSummary,
    ) -> bool {
        self.in_flight.started();
        match merged.send(item).await {
            Ok(()) => true,
            Err(closed) => {
                self.in_flight.settled();
                summary.dropped += 1;
                warn!(queue = closed.queue, item = %closed.value, "Worker gone, item discarded");
                self.ctx
                    .events
                    .dropped(closed.value.label(), closed.value.key(), Stage::Router);
                false
            }
        }
    }

    async fn route_retry(
        &self,
        item: WorkItem,
        merged: &QueueSender<WorkItem>,
        dead_letter: &QueueSender<WorkItem>,
        summary: &mut RouterSummary,
    ) {
        if self.ctx.tracker.should_process(&item) {
            if self.forward(item, merged, summary).await {
                summary.retries_forwarded += 1;
            }
            return;
        }

        let attempts = self.ctx.tracker.count(&item);
        let (label, key) = (item.label(), item.key());
        match dead_letter.offer(item) {
            Offer::Accepted => {
                summary.dead_lettered += 1;
                self.ctx.events.dead(label, key, attempts);
            }
            Offer::Full(_) | Offer::Closed(_) => {
                summary.dropped += 1;
                self.ctx.events.dropped(label, key, Stage::Router);
            }
        }
    }
}
