//! In-flight gauge between the router and the worker
//!
//! Counts items the router has forwarded to the merged queue that the worker
//! has not yet settled (delivered, resubmitted, dropped or abandoned). The
//! router uses it together with the retries queue occupancy to decide that no
//! further retries can appear.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Items handed to the worker and not yet settled
///
/// Uses `SeqCst` so that a worker's retry submission followed by
/// [`settled`](InFlight::settled) is never observed in the opposite order by
/// the router.
#[derive(Debug, Default)]
pub struct InFlight {
    count: AtomicUsize,
    changed: Notify,
}

impl InFlight {
    /// Create an idle gauge
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an item is about to be handed to the worker
    pub fn started(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    /// Record that the worker is done with an item
    pub fn settled(&self) {
        let previous = self
            .count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        debug_assert!(previous.is_ok(), "settled() without matching started()");
        self.changed.notify_one();
    }

    /// Number of unsettled items
    pub fn current(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Whether every forwarded item has been settled
    pub fn is_idle(&self) -> bool {
        self.current() == 0
    }

    /// Wait until the next [`settled`](InFlight::settled) call
    ///
    /// A settle that happened while nobody was waiting is remembered, so
    /// the next call returns immediately.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}
