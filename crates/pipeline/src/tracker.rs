//! Bounded retry tracking
//!
//! The tracker is the only map shared between stages. Access goes through
//! [`RetryTracker::increment`], [`RetryTracker::count`] and
//! [`RetryTracker::should_process`]; the underlying map is never exposed.

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::item::WorkItem;

/// Thread-safe attempt counter keyed by normalized item identity
///
/// Counts start at 0 and only grow. An item is admitted for further
/// processing while `count <= max_retries`; once the count passes the limit
/// it stays terminal for the rest of the run.
///
/// # Example
///
/// ```
/// use conveyor_pipeline::{RetryTracker, WorkItem};
///
/// let tracker = RetryTracker::new(1);
/// let item = WorkItem::new(1);
///
/// assert!(tracker.should_process(&item));
/// tracker.increment(&item);
/// assert!(tracker.should_process(&item.retry(1)));
/// tracker.increment(&item);
/// assert!(!tracker.should_process(&item));
/// ```
#[derive(Debug)]
pub struct RetryTracker {
    counts: Mutex<HashMap<String, u32>>,
    max_retries: u32,
}

impl RetryTracker {
    /// Create a tracker admitting up to `max_retries` retries per item
    pub fn new(max_retries: u32) -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
            max_retries,
        }
    }

    /// Increase the attempt count for the item and return the new count
    pub fn increment(&self, item: &WorkItem) -> u32 {
        let mut counts = self.counts.lock();
        let count = counts.entry(item.key()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Current attempt count for the item
    pub fn count(&self, item: &WorkItem) -> u32 {
        self.counts.lock().get(&item.key()).copied().unwrap_or(0)
    }

    /// Whether the item is still within its retry budget
    pub fn should_process(&self, item: &WorkItem) -> bool {
        self.count(item) <= self.max_retries
    }

    /// Configured retry limit
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Number of distinct items that have been counted at least once
    pub fn len(&self) -> usize {
        self.counts.lock().len()
    }

    /// Whether no item has been counted yet
    pub fn is_empty(&self) -> bool {
        self.counts.lock().is_empty()
    }

    /// Sorted copy of all counts
    pub fn snapshot(&self) -> BTreeMap<String, u32> {
        self.counts
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}
