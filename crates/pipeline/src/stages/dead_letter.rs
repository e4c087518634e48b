//! Dead-letter stage
//!
//! Drains the dead-letter queue into a [`DeadLetterSink`]. Recording never
//! fails; a sink that needs fallible storage handles its own errors.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, instrument, warn};

use crate::events::Stage;
use crate::item::WorkItem;
use crate::queue::QueueReceiver;

/// Terminal consumer of permanently failed items
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Record one permanently failed item
    async fn record(&self, item: &WorkItem);
}

/// Sink that logs each dead letter at warn level
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingDeadLetterSink;

#[async_trait]
impl DeadLetterSink for LoggingDeadLetterSink {
    async fn record(&self, item: &WorkItem) {
        warn!(item = %item, key = %item.key(), "Dead letter recorded");
    }
}

/// Sink that keeps dead letters in memory
///
/// # Example
///
/// ```
/// use conveyor_pipeline::stages::{DeadLetterSink, MemoryDeadLetterSink};
/// use conveyor_pipeline::WorkItem;
///
/// # tokio_test::block_on(async {
/// let sink = MemoryDeadLetterSink::new();
/// sink.record(&WorkItem::new(3).retry(2)).await;
/// assert_eq!(sink.labels(), vec!["Item #3 (retry 2)".to_string()]);
/// # });
/// ```
#[derive(Debug, Default)]
pub struct MemoryDeadLetterSink {
    items: Mutex<Vec<WorkItem>>,
}

impl MemoryDeadLetterSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded items, oldest first
    pub fn items(&self) -> Vec<WorkItem> {
        self.items.lock().clone()
    }

    /// Recorded labels, oldest first
    pub fn labels(&self) -> Vec<String> {
        self.items.lock().iter().map(WorkItem::label).collect()
    }

    /// Number of recorded items
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn record(&self, item: &WorkItem) {
        self.items.lock().push(item.clone());
    }
}

/// Consumer of the dead-letter queue
pub struct DeadLetterDrain {
    sink: Arc<dyn DeadLetterSink>,
}

impl DeadLetterDrain {
    /// Drain into the given sink
    pub fn new(sink: Arc<dyn DeadLetterSink>) -> Self {
        Self { sink }
    }

    /// Record items until the queue is closed and drained
    ///
    /// Returns the labels recorded, in arrival order.
    #[instrument(skip_all, fields(stage = %Stage::DeadLetter))]
    pub async fn run(&self, mut dead_letter: QueueReceiver<WorkItem>) -> Vec<String> {
        let mut recorded = Vec::new();
        while let Some(item) = dead_letter.recv().await {
            self.sink.record(&item).await;
            recorded.push(item.label());
        }
        info!(count = recorded.len(), "Dead-letter drain finished");
        recorded
    }
}

impl std::fmt::Debug for DeadLetterDrain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterDrain").finish_non_exhaustive()
    }
}
