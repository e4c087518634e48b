//! Structured pipeline events
//!
//! Every item-level outcome is emitted as a [`PipelineEvent`]. The
//! [`EventEmitter`] shared by all stages logs each event through `tracing`,
//! updates the run statistics, records the terminal outcome per item and
//! forwards the event to any subscribers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Generates new items
    Producer,
    /// Fans in orders and retries
    Router,
    /// Processes merged items
    Worker,
    /// Drains the dead-letter queue
    DeadLetter,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Producer => write!(f, "producer"),
            Self::Router => write!(f, "router"),
            Self::Worker => write!(f, "worker"),
            Self::DeadLetter => write!(f, "dead_letter"),
        }
    }
}

/// Why an item is being retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    /// Processing lost the race against the worker deadline
    Timeout,
    /// Processing finished but simulated delivery failed
    DeliveryFailed,
    /// The orders queue was full; the producer is backing off
    Backpressure,
}

/// Terminal outcome of a logical item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Processed and delivered
    Delivered,
    /// Exhausted its retries and reached the dead-letter queue
    Dead,
    /// Discarded because a queue was full or closed
    Dropped,
    /// Gave up before or instead of processing
    Abandoned,
}

/// Item-level pipeline events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Producer placed a new item on the orders queue
    Enqueued {
        label: String,
        key: String,
        timestamp: DateTime<Utc>,
    },

    /// Worker delivered the item
    Delivered {
        label: String,
        key: String,
        timestamp: DateTime<Utc>,
    },

    /// Item will be attempted again
    Retried {
        label: String,
        key: String,
        /// Attempt count after this failure
        attempt: u32,
        reason: RetryReason,
        timestamp: DateTime<Utc>,
    },

    /// Router moved the item to the dead-letter queue
    Dead {
        label: String,
        key: String,
        /// Attempts recorded when the item was dead-lettered
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// A non-blocking enqueue failed and the item was discarded
    DroppedBackpressure {
        label: String,
        key: String,
        /// Stage whose enqueue failed
        stage: Stage,
        timestamp: DateTime<Utc>,
    },

    /// Item exceeded its retry budget before it could be processed
    Abandoned {
        label: String,
        key: String,
        stage: Stage,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },
}

impl PipelineEvent {
    /// Label of the item this event refers to
    pub fn label(&self) -> &str {
        match self {
            Self::Enqueued { label, .. }
            | Self::Delivered { label, .. }
            | Self::Retried { label, .. }
            | Self::Dead { label, .. }
            | Self::DroppedBackpressure { label, .. }
            | Self::Abandoned { label, .. } => label,
        }
    }

    /// Normalized key of the item this event refers to
    pub fn key(&self) -> &str {
        match self {
            Self::Enqueued { key, .. }
            | Self::Delivered { key, .. }
            | Self::Retried { key, .. }
            | Self::Dead { key, .. }
            | Self::DroppedBackpressure { key, .. }
            | Self::Abandoned { key, .. } => key,
        }
    }

    /// Terminal outcome carried by this event, if any
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            Self::Delivered { .. } => Some(Outcome::Delivered),
            Self::Dead { .. } => Some(Outcome::Dead),
            Self::DroppedBackpressure { .. } => Some(Outcome::Dropped),
            Self::Abandoned { .. } => Some(Outcome::Abandoned),
            Self::Enqueued { .. } | Self::Retried { .. } => None,
        }
    }

    /// Event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Enqueued { .. } => "enqueued",
            Self::Delivered { .. } => "delivered",
            Self::Retried { .. } => "retried",
            Self::Dead { .. } => "dead",
            Self::DroppedBackpressure { .. } => "dropped_backpressure",
            Self::Abandoned { .. } => "abandoned",
        }
    }
}

/// Counters for a pipeline run
#[derive(Debug, Default)]
pub struct PipelineStats {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    dead: AtomicU64,
    dropped: AtomicU64,
    abandoned: AtomicU64,
}

impl PipelineStats {
    fn record(&self, event: &PipelineEvent) {
        let counter = match event {
            PipelineEvent::Enqueued { .. } => &self.enqueued,
            PipelineEvent::Delivered { .. } => &self.delivered,
            PipelineEvent::Retried { .. } => &self.retried,
            PipelineEvent::Dead { .. } => &self.dead,
            PipelineEvent::DroppedBackpressure { .. } => &self.dropped,
            PipelineEvent::Abandoned { .. } => &self.abandoned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dead: self.dead.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub enqueued: u64,
    pub delivered: u64,
    pub retried: u64,
    pub dead: u64,
    pub dropped: u64,
    pub abandoned: u64,
}

#[derive(Default)]
struct EmitterInner {
    stats: PipelineStats,
    outcomes: Mutex<BTreeMap<String, Outcome>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PipelineEvent>>>,
}

/// Shared event sink for all stages
///
/// Cloning is cheap; all clones feed the same statistics and subscribers.
#[derive(Clone, Default)]
pub struct EventEmitter {
    inner: Arc<EmitterInner>,
}

impl EventEmitter {
    /// Create an emitter with no subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all events emitted from now on
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<PipelineEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers.lock().push(tx);
        rx
    }

    /// Record and publish an event
    pub fn emit(&self, event: PipelineEvent) {
        log_event(&event);
        self.inner.stats.record(&event);

        if let Some(outcome) = event.outcome() {
            self.inner
                .outcomes
                .lock()
                .insert(event.key().to_string(), outcome);
        }

        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Current counters
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Latest terminal outcome per normalized key
    pub fn outcomes(&self) -> BTreeMap<String, Outcome> {
        self.inner.outcomes.lock().clone()
    }

    /// Drop all subscribers so their streams end
    pub fn close(&self) {
        self.inner.subscribers.lock().clear();
    }

    pub(crate) fn enqueued(&self, label: String, key: String) {
        self.emit(PipelineEvent::Enqueued {
            label,
            key,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn delivered(&self, label: String, key: String) {
        self.emit(PipelineEvent::Delivered {
            label,
            key,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn retried(&self, label: String, key: String, attempt: u32, reason: RetryReason) {
        self.emit(PipelineEvent::Retried {
            label,
            key,
            attempt,
            reason,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn dead(&self, label: String, key: String, attempts: u32) {
        self.emit(PipelineEvent::Dead {
            label,
            key,
            attempts,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn dropped(&self, label: String, key: String, stage: Stage) {
        self.emit(PipelineEvent::DroppedBackpressure {
            label,
            key,
            stage,
            timestamp: Utc::now(),
        });
    }

    pub(crate) fn abandoned(&self, label: String, key: String, stage: Stage, attempts: u32) {
        self.emit(PipelineEvent::Abandoned {
            label,
            key,
            stage,
            attempts,
            timestamp: Utc::now(),
        });
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("stats", &self.stats())
            .field("subscribers", &self.inner.subscribers.lock().len())
            .finish()
    }
}

fn log_event(event: &PipelineEvent) {
    match event {
        PipelineEvent::Enqueued { label, .. } => {
            debug!(item = %label, "Item enqueued");
        }
        PipelineEvent::Delivered { label, .. } => {
            info!(item = %label, "Item delivered");
        }
        PipelineEvent::Retried {
            label,
            attempt,
            reason,
            ..
        } => {
            info!(item = %label, attempt, ?reason, "Item scheduled for retry");
        }
        PipelineEvent::Dead {
            key, attempts, ..
        } => {
            warn!(item = %key, attempts, "Item exceeded retry limit, moved to dead letters");
        }
        PipelineEvent::DroppedBackpressure { label, stage, .. } => {
            warn!(item = %label, %stage, "Queue full, item discarded");
        }
        PipelineEvent::Abandoned {
            key,
            stage,
            attempts,
            ..
        } => {
            warn!(item = %key, %stage, attempts, "Item abandoned after too many attempts");
        }
    }
}
