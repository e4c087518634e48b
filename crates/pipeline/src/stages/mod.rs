//! Pipeline stages
//!
//! Each stage is a plain struct with an async `run` method that owns the
//! queue handles it needs. Stages never call each other; they only share the
//! queues, the [`RetryTracker`] and the [`EventEmitter`].

mod dead_letter;
mod in_flight;
mod producer;
mod router;
mod worker;

use std::sync::Arc;

use crate::events::EventEmitter;
use crate::timing::Timing;
use crate::tracker::RetryTracker;

pub use dead_letter::{
    DeadLetterDrain, DeadLetterSink, LoggingDeadLetterSink, MemoryDeadLetterSink,
};
pub use in_flight::InFlight;
pub use producer::{Producer, ProducerSummary};
pub use router::{Router, RouterSummary};
pub use worker::{Worker, WorkerSummary};

/// State shared by every stage of one run
#[derive(Clone)]
pub struct StageContext {
    /// Attempt counts keyed by normalized item key
    pub tracker: Arc<RetryTracker>,
    /// Latency and failure source
    pub timing: Arc<dyn Timing>,
    /// Event sink
    pub events: EventEmitter,
}

impl StageContext {
    /// Bundle the shared state
    pub fn new(tracker: Arc<RetryTracker>, timing: Arc<dyn Timing>, events: EventEmitter) -> Self {
        Self {
            tracker,
            timing,
            events,
        }
    }
}

impl std::fmt::Debug for StageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("tracker", &self.tracker)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}
