//! Bounded FIFO queues with directional handles
//!
//! [`bounded`] returns a [`QueueSender`] and a [`QueueReceiver`]. A stage
//! that only produces into a queue holds the sender; a stage that only
//! consumes holds the receiver. Closing is done by the single logical closer
//! through [`QueueSender::close`], which consumes the handle.

use std::fmt;

use tokio::sync::mpsc;

/// Outcome of a non-blocking enqueue
///
/// A full queue is a normal outcome, not an error: callers decide whether to
/// back off, retry or drop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer<T> {
    /// The value was enqueued
    Accepted,
    /// The queue is at capacity; the value is handed back
    Full(T),
    /// The consumer is gone; the value is handed back
    Closed(T),
}

impl<T> Offer<T> {
    /// Whether the value was enqueued
    pub fn is_accepted(&self) -> bool {
        matches!(self, Offer::Accepted)
    }
}

/// Error returned by a blocking enqueue when the consumer is gone
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("queue '{queue}' is closed")]
pub struct QueueClosed<T> {
    /// Name of the closed queue
    pub queue: &'static str,
    /// The value that could not be delivered
    pub value: T,
}

/// Create a bounded queue with the given capacity
///
/// # Panics
///
/// Panics if `capacity` is zero. [`PipelineConfig::validate`] rejects zero
/// capacities before any queue is built.
///
/// [`PipelineConfig::validate`]: crate::PipelineConfig::validate
pub fn bounded<T>(name: &'static str, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        QueueSender { name, tx },
        QueueReceiver { name, rx, capacity },
    )
}

/// Producing side of a queue
pub struct QueueSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
}

impl<T> QueueSender<T> {
    /// Enqueue without waiting
    pub fn offer(&self, value: T) -> Offer<T> {
        match self.tx.try_send(value) {
            Ok(()) => Offer::Accepted,
            Err(mpsc::error::TrySendError::Full(value)) => Offer::Full(value),
            Err(mpsc::error::TrySendError::Closed(value)) => Offer::Closed(value),
        }
    }

    /// Enqueue, waiting for free capacity
    pub async fn send(&self, value: T) -> Result<(), QueueClosed<T>> {
        self.tx.send(value).await.map_err(|e| QueueClosed {
            queue: self.name,
            value: e.0,
        })
    }

    /// Signal that no further items will arrive
    ///
    /// The consumer still drains whatever is buffered before observing the
    /// end of the stream.
    pub fn close(self) {
        drop(self);
    }

    /// Name of the queue
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the consumer has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T> fmt::Debug for QueueSender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSender")
            .field("name", &self.name)
            .field("capacity", &self.tx.max_capacity())
            .finish()
    }
}

/// Consuming side of a queue
pub struct QueueReceiver<T> {
    name: &'static str,
    rx: mpsc::Receiver<T>,
    capacity: usize,
}

impl<T> QueueReceiver<T> {
    /// Receive the next item; `None` once the queue is closed and drained
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Number of buffered items
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is buffered
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Fixed capacity of the queue
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Name of the queue
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> fmt::Debug for QueueReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueReceiver")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("len", &self.rx.len())
            .finish()
    }
}
