//! Timeout racing for stage work
//!
//! The worker races simulated processing against a fixed deadline. The race
//! is a plain unbiased `tokio::select!`: when both sides are ready on the
//! same poll, which one wins is unspecified.

use std::future::Future;
use std::time::Duration;

/// Which side of a timeout race finished first
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceOutcome<T> {
    /// The work finished before the deadline
    Completed(T),
    /// The deadline fired first; the work was dropped
    TimedOut {
        /// The limit that was exceeded
        limit: Duration,
    },
}

impl<T> RaceOutcome<T> {
    /// Whether the deadline won
    pub fn is_timed_out(&self) -> bool {
        matches!(self, RaceOutcome::TimedOut { .. })
    }
}

/// Race `work` against a `limit` deadline
///
/// # Example
///
/// ```
/// use conveyor_pipeline::reliability::{race_timeout, RaceOutcome};
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let outcome = race_timeout(Duration::from_secs(5), async { 42 }).await;
/// assert_eq!(outcome, RaceOutcome::Completed(42));
/// # });
/// ```
pub async fn race_timeout<F>(limit: Duration, work: F) -> RaceOutcome<F::Output>
where
    F: Future,
{
    let deadline = tokio::time::sleep(limit);
    tokio::pin!(work);
    tokio::pin!(deadline);

    tokio::select! {
        output = &mut work => RaceOutcome::Completed(output),
        _ = &mut deadline => RaceOutcome::TimedOut { limit },
    }
}
