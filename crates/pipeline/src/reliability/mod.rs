//! Reliability patterns for the pipeline stages
//!
//! This module provides:
//! - [`BackoffPolicy`] - Exponential backoff with cap and jitter
//! - [`race_timeout`] - Race a unit of work against a fixed deadline

mod backoff;
mod timeout;

pub use backoff::BackoffPolicy;
pub use timeout::{race_timeout, RaceOutcome};
