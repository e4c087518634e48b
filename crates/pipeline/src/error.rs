//! Error types
//!
//! Item-level outcomes (backpressure drops, timeouts, exhausted retries) are
//! reported as [`PipelineEvent`](crate::PipelineEvent)s, not errors. The
//! errors here only cover invalid configuration and task failures.

use crate::events::Stage;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// A value failed validation
    #[error("invalid pipeline configuration: {0}")]
    Invalid(String),

    /// An environment variable could not be parsed
    #[error("invalid value for {name}: {value:?}")]
    Env {
        /// Variable name
        name: String,
        /// Raw value
        value: String,
    },
}

/// Pipeline errors
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration error
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// A stage task panicked or was cancelled
    #[error("{stage} task failed: {source}")]
    TaskJoin {
        /// Stage whose task failed
        stage: Stage,
        /// Join error from the runtime
        source: tokio::task::JoinError,
    },
}

/// Result alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
