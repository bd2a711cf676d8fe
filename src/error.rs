//! Error types for the optimization experiment engine
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Experiment engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed design or degenerate analysis input (never retried automatically)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown experiment id (no design, or not running for run-scoped operations)
    #[error("Experiment not found: {0}")]
    NotFound(String),

    /// Experiment is already running
    #[error("Experiment already running: {0}\nStop it before starting it again")]
    AlreadyRunning(String),

    /// Durable write failed; the in-memory transition has already been applied
    #[error("Failed to persist experiment {experiment_id}: {source}\nIn-memory state is kept; the next successful write (or a flush) persists it")]
    Persistence {
        /// Experiment whose mutation could not be persisted
        experiment_id: String,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable format could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the engine.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Whether the error reports an unknown (or no longer running) experiment.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
