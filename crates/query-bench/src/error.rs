//! Error types for benchmark runs.

use thiserror::Error;

/// Result type alias using BenchError.
pub type BenchResult<T> = Result<T, BenchError>;

/// Primary error type for benchmark operations.
#[derive(Debug, Error)]
pub enum BenchError {
    // === Configuration Errors ===
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No work items to execute")]
    EmptyWorkload,

    // === Request Errors ===
    /// The query service answered with an error payload.
    #[error("Statement failed: {message} (statement: {statement})")]
    Request { statement: String, message: String },

    /// Connection, timeout or malformed response.
    #[error("Transport error from {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    // === Dispatch Errors ===
    #[error("Task #{index} failed: {source}")]
    Task {
        index: u64,
        #[source]
        source: Box<BenchError>,
    },

    #[error("Task panicked or was cancelled: {0}")]
    TaskPanicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn transport(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    /// True for the configuration class of errors (bad settings, empty input).
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::EmptyWorkload)
    }

    /// Strips the task annotation and returns the underlying failure.
    pub fn root(&self) -> &BenchError {
        match self {
            Self::Task { source, .. } => source.root(),
            other => other,
        }
    }
}
