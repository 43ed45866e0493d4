//! Error types for search orchestration
//!
//! Task-level variants never escape the scheduler; they are folded into the
//! execution summary. Only [`SearchError::EmptyStrategy`] reaches the caller
//! of a full investigation run.

use thiserror::Error;

/// Errors raised while planning, executing, or parsing searches
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SearchError {
    /// The task names a backend that has no registered dialect
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Network or HTTP failure while talking to a backend
    #[error("transport error: {0}")]
    Transport(String),

    /// The task exceeded its deadline
    #[error("backend {backend} timed out after {after_ms}ms")]
    Timeout {
        /// Backend the task was bound to
        backend: String,
        /// Deadline that elapsed, in milliseconds
        after_ms: u64,
    },

    /// A response arrived but could not be interpreted
    #[error("failed to parse backend response: {0}")]
    Parse(String),

    /// The strategy has nothing to search for
    #[error("empty search strategy: {0}")]
    EmptyStrategy(String),

    /// A date range bound is malformed or inverted
    #[error("invalid date range: {0}")]
    InvalidDateRange(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl SearchError {
    /// Whether a failed task may be retried once against a fallback backend
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    /// Short label used in logs and per-backend accounting
    pub fn label(&self) -> &'static str {
        match self {
            Self::UnsupportedBackend(_) => "unsupported_backend",
            Self::Transport(_) => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Parse(_) => "parse",
            Self::EmptyStrategy(_) => "empty_strategy",
            Self::InvalidDateRange(_) => "invalid_date_range",
            Self::Config(_) => "config",
        }
    }
}

impl From<reqwest::Error> for SearchError {
    fn from(err: reqwest::Error) -> Self {
        SearchError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Parse(err.to_string())
    }
}

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;
