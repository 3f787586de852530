use std::time::Duration;
use thiserror::Error;

/// Failure of a single data-source operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("{source_name} does not support {operation}")]
    Unsupported {
        source_name: String,
        operation: &'static str,
    },

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        last: Box<SourceError>,
    },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unknown ticker: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl SourceError {
    /// Rate-limit and transient failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::RateLimited(_) | SourceError::Transient(_))
    }

    /// Whether the fetcher may move on to the next source
    pub fn allows_fallback(&self) -> bool {
        matches!(
            self,
            SourceError::Unavailable(_)
                | SourceError::Unsupported { .. }
                | SourceError::RetryExhausted { .. }
                | SourceError::Timeout(_)
        )
    }

    /// Retry-exhausted and timeout outcomes are surfaced to the caller as warnings
    pub fn is_degraded(&self) -> bool {
        matches!(self, SourceError::RetryExhausted { .. } | SourceError::Timeout(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown ticker: {0}")]
    UnknownTicker(String),

    #[error("Insufficient data for {indicator}: need {required} points, have {actual}")]
    InsufficientData {
        indicator: String,
        required: usize,
        actual: usize,
    },

    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Source error: {0}")]
    Source(SourceError),
}

impl From<SourceError> for AnalysisError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(t) => AnalysisError::UnknownTicker(t),
            SourceError::InvalidInput(msg) => AnalysisError::InvalidInput(msg),
            other => AnalysisError::Source(other),
        }
    }
}
