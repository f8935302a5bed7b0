// ===============================
// src/error.rs
// ===============================
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Classified engine errors. The variant decides the recovery policy:
/// transient transport errors retry with backoff, everything else surfaces
/// to the caller.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Disconnects, timeouts, 5xx-equivalent venue responses.
    #[error("transport error: {0}")]
    Transport(String),

    /// Venue asked us to slow down; suspend submissions for the hint.
    #[error("rate limited (retry after {retry_after_ms} ms)")]
    RateLimited { retry_after_ms: u64 },

    /// Local or venue-side rejection for malformed fields or policy.
    #[error("validation: {0}")]
    Validation(String),

    /// Sequence gap, crossed book, or otherwise inconsistent market data.
    #[error("consistency: {0}")]
    Consistency(String),

    /// Outbound request deadline expired.
    #[error("timed out after {0} ms")]
    TimedOut(u64),

    /// Startup failures: config unreadable, credentials invalid, cache
    /// unreachable when required. Refuse to start.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl EngineError {
    pub fn is_transient(&self) -> bool {
        matches!(self, EngineError::Transport(_) | EngineError::TimedOut(_))
    }
}

impl From<crate::book::BookError> for EngineError {
    fn from(e: crate::book::BookError) -> Self {
        EngineError::Consistency(e.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            EngineError::TimedOut(0)
        } else {
            EngineError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Validation(e.to_string())
    }
}
