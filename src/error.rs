//! Error types for sift-core.

use thiserror::Error;

/// Result type alias using sift-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during an investigation run.
///
/// Variants map onto the crate's handling policies: transient errors are
/// retried through the rate limiter, validation errors discard the offending
/// item and continue, operational errors degrade gracefully, and fatal
/// errors abort the investigation.
#[derive(Error, Debug)]
pub enum Error {
    /// Retryable I/O failure (HTTP 5xx, 429, connection reset).
    #[error("Transient error: {message}")]
    Transient {
        message: String,
        /// Server-supplied retry-after hint in milliseconds, if any.
        retry_after_ms: Option<u64>,
    },

    /// Timeout during operation
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Non-retryable LLM API error
    #[error("LLM API error: {provider} - {message}")]
    LlmApi { provider: String, message: String },

    /// Search API error
    #[error("Search error: {0}")]
    Search(String),

    /// Malformed input that was discarded (bad feed, schema-invalid LLM output)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Degraded-mode condition (missing backend, unavailable capability)
    #[error("Operational error: {0}")]
    Operational(String),

    /// Invariant violation that aborts the investigation
    #[error("Fatal error: {0}")]
    Fatal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation observed a cancellation signal
    #[error("Operation cancelled")]
    Cancelled,

    /// Retry budget exhausted after repeated transient failures
    #[error("Retry budget exhausted after {attempts} attempts")]
    RetryExhausted { attempts: u32 },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a transient error without a retry-after hint.
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// Create a transient error carrying a server retry-after hint.
    pub fn transient_with_hint(message: impl Into<String>, retry_after_ms: u64) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after_ms: Some(retry_after_ms),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an operational error.
    pub fn operational(message: impl Into<String>) -> Self {
        Self::Operational(message.into())
    }

    /// Create a fatal error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an LLM API error.
    pub fn llm_api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmApi {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Whether this error should be retried through the backoff policy.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Server-supplied retry-after hint, if the error carries one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::Transient { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}
