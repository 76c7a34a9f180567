use thiserror::Error;

/// Application-wide error types for Forage.
#[derive(Error, Debug)]
pub enum AppError {
    /// Monthly quota for a metered backend is exhausted (soft — triggers fallback).
    #[error("quota exhausted for backend '{backend}' this period")]
    QuotaExceeded { backend: String },

    /// A backend was skipped because required credentials are not configured (soft).
    #[error("missing credentials for backend '{backend}': {missing:?}")]
    MissingCredentials {
        backend: String,
        missing: Vec<String>,
    },

    /// Network/connection error (transient).
    #[error("network error: {0}")]
    NetworkError(String),

    /// Request timed out (transient).
    #[error("request timed out after {0} seconds")]
    Timeout(u64),

    /// Upstream rate limit hit (transient).
    #[error("rate limited by upstream")]
    RateLimited,

    /// A backend response no longer matches its expected shape (permanent, no retry).
    #[error("backend '{backend}' violated its response contract: {detail}")]
    ContractViolation { backend: String, detail: String },

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Database operation failed.
    #[error("database error: {0}")]
    DatabaseError(String),

    /// Configuration-fatal condition — the only class that aborts a request.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

impl AppError {
    /// Returns true if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_) | AppError::Timeout(_) | AppError::RateLimited
        )
    }

    /// Returns true if this error must abort the whole request rather than
    /// fall through to the next candidate backend.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::ConfigError(_))
    }
}
