//! Error types for jobwatch.

use thiserror::Error;

/// Result type alias using jobwatch's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for jobwatch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Startup configuration is missing or invalid (fatal)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Search definition rejected by the registry
    #[error("Invalid search: {0}")]
    InvalidSearch(String),

    /// Seen-set store could not be reached
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::StoreUnavailable(e.to_string())
    }
}

/// Failure reported by a listing fetcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Timeouts, rate limiting, temporary parse mismatch. Retried next tick.
    #[error("Transient fetch error: {0}")]
    Transient(String),

    /// Persistent structural incompatibility. Surfaced to the operator.
    #[error("Permanent fetch error: {0}")]
    Permanent(String),
}

impl FetchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            FetchError::Transient(msg) | FetchError::Permanent(msg) => msg,
        }
    }
}

/// Failure reported by a notifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Network failure, rate limiting, upstream outage.
    #[error("Transient delivery error: {0}")]
    Transient(String),

    /// Malformed destination, revoked credentials, rejected payload.
    #[error("Permanent delivery error: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeliveryError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            DeliveryError::Transient(msg) | DeliveryError::Permanent(msg) => msg,
        }
    }
}
