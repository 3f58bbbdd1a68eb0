//! Common error types for the service registry.

use std::fmt;

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Registration input was malformed. Caller error, never retried.
    #[error("Invalid service descriptor: {0}")]
    InvalidDescriptor(String),

    /// The referenced instance does not exist or was already evicted.
    #[error("Instance not found: {0}")]
    NotFound(String),

    /// No healthy instance is available for the requested service.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A health probe failed. Only ever logged by the health checker.
    #[error("Probe failed: {0}")]
    ProbeFailed(String),

    /// The store no longer accepts writes.
    #[error("Registry is shutting down")]
    ShuttingDown,
}

impl Error {
    /// Create a new invalid descriptor error.
    pub fn invalid_descriptor(msg: impl fmt::Display) -> Self {
        Error::InvalidDescriptor(msg.to_string())
    }

    /// Create a new not found error.
    pub fn not_found(id: impl fmt::Display) -> Self {
        Error::NotFound(id.to_string())
    }

    /// Create a new service unavailable error.
    pub fn service_unavailable(service_name: impl fmt::Display) -> Self {
        Error::ServiceUnavailable(service_name.to_string())
    }

    /// Create a new probe failure.
    pub fn probe_failed(msg: impl fmt::Display) -> Self {
        Error::ProbeFailed(msg.to_string())
    }

    /// Whether a caller may retry the same request later.
    ///
    /// `NotFound` is not retryable: the caller has to register again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ServiceUnavailable(_))
    }
}
