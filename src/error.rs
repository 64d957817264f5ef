//! Error types for the Consul ACL operator

use std::time::Duration;

use thiserror::Error;

use crate::consul::ConsulError;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Consul ACL API error
    #[error("consul error: {0}")]
    Consul(#[from] ConsulError),

    /// Validation error for CRD specs
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operator configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A referenced object does not exist yet
    #[error("dependency not ready: {0}")]
    Dependency(String),

    /// A reconciliation pass exceeded its deadline
    #[error("reconciliation timed out after {0:?}")]
    Timeout(Duration),

    /// Internal/operational error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a dependency error with the given message
    pub fn dependency(msg: impl Into<String>) -> Self {
        Self::Dependency(msg.into())
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this error is retryable
    ///
    /// Connectivity problems and deadline expiry are transient and are
    /// handed back to the controller for a backoff requeue. Validation
    /// failures and rejected mutations need a spec change first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube(source) => {
                // Don't retry on 4xx errors (validation, forbidden, etc.)
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::Consul(source) => source.is_retryable(),
            Error::Validation(_) => false,
            Error::Serialization(_) => false,
            Error::Config(_) => false,
            Error::Dependency(_) => true,
            Error::Timeout(_) => true,
            Error::Internal(_) => true,
        }
    }
}
