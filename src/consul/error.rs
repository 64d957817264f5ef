//! Errors returned by the Consul ACL API client

use thiserror::Error;

/// Failure talking to the Consul HTTP API
#[derive(Debug, Error)]
pub enum ConsulError {
    /// Consul could not be reached (connect failure, timeout, reset)
    #[error("consul unreachable: {0}")]
    Connectivity(String),

    /// Consul answered with a non-success status
    #[error("consul returned {status}: {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body, trimmed
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("failed to decode consul response: {0}")]
    Decode(String),
}

impl ConsulError {
    /// Check if the request should be retried later.
    ///
    /// Consul reports some validation failures ("Invalid Role", "already
    /// exists") with a 500, so the message is inspected before trusting the
    /// status code.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConsulError::Connectivity(_) => true,
            ConsulError::Api { status, message } => {
                if is_rejection_message(message) {
                    return false;
                }
                *status >= 500 || *status == 429
            }
            ConsulError::Decode(_) => false,
        }
    }

    /// True when Consul refused the write because the name is taken
    pub fn is_conflict(&self) -> bool {
        match self {
            ConsulError::Api { status, message } => {
                *status == 409 || message.contains("already exists")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ConsulError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ConsulError::Decode(e.to_string())
        } else {
            ConsulError::Connectivity(e.to_string())
        }
    }
}

fn is_rejection_message(message: &str) -> bool {
    message.contains("Invalid") || message.contains("already exists")
}
