//! Error type for the repository boundary
//!
//! Online and offline metric stores report failures through `DataError`,
//! tagged with the name of the backend that produced them.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DataError {
    /// Aggregation query rejected or failed in the store
    #[error("Query failed on {backend}: {message}")]
    Query {
        backend: &'static str,
        message: String,
    },

    /// Batch insert into the offline store failed
    #[error("Insert failed on {backend}: {message}")]
    Insert {
        backend: &'static str,
        message: String,
    },

    /// Query timeout
    #[error("Query timeout after {timeout_secs}s on {backend}")]
    Timeout {
        backend: &'static str,
        timeout_secs: u64,
    },

    /// Backend not available
    #[error("Backend {backend} is not available: {reason}")]
    BackendUnavailable {
        backend: &'static str,
        reason: String,
    },
}

impl DataError {
    pub fn query(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Query {
            backend,
            message: message.into(),
        }
    }

    pub fn insert(backend: &'static str, message: impl Into<String>) -> Self {
        Self::Insert {
            backend,
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(backend: &'static str, timeout_secs: u64) -> Self {
        Self::Timeout {
            backend,
            timeout_secs,
        }
    }

    /// Create a backend unavailable error
    pub fn backend_unavailable(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend,
            reason: reason.into(),
        }
    }

    /// Connection-level failures that may succeed on a later attempt
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::BackendUnavailable { .. } => true,
            Self::Query { message, .. } | Self::Insert { message, .. } => {
                message.contains("connection")
                    || message.contains("timeout")
                    || message.contains("network")
            }
        }
    }
}
