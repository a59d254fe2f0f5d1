//! Errors surfaced by the metrics engine

use std::time::Duration;

use thiserror::Error;

use crate::data::DataError;

#[derive(Error, Debug)]
pub enum MetricError {
    /// Rejected before any repository call
    #[error("invalid param: {0}")]
    InvalidParam(String),

    /// Platform filter or tenant resolution failed
    #[error("upstream resolution failed: {0}")]
    Upstream(String),

    /// Online or offline store failure
    #[error(transparent)]
    Repository(#[from] DataError),

    /// Stored data could not be decoded
    #[error("conversion error: {0}")]
    Conversion(String),

    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    #[error("operation cancelled")]
    Cancelled,

    /// Catalog or registry construction failed
    #[error("invalid metric catalog: {0}")]
    Catalog(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetricError {
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParam(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a traversal attempt failing with this error is worth repeating.
    /// Repository errors are retried only when the store reports them transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Repository(e) => e.is_transient(),
            Self::Upstream(_) | Self::Timeout(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_is_transparent() {
        let err: MetricError = DataError::timeout("online", 60).into();
        assert_eq!(err.to_string(), "Query timeout after 60s on online");
    }

    #[test]
    fn test_is_retryable() {
        assert!(MetricError::Timeout(Duration::from_secs(60)).is_retryable());
        assert!(MetricError::Upstream("tenant lookup".into()).is_retryable());
        assert!(MetricError::from(DataError::backend_unavailable("online", "down")).is_retryable());
        assert!(!MetricError::from(DataError::query("online", "syntax error")).is_retryable());
        assert!(!MetricError::invalid_param("bad").is_retryable());
        assert!(!MetricError::Cancelled.is_retryable());
        assert!(!MetricError::catalog("dup").is_retryable());
    }

    #[test]
    fn test_invalid_param_display() {
        let err = MetricError::invalid_param("metric types not the same");
        assert_eq!(err.to_string(), "invalid param: metric types not the same");
    }
}
