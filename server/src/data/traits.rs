//! Repository traits for metric stores
//!
//! The online store aggregates raw spans on demand. The offline store holds
//! events pre-aggregated by traversal and can aggregate them again.

use async_trait::async_trait;

use crate::data::error::DataError;
use crate::data::types::{MetricEvent, MetricQueryParam, MetricResult};

// ============================================================================
// Online Store
// ============================================================================

/// Columnar span store queried synchronously by the metrics engine
#[async_trait]
pub trait MetricRepository: Send + Sync {
    /// Run one aggregation query. Each row maps aggregation and group-by aliases
    /// (plus `time_bucket` for time series) to scalar values.
    async fn get_metrics(&self, param: &MetricQueryParam) -> Result<MetricResult, DataError>;
}

// ============================================================================
// Offline Store
// ============================================================================

/// Pre-aggregated event store populated by traversal
#[async_trait]
pub trait OfflineMetricRepository: Send + Sync {
    /// Aggregate stored events. Aggregations carry an `OExpression` instead of
    /// an online expression.
    async fn get_metrics(&self, param: &MetricQueryParam) -> Result<MetricResult, DataError>;

    /// Persist a batch of events
    async fn insert_metrics(&self, events: Vec<MetricEvent>) -> Result<(), DataError>;
}
