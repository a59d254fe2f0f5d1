//! Engine request and response types

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::error::MetricError;
use crate::data::types::{FilterField, FilterFields, MetricGranularity};

/// Group key of the ungrouped aggregate
pub const DEFAULT_GROUP_KEY: &str = "all";

/// Sentinel for values that cannot be computed
pub const NULL_VALUE: &str = "null";

/// Platform identifier, e.g. `cozeloop`
pub type PlatformType = String;

/// Group key to ordered points
pub type TimeSeries = BTreeMap<String, Vec<MetricPoint>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Bucket start, epoch milliseconds as a decimal string
    pub timestamp: String,
    pub value: String,
}

impl MetricPoint {
    pub fn new(timestamp: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            value: value.into(),
        }
    }
}

/// One formatted metric. Which field is meaningful depends on the metric type;
/// `time_series` is `None` for non time-series results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pie: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_series: Option<TimeSeries>,
}

impl Metric {
    pub fn summary(value: impl Into<String>) -> Self {
        Self {
            summary: value.into(),
            ..Default::default()
        }
    }

    pub fn time_series(series: TimeSeries) -> Self {
        Self {
            time_series: Some(series),
            ..Default::default()
        }
    }

    pub fn pie(pie: BTreeMap<String, String>) -> Self {
        Self {
            pie,
            ..Default::default()
        }
    }
}

/// Operator combining a compound metric's sub-metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricOperator {
    Divide,
    Pie,
}

/// Caller environment passed to span filters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpanEnv {
    pub workspace_id: i64,
    pub source: Option<String>,
}

// ============================================================================
// Query
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct QueryMetricsReq {
    pub platform_type: PlatformType,
    pub workspace_id: i64,
    pub metric_names: Vec<String>,
    pub granularity: MetricGranularity,
    pub filter_fields: Option<FilterFields>,
    pub drill_down_fields: Vec<FilterField>,
    /// Epoch milliseconds
    pub start_time: i64,
    /// Epoch milliseconds
    pub end_time: i64,
    /// Group results by workspace (used by traversal)
    pub group_by_space_id: bool,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryMetricsResp {
    pub metrics: BTreeMap<String, Metric>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Compare {
    /// Preceding window of the same length
    Mom,
    /// Window shifted back by `shift` seconds
    Yoy { shift: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GetMetricsResp {
    pub metrics: BTreeMap<String, Metric>,
    pub compared_metrics: BTreeMap<String, Metric>,
}

/// Node of the drill-down value tree
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrillDownValue {
    pub value: String,
    pub total: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<DrillDownValue>,
}

// ============================================================================
// Traversal
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct TraverseMetricsReq {
    /// Empty means every configured platform
    pub platform_types: Vec<PlatformType>,
    /// Empty means every metric
    pub metric_names: Vec<String>,
    /// 0 traverses every workspace
    pub workspace_id: i64,
    /// `YYYY-MM-DD` in the configured timezone
    pub start_date: String,
    pub cancel: Option<CancellationToken>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TraverseMetricStatistic {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

#[derive(Debug)]
pub struct TraverseMetricDetail {
    pub platform_type: PlatformType,
    pub metric_name: String,
    pub error: MetricError,
    pub time_cost: Duration,
}

#[derive(Debug, Default)]
pub struct TraverseMetricsResp {
    pub statistic: TraverseMetricStatistic,
    pub failures: Vec<TraverseMetricDetail>,
}
