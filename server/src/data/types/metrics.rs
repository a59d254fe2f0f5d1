//! Metric query and storage types
//!
//! `MetricQueryParam` is the physical aggregation request handed to a
//! repository; `MetricResult` is what comes back; `MetricEvent` is the flat
//! record persisted into the offline store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::filter::{FilterField, FilterFields};

/// Column carrying the bucket timestamp in time-series rows
pub const TIME_BUCKET_KEY: &str = "time_bucket";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    TimeSeries,
    Summary,
    Pie,
}

impl MetricType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TimeSeries => "time_series",
            Self::Summary => "summary",
            Self::Pie => "pie",
        }
    }
}

/// Store a metric is computed from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricSource {
    /// Columnar span store, aggregated on demand
    #[default]
    Online,
    /// Pre-aggregated store filled by traversal
    Offline,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricGranularity {
    #[serde(rename = "1min")]
    OneMinute,
    #[serde(rename = "1hour")]
    OneHour,
    #[default]
    #[serde(rename = "1day")]
    OneDay,
    #[serde(rename = "1week")]
    OneWeek,
}

impl MetricGranularity {
    /// Bucket step in seconds. Weekly buckets step by a day.
    pub fn seconds(&self) -> i64 {
        match self {
            Self::OneMinute => 60,
            Self::OneHour => 3600,
            Self::OneDay | Self::OneWeek => 86400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1min",
            Self::OneHour => "1hour",
            Self::OneDay => "1day",
            Self::OneWeek => "1week",
        }
    }
}

impl std::str::FromStr for MetricGranularity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1min" => Ok(Self::OneMinute),
            "1hour" => Ok(Self::OneHour),
            "1day" => Ok(Self::OneDay),
            "1week" => Ok(Self::OneWeek),
            other => Err(format!("unknown granularity: {other}")),
        }
    }
}

/// Offline aggregation applied to pre-aggregated values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggrType {
    Sum,
    Avg,
    Count,
    Max,
    Min,
}

impl AggrType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Max => "max",
            Self::Min => "min",
        }
    }
}

/// Online aggregation expression. `%s` placeholders are bound, in order, to `fields`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expression {
    pub expression: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FilterField>,
}

impl Expression {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_fields(expression: impl Into<String>, fields: Vec<FilterField>) -> Self {
        Self {
            expression: expression.into(),
            fields,
        }
    }

    /// Substitute field names for the `%s` placeholders
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.expression.len());
        let mut fields = self.fields.iter();
        let mut rest = self.expression.as_str();
        while let Some(pos) = rest.find("%s") {
            out.push_str(&rest[..pos]);
            match fields.next() {
                Some(field) => out.push_str(&field.field_name),
                None => out.push_str("%s"),
            }
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        out
    }
}

/// Offline aggregation descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OExpression {
    pub aggr_type: Option<AggrType>,
    /// Stored metric to aggregate; empty means the owning metric's name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub metric_name: String,
}

impl OExpression {
    pub fn new(aggr_type: AggrType) -> Self {
        Self {
            aggr_type: Some(aggr_type),
            metric_name: String::new(),
        }
    }
}

/// Named grouping or aggregation unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<Expression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub o_expression: Option<OExpression>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<FilterField>,
    pub alias: String,
}

impl Dimension {
    /// Group-by dimension over a span field
    pub fn group_by(field: FilterField, alias: impl Into<String>) -> Self {
        Self {
            field: Some(field),
            alias: alias.into(),
            ..Default::default()
        }
    }
}

/// Physical aggregation request sent to a repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricQueryParam {
    pub workspace_id: String,
    pub tenants: Vec<String>,
    pub aggregations: Vec<Dimension>,
    pub group_bys: Vec<Dimension>,
    pub filters: Option<FilterFields>,
    /// Epoch milliseconds, inclusive
    pub start_at: i64,
    /// Epoch milliseconds, inclusive
    pub end_at: i64,
    /// Only set for time-series queries
    pub granularity: Option<MetricGranularity>,
    /// Offline when the query feeds the pre-aggregated store
    pub source: MetricSource,
}

/// One raw row: column alias to scalar
pub type MetricRow = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricResult {
    pub data: Vec<MetricRow>,
}

/// Flattened offline record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricEvent {
    /// Drill-down field name to value
    pub object_keys: BTreeMap<String, String>,
    pub metric_value: String,
    pub platform_type: String,
    pub metric_name: String,
    /// `YYYY-MM-DD`
    pub start_date: String,
    pub workspace_id: String,
}
