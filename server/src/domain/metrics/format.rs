//! Result formatting
//!
//! Repository rows look like
//! `{"time_bucket": "...", "<metric>": 1.5, "<group alias>": "..."}`:
//! every metric of the query is a column named by its alias, every other
//! column except the bucket is a group-by value. Rows are reshaped into the
//! metric's declared shape.

use std::collections::{BTreeMap, HashSet};

use chrono_tz::Tz;
use serde_json::Value;

use super::query::MetricQueryBuilder;
use super::registry::MetricRegistry;
use super::types::{DEFAULT_GROUP_KEY, Metric, MetricPoint, NULL_VALUE, TimeSeries};
use crate::data::types::{MetricRow, MetricType, TIME_BUCKET_KEY};
use crate::utils::json::{encode_string_map, value_to_string};
use crate::utils::time::new_time_intervals;

/// Fill value used when a definition declares none
const DEFAULT_FILL_VALUE: &str = "0";

/// Stringify a metric value, mapping non-finite numbers to `null`
pub fn get_metric_value(value: &Value) -> String {
    let s = value_to_string(value);
    match s.as_str() {
        "NaN" | "+Inf" | "-Inf" | "inf" | "-inf" => NULL_VALUE.to_string(),
        _ => s,
    }
}

/// Canonical key of a group-by value set; keys are ordered alphabetically
pub fn group_key(values: &BTreeMap<String, String>) -> String {
    if values.is_empty() {
        return DEFAULT_GROUP_KEY.to_string();
    }
    encode_string_map(values).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to encode group key, using default");
        DEFAULT_GROUP_KEY.to_string()
    })
}

pub fn format_metrics(
    rows: &[MetricRow],
    builder: &MetricQueryBuilder,
    registry: &MetricRegistry,
    tz: Tz,
) -> BTreeMap<String, Metric> {
    if builder.info.aggregations.is_empty() {
        return BTreeMap::new();
    }
    match builder.info.metric_type {
        MetricType::TimeSeries => format_time_series_data(rows, builder, registry, tz),
        MetricType::Summary => format_summary_data(rows, builder),
        MetricType::Pie => format_pie_data(rows, builder),
    }
}

pub fn format_time_series_data(
    rows: &[MetricRow],
    builder: &MetricQueryBuilder,
    registry: &MetricRegistry,
    tz: Tz,
) -> BTreeMap<String, Metric> {
    let aliases: HashSet<&str> = builder.aliases().collect();
    let mut series: BTreeMap<String, TimeSeries> = aliases
        .iter()
        .map(|alias| (alias.to_string(), TimeSeries::new()))
        .collect();

    for row in rows {
        let group_values: BTreeMap<String, String> = row
            .iter()
            .filter(|(k, _)| !aliases.contains(k.as_str()) && k.as_str() != TIME_BUCKET_KEY)
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();
        let key = group_key(&group_values);
        let timestamp = row.get(TIME_BUCKET_KEY).map(value_to_string).unwrap_or_default();

        for (column, value) in row {
            if let Some(points) = series.get_mut(column.as_str()) {
                points
                    .entry(key.clone())
                    .or_default()
                    .push(MetricPoint::new(timestamp.clone(), get_metric_value(value)));
            }
        }
    }

    let intervals = new_time_intervals(
        builder.param.start_at,
        builder.param.end_at,
        builder.granularity,
        tz,
    );
    series
        .into_iter()
        .map(|(name, mut groups)| {
            if groups.is_empty() {
                groups.insert(DEFAULT_GROUP_KEY.to_string(), Vec::new());
            }
            let fill = registry
                .get(&name)
                .and_then(|def| def.interpolate().map(str::to_string))
                .unwrap_or_else(|| DEFAULT_FILL_VALUE.to_string());
            fill_time_series(&intervals, &fill, &mut groups);
            (name, Metric::time_series(groups))
        })
        .collect()
}

/// Rebuild every group over exactly `intervals`, substituting `fill` for
/// buckets without a value
pub fn fill_time_series(intervals: &[String], fill: &str, series: &mut TimeSeries) {
    for points in series.values_mut() {
        let observed: BTreeMap<&str, &str> = points
            .iter()
            .map(|p| (p.timestamp.as_str(), p.value.as_str()))
            .collect();
        let filled = intervals
            .iter()
            .map(|bucket| {
                let value = observed
                    .get(bucket.as_str())
                    .filter(|v| !v.is_empty())
                    .copied()
                    .unwrap_or(fill);
                MetricPoint::new(bucket.clone(), value)
            })
            .collect();
        *points = filled;
    }
}

pub fn format_summary_data(rows: &[MetricRow], builder: &MetricQueryBuilder) -> BTreeMap<String, Metric> {
    let aliases: HashSet<&str> = builder.aliases().collect();
    if rows.is_empty() {
        return aliases
            .iter()
            .map(|alias| (alias.to_string(), Metric::default()))
            .collect();
    }
    if let [row] = rows
        && row.keys().all(|k| aliases.contains(k.as_str()))
    {
        let mut ret: BTreeMap<String, Metric> = aliases
            .iter()
            .map(|alias| (alias.to_string(), Metric::default()))
            .collect();
        for (column, value) in row {
            ret.insert(column.clone(), Metric::summary(get_metric_value(value)));
        }
        return ret;
    }
    // Grouped rows cannot be a single summary
    format_pie_data(rows, builder)
}

pub fn format_pie_data(rows: &[MetricRow], builder: &MetricQueryBuilder) -> BTreeMap<String, Metric> {
    let aliases: HashSet<&str> = builder.aliases().collect();
    let mut pies: BTreeMap<String, BTreeMap<String, String>> = aliases
        .iter()
        .map(|alias| (alias.to_string(), BTreeMap::new()))
        .collect();

    for row in rows {
        let group_values: BTreeMap<String, String> = row
            .iter()
            .filter(|(k, _)| !aliases.contains(k.as_str()))
            .map(|(k, v)| (k.clone(), get_metric_value(v)))
            .collect();
        let key = group_key(&group_values);
        for (column, value) in row {
            if let Some(pie) = pies.get_mut(column.as_str()) {
                pie.insert(key.clone(), get_metric_value(value));
            }
        }
    }

    pies.into_iter()
        .map(|(name, pie)| (name, Metric::pie(pie)))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data::types::{
        AggrType, Dimension, Expression, MetricGranularity, MetricQueryParam, OExpression,
    };
    use crate::domain::metrics::catalog::{MetricGroup, PlatformMetrics};
    use crate::domain::metrics::definition::{SpanMetric, SpanScope};
    use crate::domain::metrics::query::MetricInfo;

    const HOUR_MS: i64 = 3_600_000;
    const T0: i64 = 1_704_067_200_000;

    fn registry() -> MetricRegistry {
        let count = SpanMetric::new(
            "count",
            MetricType::TimeSeries,
            SpanScope::All,
            OExpression::new(AggrType::Sum),
            |_| Expression::new("count()"),
        )
        .into_ref();
        let ratio = SpanMetric::new(
            "ratio",
            MetricType::TimeSeries,
            SpanScope::All,
            OExpression::new(AggrType::Avg),
            |_| Expression::new("avg(x)"),
        )
        .fill_null()
        .into_ref();
        let mut catalog = PlatformMetrics::default();
        catalog.metric_groups.insert(
            "g".into(),
            MetricGroup {
                metric_definitions: vec![count, ratio],
                drill_down_objects: Vec::new(),
            },
        );
        MetricRegistry::new(catalog).unwrap()
    }

    fn builder(metric_type: MetricType, names: &[&str], start: i64, end: i64) -> MetricQueryBuilder {
        MetricQueryBuilder {
            metric_names: names.iter().map(|n| n.to_string()).collect(),
            granularity: MetricGranularity::OneHour,
            info: MetricInfo {
                metric_type,
                aggregations: names
                    .iter()
                    .map(|n| Dimension {
                        alias: n.to_string(),
                        ..Default::default()
                    })
                    .collect(),
                group_by: Vec::new(),
                where_fields: Vec::new(),
            },
            param: MetricQueryParam {
                start_at: start,
                end_at: end,
                ..Default::default()
            },
        }
    }

    fn row(value: Value) -> MetricRow {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_get_metric_value() {
        assert_eq!(get_metric_value(&json!(3)), "3");
        assert_eq!(get_metric_value(&json!(0.25)), "0.25");
        assert_eq!(get_metric_value(&json!("NaN")), "null");
        assert_eq!(get_metric_value(&json!("+Inf")), "null");
        assert_eq!(get_metric_value(&json!("-Inf")), "null");
        assert_eq!(get_metric_value(&json!("gpt-4")), "gpt-4");
    }

    #[test]
    fn test_group_key_is_sorted_json() {
        let values = BTreeMap::from([
            ("model_name".to_string(), "gpt".to_string()),
            ("code".to_string(), "500".to_string()),
        ]);
        assert_eq!(group_key(&values), r#"{"code":"500","model_name":"gpt"}"#);
        assert_eq!(group_key(&BTreeMap::new()), DEFAULT_GROUP_KEY);
    }

    #[test]
    fn test_time_series_gap_fill_length() {
        let registry = registry();
        let b = builder(MetricType::TimeSeries, &["count", "ratio"], T0, T0 + 5 * HOUR_MS);
        let rows = vec![row(json!({
            "time_bucket": T0 + 2 * HOUR_MS,
            "count": 7,
            "ratio": 0.5,
        }))];
        let out = format_metrics(&rows, &b, &registry, chrono_tz::UTC);

        let count = out["count"].time_series.as_ref().unwrap();
        let points = &count[DEFAULT_GROUP_KEY];
        assert_eq!(points.len(), 6);
        assert_eq!(points[0], MetricPoint::new(T0.to_string(), "0"));
        assert_eq!(points[2], MetricPoint::new((T0 + 2 * HOUR_MS).to_string(), "7"));

        let ratio = &out["ratio"].time_series.as_ref().unwrap()[DEFAULT_GROUP_KEY];
        assert_eq!(ratio.len(), 6);
        assert_eq!(ratio[0].value, "null");
        assert_eq!(ratio[2].value, "0.5");
    }

    #[test]
    fn test_time_series_empty_rows_yield_default_group() {
        let registry = registry();
        let b = builder(MetricType::TimeSeries, &["count"], T0, T0 + HOUR_MS);
        let out = format_metrics(&[], &b, &registry, chrono_tz::UTC);
        let series = out["count"].time_series.as_ref().unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(series[DEFAULT_GROUP_KEY].len(), 2);
        assert!(series[DEFAULT_GROUP_KEY].iter().all(|p| p.value == "0"));
    }

    #[test]
    fn test_time_series_groups() {
        let registry = registry();
        let b = builder(MetricType::TimeSeries, &["count"], T0, T0 + HOUR_MS);
        let rows = vec![
            row(json!({"time_bucket": T0, "count": 1, "model_name": "a"})),
            row(json!({"time_bucket": T0 + HOUR_MS, "count": 2, "model_name": "b"})),
        ];
        let out = format_metrics(&rows, &b, &registry, chrono_tz::UTC);
        let series = out["count"].time_series.as_ref().unwrap();
        let a = &series[r#"{"model_name":"a"}"#];
        let b = &series[r#"{"model_name":"b"}"#];
        assert_eq!((a[0].value.as_str(), a[1].value.as_str()), ("1", "0"));
        assert_eq!((b[0].value.as_str(), b[1].value.as_str()), ("0", "2"));
    }

    #[test]
    fn test_summary_single_row() {
        let b = builder(MetricType::Summary, &["a", "b"], T0, T0);
        let out = format_summary_data(&[row(json!({"a": 4, "b": "NaN"}))], &b);
        assert_eq!(out["a"], Metric::summary("4"));
        assert_eq!(out["b"], Metric::summary("null"));
    }

    #[test]
    fn test_summary_empty_rows() {
        let b = builder(MetricType::Summary, &["a"], T0, T0);
        let out = format_summary_data(&[], &b);
        assert_eq!(out["a"], Metric::default());
    }

    #[test]
    fn test_summary_with_groups_becomes_pie() {
        let b = builder(MetricType::Summary, &["a"], T0, T0);
        let rows = vec![
            row(json!({"a": 1, "space_id": "1"})),
            row(json!({"a": 2, "space_id": "2"})),
        ];
        let out = format_summary_data(&rows, &b);
        assert!(out["a"].summary.is_empty());
        assert_eq!(out["a"].pie[r#"{"space_id":"2"}"#], "2");
    }

    #[test]
    fn test_pie_ungrouped_row_uses_default_key() {
        let b = builder(MetricType::Pie, &["a"], T0, T0);
        let out = format_pie_data(&[row(json!({"a": 9}))], &b);
        assert_eq!(out["a"].pie[DEFAULT_GROUP_KEY], "9");
    }
}
