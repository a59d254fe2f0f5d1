//! Compound metric arithmetic and online/offline merging

use std::collections::BTreeMap;

use super::error::MetricError;
use super::types::{Metric, MetricPoint, NULL_VALUE, QueryMetricsResp, TimeSeries};
use crate::utils::json::format_float;

fn parse_finite(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Divide two numeric strings.
///
/// Returns an empty string unless both parse to finite numbers, the numerator
/// is non-negative and the denominator positive.
pub fn divide_number(a: &str, b: &str) -> String {
    match (parse_finite(a), parse_finite(b)) {
        (Some(num), Some(den)) if num >= 0.0 && den > 0.0 => format_float(num / den),
        _ => String::new(),
    }
}

/// Add two numeric strings; unparsable operands count as zero
pub fn add_number(a: &str, b: &str) -> String {
    let a = a.trim().parse::<f64>().unwrap_or(0.0);
    let b = b.trim().parse::<f64>().unwrap_or(0.0);
    format_float(a + b)
}

fn sort_by_timestamp(points: &mut [MetricPoint]) {
    points.sort_by_cached_key(|p| p.timestamp.parse::<i64>().unwrap_or_default());
}

fn divided_or_null(a: &str, b: &str) -> String {
    let value = divide_number(a, b);
    if value.is_empty() {
        NULL_VALUE.to_string()
    } else {
        value
    }
}

/// Pointwise division of two gap-filled series.
///
/// Groups missing on either side, or whose lengths differ, are dropped.
pub fn divide_time_series(a: &TimeSeries, b: &TimeSeries) -> TimeSeries {
    let mut out = TimeSeries::new();
    for (key, numerator) in a {
        let Some(denominator) = b.get(key) else {
            continue;
        };
        if numerator.is_empty() || denominator.is_empty() {
            continue;
        }
        if numerator.len() != denominator.len() {
            tracing::warn!(
                group = %key,
                numerator = numerator.len(),
                denominator = denominator.len(),
                "Time series length mismatch, group skipped"
            );
            continue;
        }
        let mut numerator = numerator.clone();
        let mut denominator = denominator.clone();
        sort_by_timestamp(&mut numerator);
        sort_by_timestamp(&mut denominator);
        let points = numerator
            .iter()
            .zip(&denominator)
            .map(|(n, d)| MetricPoint::new(n.timestamp.clone(), divided_or_null(&n.value, &d.value)))
            .collect();
        out.insert(key.clone(), points);
    }
    out
}

/// Divide every point of a series by one scalar
pub fn divide_time_series_by_summary(a: &TimeSeries, b: &str) -> TimeSeries {
    a.iter()
        .map(|(key, points)| {
            let divided = points
                .iter()
                .map(|p| MetricPoint::new(p.timestamp.clone(), divided_or_null(&p.value, b)))
                .collect();
            (key.clone(), divided)
        })
        .collect()
}

/// Combine numerator and denominator results into `name`.
///
/// `responses` and `operands` are parallel, numerator first.
pub fn divide_metrics(
    responses: &[QueryMetricsResp],
    operands: &[&str],
    name: &str,
) -> Result<QueryMetricsResp, MetricError> {
    let ([num_resp, den_resp], [num_name, den_name]) = (responses, operands) else {
        return Err(MetricError::internal(format!(
            "divide metric {name} expects two operands"
        )));
    };
    let (Some(numerator), Some(denominator)) = (
        num_resp.metrics.get(*num_name),
        den_resp.metrics.get(*den_name),
    ) else {
        return Err(MetricError::internal(format!(
            "divide metric {name} is missing operand results"
        )));
    };

    let mut out = QueryMetricsResp::default();
    let divided = match (&numerator.time_series, &denominator.time_series) {
        (Some(a), Some(b)) => Some(Metric::time_series(divide_time_series(a, b))),
        _ if !numerator.summary.is_empty() && !denominator.summary.is_empty() => Some(
            Metric::summary(divide_number(&numerator.summary, &denominator.summary)),
        ),
        (Some(a), None) if !denominator.summary.is_empty() => Some(Metric::time_series(
            divide_time_series_by_summary(a, &denominator.summary),
        )),
        _ => None,
    };
    match divided {
        Some(metric) => {
            out.metrics.insert(name.to_string(), metric);
        }
        None => tracing::warn!(metric = %name, "Operand shapes cannot be divided"),
    }
    Ok(out)
}

/// Pie keyed by sub-metric name, each slice being that metric's summary
pub fn pie_metrics(responses: &[QueryMetricsResp], name: &str) -> QueryMetricsResp {
    let pie: BTreeMap<String, String> = responses
        .iter()
        .flat_map(|resp| resp.metrics.iter())
        .map(|(metric, value)| (metric.clone(), value.summary.clone()))
        .collect();
    let mut out = QueryMetricsResp::default();
    out.metrics.insert(name.to_string(), Metric::pie(pie));
    out
}

/// Merge results of the online and offline halves of a split range
pub fn merge_metrics(
    online: BTreeMap<String, Metric>,
    mut offline: BTreeMap<String, Metric>,
) -> BTreeMap<String, Metric> {
    let mut out = BTreeMap::new();
    for (name, online_metric) in online {
        let merged = match offline.remove(&name) {
            None => online_metric,
            Some(offline_metric) => merge_metric(online_metric, offline_metric),
        };
        out.insert(name, merged);
    }
    out.extend(offline);
    out
}

fn merge_metric(online: Metric, offline: Metric) -> Metric {
    if online.time_series.is_some() || offline.time_series.is_some() {
        // Offline buckets are older, so they come first
        let mut series = offline.time_series.unwrap_or_default();
        for (key, points) in online.time_series.unwrap_or_default() {
            series.entry(key).or_default().extend(points);
        }
        Metric::time_series(series)
    } else if !online.summary.is_empty() || !offline.summary.is_empty() {
        Metric::summary(add_number(&online.summary, &offline.summary))
    } else if !online.pie.is_empty() || !offline.pie.is_empty() {
        let mut pie = online.pie;
        for (key, value) in offline.pie {
            let entry = pie.entry(key).or_default();
            *entry = if entry.is_empty() {
                value
            } else {
                add_number(entry, &value)
            };
        }
        Metric::pie(pie)
    } else {
        Metric::default()
    }
}
