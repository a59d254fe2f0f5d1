//! Overview summaries shown on the dashboard header

use crate::data::types::{AggrType, MetricType, OExpression, SPAN_FIELD_DURATION};
use crate::domain::metrics::definition::{CompoundMetricDef, MetricRef, SpanMetric, SpanScope};

use super::*;

pub(super) fn metrics() -> Vec<MetricRef> {
    vec![
        total_count(),
        fail_ratio_metric(),
        model_fail_ratio(),
        model_count(),
        model_duration_sum(),
        model_latency_avg(),
        model_total_tokens(),
        tool_total_count(),
        tool_fail_ratio(),
        tool_duration_sum(),
        tool_latency_avg(),
    ]
}

fn total_count() -> MetricRef {
    SpanMetric::new(
        GENERAL_TOTAL_COUNT,
        MetricType::Summary,
        SpanScope::Root,
        OExpression::new(AggrType::Sum),
        |_| count(),
    )
    .into_ref()
}

fn fail_ratio_metric() -> MetricRef {
    SpanMetric::new(
        GENERAL_FAIL_RATIO,
        MetricType::Summary,
        SpanScope::Root,
        OExpression::new(AggrType::Avg),
        |_| fail_ratio(),
    )
    .fill_null()
    .into_ref()
}

fn model_fail_ratio() -> MetricRef {
    SpanMetric::new(
        GENERAL_MODEL_FAIL_RATIO,
        MetricType::Summary,
        SpanScope::Llm,
        OExpression::new(AggrType::Avg),
        |_| fail_ratio(),
    )
    .fill_null()
    .into_ref()
}

fn model_count() -> MetricRef {
    SpanMetric::new(
        GENERAL_MODEL_COUNT,
        MetricType::Summary,
        SpanScope::Llm,
        OExpression::new(AggrType::Sum),
        |_| count(),
    )
    .into_ref()
}

fn model_duration_sum() -> MetricRef {
    SpanMetric::new(
        GENERAL_MODEL_DURATION_SUM,
        MetricType::Summary,
        SpanScope::Llm,
        OExpression::new(AggrType::Sum),
        |_| sum_millis(SPAN_FIELD_DURATION),
    )
    .into_ref()
}

/// Mean model latency in milliseconds
fn model_latency_avg() -> MetricRef {
    CompoundMetricDef::divide(
        GENERAL_MODEL_LATENCY_AVG,
        MetricType::Summary,
        model_duration_sum(),
        model_count(),
    )
    .into_ref()
}

fn model_total_tokens() -> MetricRef {
    SpanMetric::new(
        GENERAL_MODEL_TOTAL_TOKENS,
        MetricType::Summary,
        SpanScope::Llm,
        OExpression::new(AggrType::Sum),
        |_| sum_tokens(),
    )
    .into_ref()
}

fn tool_total_count() -> MetricRef {
    SpanMetric::new(
        GENERAL_TOOL_TOTAL_COUNT,
        MetricType::Summary,
        SpanScope::Tool,
        OExpression::new(AggrType::Sum),
        |_| count(),
    )
    .into_ref()
}

fn tool_fail_ratio() -> MetricRef {
    SpanMetric::new(
        GENERAL_TOOL_FAIL_RATIO,
        MetricType::Summary,
        SpanScope::Tool,
        OExpression::new(AggrType::Avg),
        |_| fail_ratio(),
    )
    .fill_null()
    .into_ref()
}

fn tool_duration_sum() -> MetricRef {
    SpanMetric::new(
        GENERAL_TOOL_DURATION_SUM,
        MetricType::Summary,
        SpanScope::Tool,
        OExpression::new(AggrType::Sum),
        |_| sum_millis(SPAN_FIELD_DURATION),
    )
    .into_ref()
}

fn tool_latency_avg() -> MetricRef {
    CompoundMetricDef::divide(
        GENERAL_TOOL_LATENCY_AVG,
        MetricType::Summary,
        tool_duration_sum(),
        tool_total_count(),
    )
    .into_ref()
}
