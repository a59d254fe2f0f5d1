//! Tool-call statistics, drillable by tool name

use crate::data::types::{
    AggrType, Expression, FieldType, FilterField, MetricType, OExpression, QueryType,
    SPAN_FIELD_DURATION, SPAN_FIELD_STATUS_CODE,
};
use crate::domain::metrics::definition::{MetricRef, SpanMetric, SpanScope};
use crate::domain::metrics::wrappers::latency_wrappers;

use super::*;

pub(super) fn metrics() -> Vec<MetricRef> {
    vec![
        tool_total_count(),
        total_count_pie(),
        counter(TOOL_TOTAL_ERROR_COUNT, count_if_error),
        counter(TOOL_TOTAL_SUCCESS_COUNT, count_if_success),
        duration(),
        success_ratio_metric(),
        error_code_pie(),
    ]
}

fn counter(name: &str, expression: fn() -> Expression) -> MetricRef {
    SpanMetric::new(
        name,
        MetricType::TimeSeries,
        SpanScope::Tool,
        OExpression::new(AggrType::Sum),
        move |_| expression(),
    )
    .into_ref()
}

pub(super) fn tool_total_count() -> MetricRef {
    counter(TOOL_TOTAL_COUNT, count)
}

fn total_count_pie() -> MetricRef {
    SpanMetric::new(
        TOOL_TOTAL_COUNT_PIE,
        MetricType::Pie,
        SpanScope::Tool,
        OExpression::new(AggrType::Sum),
        |_| count(),
    )
    .with_group_by(tool_name_dimension())
    .into_ref()
}

fn duration() -> MetricRef {
    SpanMetric::new(
        TOOL_DURATION,
        MetricType::TimeSeries,
        SpanScope::Tool,
        OExpression::new(AggrType::Avg),
        |_| millis(SPAN_FIELD_DURATION),
    )
    .fill_null()
    .with_wrappers(latency_wrappers())
    .into_ref()
}

fn success_ratio_metric() -> MetricRef {
    SpanMetric::new(
        TOOL_SUCCESS_RATIO,
        MetricType::TimeSeries,
        SpanScope::Tool,
        OExpression::new(AggrType::Avg),
        |_| success_ratio(),
    )
    .fill_null()
    .into_ref()
}

fn error_code_pie() -> MetricRef {
    SpanMetric::new(
        TOOL_ERROR_CODE_PIE,
        MetricType::Pie,
        SpanScope::Tool,
        OExpression::new(AggrType::Sum),
        |_| count(),
    )
    .with_condition(FilterField::condition(
        SPAN_FIELD_STATUS_CODE,
        FieldType::Long,
        QueryType::NotIn,
        vec!["0".to_string()],
    ))
    .with_group_by(status_code_dimension())
    .into_ref()
}
