//! Service-level traffic: traces, spans, users and latency

use crate::data::types::{
    AggrType, Expression, MetricGranularity, MetricType, OExpression, SPAN_FIELD_DURATION,
    SPAN_FIELD_MESSAGE_ID, SPAN_FIELD_USER_ID,
};
use crate::domain::metrics::definition::{MetricRef, SpanMetric, SpanScope};
use crate::domain::metrics::wrappers::latency_wrappers;

use super::*;

pub(super) fn metrics() -> Vec<MetricRef> {
    vec![
        trace_count(),
        series(SERVICE_TRACE_ERROR_COUNT, SpanScope::Root, |_| count_if_error()),
        series(SERVICE_TRACE_SUCCESS_COUNT, SpanScope::Root, |_| {
            count_if_success()
        }),
        series(SERVICE_SPAN_COUNT, SpanScope::All, |_| count()),
        series(SERVICE_SPAN_ERROR_COUNT, SpanScope::All, |_| count_if_error()),
        series(SERVICE_SPAN_SUCCESS_COUNT, SpanScope::All, |_| {
            count_if_success()
        }),
        series(SERVICE_USER_COUNT, SpanScope::Root, |_| uniq(SPAN_FIELD_USER_ID)),
        series(SERVICE_MESSAGE_COUNT, SpanScope::Root, |_| {
            uniq(SPAN_FIELD_MESSAGE_ID)
        }),
        series(SERVICE_QPS_ALL, SpanScope::Root, |g| per_second(count(), g)),
        series(SERVICE_QPS_SUCCESS, SpanScope::Root, |g| {
            per_second(count_if_success(), g)
        }),
        series(SERVICE_QPS_FAIL, SpanScope::Root, |g| {
            per_second(count_if_error(), g)
        }),
        series(SERVICE_QPM_ALL, SpanScope::Root, |g| per_minute(count(), g)),
        series(SERVICE_QPM_SUCCESS, SpanScope::Root, |g| {
            per_minute(count_if_success(), g)
        }),
        series(SERVICE_QPM_FAIL, SpanScope::Root, |g| {
            per_minute(count_if_error(), g)
        }),
        duration(),
        success_ratio_metric(),
        execution_step_count(),
    ]
}

fn series(
    name: &str,
    scope: SpanScope,
    expression: impl Fn(MetricGranularity) -> Expression + Send + Sync + 'static,
) -> MetricRef {
    SpanMetric::new(
        name,
        MetricType::TimeSeries,
        scope,
        OExpression::new(AggrType::Sum),
        expression,
    )
    .into_ref()
}

pub(super) fn trace_count() -> MetricRef {
    series(SERVICE_TRACE_COUNT, SpanScope::Root, |_| count())
}

/// Every span executed under a trace
pub(super) fn execution_step_count() -> MetricRef {
    series(SERVICE_EXECUTION_STEP_COUNT, SpanScope::All, |_| count())
}

fn duration() -> MetricRef {
    SpanMetric::new(
        SERVICE_DURATION,
        MetricType::TimeSeries,
        SpanScope::Root,
        OExpression::new(AggrType::Avg),
        |_| millis(SPAN_FIELD_DURATION),
    )
    .fill_null()
    .with_wrappers(latency_wrappers())
    .into_ref()
}

fn success_ratio_metric() -> MetricRef {
    SpanMetric::new(
        SERVICE_SUCCESS_RATIO,
        MetricType::TimeSeries,
        SpanScope::Root,
        OExpression::new(AggrType::Avg),
        |_| success_ratio(),
    )
    .fill_null()
    .into_ref()
}
