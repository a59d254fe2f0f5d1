//! Model-call statistics, drillable by model name

use crate::data::types::{
    AggrType, Expression, FieldType, FilterField, MetricGranularity, MetricType, OExpression,
    QueryType, SPAN_FIELD_DURATION, SPAN_FIELD_INPUT_TOKENS, SPAN_FIELD_LATENCY_FIRST_RESP,
    SPAN_FIELD_OUTPUT_TOKENS, SPAN_FIELD_STATUS_CODE,
};
use crate::domain::metrics::definition::{CompoundMetricDef, MetricRef, SpanMetric, SpanScope};
use crate::domain::metrics::wrappers::latency_wrappers;

use super::*;

pub(super) fn metrics() -> Vec<MetricRef> {
    vec![
        token_count(),
        input_token_count(),
        output_token_count(),
        input_token_total(),
        output_token_total(),
        token_type_pie(),
        token_count_pie(),
        rate(MODEL_QPS_ALL, |g| per_second(count(), g)),
        rate(MODEL_QPS_SUCCESS, |g| per_second(count_if_success(), g)),
        rate(MODEL_QPS_FAIL, |g| per_second(count_if_error(), g)),
        rate(MODEL_QPM_ALL, |g| per_minute(count(), g)),
        rate(MODEL_QPM_SUCCESS, |g| per_minute(count_if_success(), g)),
        rate(MODEL_QPM_FAIL, |g| per_minute(count_if_error(), g)),
        success_ratio_metric(),
        tps(),
        tpm(),
        duration(),
        ttft(),
        tpot(),
        total_count(),
        total_count_pie(),
        counter(MODEL_TOTAL_ERROR_COUNT, count_if_error),
        counter(MODEL_TOTAL_SUCCESS_COUNT, count_if_success),
        error_code_pie(),
    ]
}

fn llm_series(
    name: &str,
    o_expression: OExpression,
    expression: impl Fn(MetricGranularity) -> Expression + Send + Sync + 'static,
) -> SpanMetric {
    SpanMetric::new(
        name,
        MetricType::TimeSeries,
        SpanScope::Llm,
        o_expression,
        expression,
    )
}

fn token_count() -> MetricRef {
    llm_series(MODEL_TOKEN_COUNT, OExpression::new(AggrType::Sum), |_| {
        sum_tokens()
    })
    .into_ref()
}

fn input_token_count() -> MetricRef {
    llm_series(MODEL_INPUT_TOKEN_COUNT, OExpression::new(AggrType::Sum), |_| {
        sum_field(SPAN_FIELD_INPUT_TOKENS)
    })
    .into_ref()
}

fn output_token_count() -> MetricRef {
    llm_series(MODEL_OUTPUT_TOKEN_COUNT, OExpression::new(AggrType::Sum), |_| {
        sum_field(SPAN_FIELD_OUTPUT_TOKENS)
    })
    .into_ref()
}

fn input_token_total() -> MetricRef {
    SpanMetric::new(
        MODEL_INPUT_TOKEN_TOTAL,
        MetricType::Summary,
        SpanScope::Llm,
        OExpression::new(AggrType::Sum),
        |_| sum_field(SPAN_FIELD_INPUT_TOKENS),
    )
    .into_ref()
}

fn output_token_total() -> MetricRef {
    SpanMetric::new(
        MODEL_OUTPUT_TOKEN_TOTAL,
        MetricType::Summary,
        SpanScope::Llm,
        OExpression::new(AggrType::Sum),
        |_| sum_field(SPAN_FIELD_OUTPUT_TOKENS),
    )
    .into_ref()
}

/// Input versus output tokens
fn token_type_pie() -> MetricRef {
    CompoundMetricDef::pie(
        MODEL_TOKEN_TYPE_PIE,
        vec![input_token_total(), output_token_total()],
    )
    .into_ref()
}

fn token_count_pie() -> MetricRef {
    SpanMetric::new(
        MODEL_TOKEN_COUNT_PIE,
        MetricType::Pie,
        SpanScope::Llm,
        OExpression::new(AggrType::Sum),
        |_| sum_tokens(),
    )
    .with_group_by(model_name_dimension())
    .into_ref()
}

fn rate(
    name: &str,
    expression: impl Fn(MetricGranularity) -> Expression + Send + Sync + 'static,
) -> MetricRef {
    llm_series(name, OExpression::new(AggrType::Sum), expression).into_ref()
}

fn counter(name: &str, expression: fn() -> Expression) -> MetricRef {
    llm_series(name, OExpression::new(AggrType::Sum), move |_| expression()).into_ref()
}

fn success_ratio_metric() -> MetricRef {
    llm_series(MODEL_SUCCESS_RATIO, OExpression::new(AggrType::Avg), |_| {
        success_ratio()
    })
    .fill_null()
    .into_ref()
}

/// Tokens per second of a single call
fn tps() -> MetricRef {
    llm_series(MODEL_TPS, OExpression::new(AggrType::Avg), |_| {
        Expression::with_fields(
            "(%s+%s)/(%s / 1000000)",
            vec![
                long_field(SPAN_FIELD_INPUT_TOKENS),
                long_field(SPAN_FIELD_OUTPUT_TOKENS),
                long_field(SPAN_FIELD_DURATION),
            ],
        )
    })
    .fill_null()
    .with_wrappers(latency_wrappers())
    .into_ref()
}

/// Tokens per minute over each bucket
fn tpm() -> MetricRef {
    CompoundMetricDef::divide(
        MODEL_TPM,
        MetricType::TimeSeries,
        token_count(),
        const_minute(),
    )
    .into_ref()
}

fn duration() -> MetricRef {
    llm_series(MODEL_DURATION, OExpression::new(AggrType::Avg), |_| {
        millis(SPAN_FIELD_DURATION)
    })
    .fill_null()
    .with_wrappers(latency_wrappers())
    .into_ref()
}

/// Time to first token
fn ttft() -> MetricRef {
    llm_series(MODEL_TTFT, OExpression::new(AggrType::Avg), |_| {
        millis(SPAN_FIELD_LATENCY_FIRST_RESP)
    })
    .fill_null()
    .with_wrappers(latency_wrappers())
    .into_ref()
}

/// Time per output token
fn tpot() -> MetricRef {
    llm_series(MODEL_TPOT, OExpression::new(AggrType::Avg), |_| {
        Expression::with_fields(
            "(%s-%s)/(1000*%s)",
            vec![
                long_field(SPAN_FIELD_DURATION),
                long_field(SPAN_FIELD_LATENCY_FIRST_RESP),
                long_field(SPAN_FIELD_OUTPUT_TOKENS),
            ],
        )
    })
    .fill_null()
    .with_wrappers(latency_wrappers())
    .into_ref()
}

fn total_count() -> MetricRef {
    counter(MODEL_TOTAL_COUNT, count)
}

fn total_count_pie() -> MetricRef {
    SpanMetric::new(
        MODEL_TOTAL_COUNT_PIE,
        MetricType::Pie,
        SpanScope::Llm,
        OExpression::new(AggrType::Sum),
        |_| count(),
    )
    .with_group_by(model_name_dimension())
    .into_ref()
}

fn error_code_pie() -> MetricRef {
    SpanMetric::new(
        MODEL_ERROR_CODE_PIE,
        MetricType::Pie,
        SpanScope::Llm,
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

pub(super) fn model_total_count() -> MetricRef {
    total_count()
}
