//! Built-in metric library
//!
//! Definitions are grouped the way the default catalog groups them:
//! `general` (overview summaries), `model`, `tool`, `service` and `agent`.
//! `constant` holds const metrics used as compound operands.

mod agent;
mod constant;
mod general;
mod model;
mod service;
mod tool;

use crate::data::types::{
    Dimension, Expression, FieldType, FilterField, MetricGranularity, SPAN_FIELD_INPUT_TOKENS,
    SPAN_FIELD_MODEL_NAME, SPAN_FIELD_OUTPUT_TOKENS, SPAN_FIELD_STATUS_CODE, SPAN_FIELD_TOOL_NAME,
};

use super::definition::MetricRef;

pub use constant::const_minute;

// ============================================================================
// Metric names
// ============================================================================

pub const GENERAL_TOTAL_COUNT: &str = "general_total_count";
pub const GENERAL_FAIL_RATIO: &str = "general_fail_ratio";
pub const GENERAL_MODEL_FAIL_RATIO: &str = "general_model_fail_ratio";
pub const GENERAL_MODEL_COUNT: &str = "general_model_count";
pub const GENERAL_MODEL_DURATION_SUM: &str = "general_model_duration_sum";
pub const GENERAL_MODEL_LATENCY_AVG: &str = "general_model_latency_avg";
pub const GENERAL_MODEL_TOTAL_TOKENS: &str = "general_model_total_tokens";
pub const GENERAL_TOOL_TOTAL_COUNT: &str = "general_tool_total_count";
pub const GENERAL_TOOL_FAIL_RATIO: &str = "general_tool_fail_ratio";
pub const GENERAL_TOOL_DURATION_SUM: &str = "general_tool_duration_sum";
pub const GENERAL_TOOL_LATENCY_AVG: &str = "general_tool_latency_avg";

pub const MODEL_TOKEN_COUNT: &str = "model_token_count";
pub const MODEL_INPUT_TOKEN_COUNT: &str = "model_input_token_count";
pub const MODEL_OUTPUT_TOKEN_COUNT: &str = "model_output_token_count";
pub const MODEL_INPUT_TOKEN_TOTAL: &str = "model_input_token_total";
pub const MODEL_OUTPUT_TOKEN_TOTAL: &str = "model_output_token_total";
pub const MODEL_TOKEN_TYPE_PIE: &str = "model_token_type_pie";
pub const MODEL_TOKEN_COUNT_PIE: &str = "model_token_count_pie";
pub const MODEL_QPS_ALL: &str = "model_qps_all";
pub const MODEL_QPS_SUCCESS: &str = "model_qps_success";
pub const MODEL_QPS_FAIL: &str = "model_qps_fail";
pub const MODEL_QPM_ALL: &str = "model_qpm_all";
pub const MODEL_QPM_SUCCESS: &str = "model_qpm_success";
pub const MODEL_QPM_FAIL: &str = "model_qpm_fail";
pub const MODEL_SUCCESS_RATIO: &str = "model_success_ratio";
pub const MODEL_TPS: &str = "model_tps";
pub const MODEL_TPM: &str = "model_tpm";
pub const MODEL_DURATION: &str = "model_duration";
pub const MODEL_TTFT: &str = "model_ttft";
pub const MODEL_TPOT: &str = "model_tpot";
pub const MODEL_TOTAL_COUNT: &str = "model_total_count";
pub const MODEL_TOTAL_COUNT_PIE: &str = "model_total_count_pie";
pub const MODEL_TOTAL_ERROR_COUNT: &str = "model_total_error_count";
pub const MODEL_TOTAL_SUCCESS_COUNT: &str = "model_total_success_count";
pub const MODEL_ERROR_CODE_PIE: &str = "model_error_code_pie";

pub const TOOL_TOTAL_COUNT: &str = "tool_total_count";
pub const TOOL_TOTAL_COUNT_PIE: &str = "tool_total_count_pie";
pub const TOOL_TOTAL_ERROR_COUNT: &str = "tool_total_error_count";
pub const TOOL_TOTAL_SUCCESS_COUNT: &str = "tool_total_success_count";
pub const TOOL_DURATION: &str = "tool_duration";
pub const TOOL_SUCCESS_RATIO: &str = "tool_success_ratio";
pub const TOOL_ERROR_CODE_PIE: &str = "tool_error_code_pie";

pub const SERVICE_TRACE_COUNT: &str = "service_trace_count";
pub const SERVICE_TRACE_ERROR_COUNT: &str = "service_trace_error_count";
pub const SERVICE_TRACE_SUCCESS_COUNT: &str = "service_trace_success_count";
pub const SERVICE_SPAN_COUNT: &str = "service_span_count";
pub const SERVICE_SPAN_ERROR_COUNT: &str = "service_span_error_count";
pub const SERVICE_SPAN_SUCCESS_COUNT: &str = "service_span_success_count";
pub const SERVICE_USER_COUNT: &str = "service_user_count";
pub const SERVICE_MESSAGE_COUNT: &str = "service_message_count";
pub const SERVICE_QPS_ALL: &str = "service_qps_all";
pub const SERVICE_QPS_SUCCESS: &str = "service_qps_success";
pub const SERVICE_QPS_FAIL: &str = "service_qps_fail";
pub const SERVICE_QPM_ALL: &str = "service_qpm_all";
pub const SERVICE_QPM_SUCCESS: &str = "service_qpm_success";
pub const SERVICE_QPM_FAIL: &str = "service_qpm_fail";
pub const SERVICE_DURATION: &str = "service_duration";
pub const SERVICE_SUCCESS_RATIO: &str = "service_success_ratio";
pub const SERVICE_EXECUTION_STEP_COUNT: &str = "service_execution_step_count";

pub const AGENT_STEP_AVG: &str = "agent_step_avg";
pub const AGENT_MODEL_STEP_AVG: &str = "agent_model_step_avg";
pub const AGENT_TOOL_STEP_AVG: &str = "agent_tool_step_avg";

pub const CONST_MINUTE: &str = "const_minute";

pub const GROUP_GENERAL: &str = "general";
pub const GROUP_MODEL: &str = "model";
pub const GROUP_TOOL: &str = "tool";
pub const GROUP_SERVICE: &str = "service";
pub const GROUP_AGENT: &str = "agent";

/// Built-in definitions keyed by the group they belong to in the default
/// catalog, before wrapper expansion
pub fn builtin_groups() -> Vec<(&'static str, Vec<MetricRef>)> {
    vec![
        (GROUP_GENERAL, general::metrics()),
        (GROUP_MODEL, model::metrics()),
        (GROUP_TOOL, tool::metrics()),
        (GROUP_SERVICE, service::metrics()),
        (GROUP_AGENT, agent::metrics()),
    ]
}

/// Every built-in definition that can be placed in a catalog group
pub fn builtin_metrics() -> Vec<MetricRef> {
    builtin_groups()
        .into_iter()
        .flat_map(|(_, metrics)| metrics)
        .collect()
}

// ============================================================================
// Expression helpers
// ============================================================================

fn long_field(name: &str) -> FilterField {
    FilterField::new(name, FieldType::Long)
}

fn count() -> Expression {
    Expression::new("count()")
}

fn count_if_error() -> Expression {
    Expression::with_fields(
        "countIf(1, %s != 0)",
        vec![long_field(SPAN_FIELD_STATUS_CODE)],
    )
}

fn count_if_success() -> Expression {
    Expression::with_fields("countIf(1, %s = 0)", vec![long_field(SPAN_FIELD_STATUS_CODE)])
}

fn fail_ratio() -> Expression {
    Expression::with_fields(
        "countIf(1, %s != 0) / count()",
        vec![long_field(SPAN_FIELD_STATUS_CODE)],
    )
}

fn success_ratio() -> Expression {
    Expression::with_fields(
        "countIf(1, %s = 0) / count()",
        vec![long_field(SPAN_FIELD_STATUS_CODE)],
    )
}

fn sum_field(field: &str) -> Expression {
    Expression::with_fields("sum(%s)", vec![long_field(field)])
}

/// Sum of a microsecond field, in milliseconds
fn sum_millis(field: &str) -> Expression {
    Expression::with_fields("sum(%s)/1000", vec![long_field(field)])
}

fn sum_tokens() -> Expression {
    Expression::with_fields(
        "sum(%s + %s)",
        vec![
            long_field(SPAN_FIELD_INPUT_TOKENS),
            long_field(SPAN_FIELD_OUTPUT_TOKENS),
        ],
    )
}

fn uniq(field: &str) -> Expression {
    Expression::with_fields("uniq(%s)", vec![FilterField::new(field, FieldType::String)])
}

/// Per-span microsecond field rendered in milliseconds
fn millis(field: &str) -> Expression {
    Expression::with_fields("%s/1000", vec![long_field(field)])
}

/// Rate per second over one bucket
fn per_second(base: Expression, granularity: MetricGranularity) -> Expression {
    Expression::with_fields(
        format!("{}/{}", base.expression, granularity.seconds()),
        base.fields,
    )
}

/// Rate per minute over one bucket
fn per_minute(base: Expression, granularity: MetricGranularity) -> Expression {
    Expression::with_fields(
        format!("{}/{}", base.expression, granularity.seconds() / 60),
        base.fields,
    )
}

fn model_name_dimension() -> Dimension {
    Dimension::group_by(
        FilterField::new(SPAN_FIELD_MODEL_NAME, FieldType::String),
        SPAN_FIELD_MODEL_NAME,
    )
}

fn tool_name_dimension() -> Dimension {
    Dimension::group_by(
        FilterField::new(SPAN_FIELD_TOOL_NAME, FieldType::String),
        SPAN_FIELD_TOOL_NAME,
    )
}

fn status_code_dimension() -> Dimension {
    Dimension::group_by(long_field(SPAN_FIELD_STATUS_CODE), "code")
}
