//! Agent execution depth, derived from service, model and tool counts

use crate::data::types::MetricType;
use crate::domain::metrics::definition::{CompoundMetricDef, MetricRef};

use super::*;

pub(super) fn metrics() -> Vec<MetricRef> {
    vec![step_avg(), model_step_avg(), tool_step_avg()]
}

/// Spans per trace
fn step_avg() -> MetricRef {
    CompoundMetricDef::divide(
        AGENT_STEP_AVG,
        MetricType::TimeSeries,
        service::execution_step_count(),
        service::trace_count(),
    )
    .into_ref()
}

/// Model calls per trace
fn model_step_avg() -> MetricRef {
    CompoundMetricDef::divide(
        AGENT_MODEL_STEP_AVG,
        MetricType::TimeSeries,
        model::model_total_count(),
        service::trace_count(),
    )
    .into_ref()
}

/// Tool calls per trace
fn tool_step_avg() -> MetricRef {
    CompoundMetricDef::divide(
        AGENT_TOOL_STEP_AVG,
        MetricType::TimeSeries,
        tool::tool_total_count(),
        service::trace_count(),
    )
    .into_ref()
}
