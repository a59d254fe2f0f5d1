//! Shared data types for the repository boundary
//!
//! Types passed between the metrics engine and the online/offline stores.

mod filter;
mod metrics;

// Re-export filter tree types and well-known span fields
pub use filter::{
    FieldType, FilterField, FilterFields, OFFLINE_FIELD_METRIC_NAME, OFFLINE_FIELD_PLATFORM_TYPE,
    QueryAndOr, QueryType, SPAN_FIELD_DURATION, SPAN_FIELD_INPUT_TOKENS,
    SPAN_FIELD_LATENCY_FIRST_RESP, SPAN_FIELD_LATENCY_FIRST_TOKEN_RESP, SPAN_FIELD_MESSAGE_ID,
    SPAN_FIELD_MODEL_NAME, SPAN_FIELD_OUTPUT_TOKENS, SPAN_FIELD_REASONING_DURATION,
    SPAN_FIELD_SPACE_ID, SPAN_FIELD_SPAN_TYPE, SPAN_FIELD_START_TIME_FIRST_RESP,
    SPAN_FIELD_START_TIME_FIRST_TOKEN_RESP, SPAN_FIELD_STATUS, SPAN_FIELD_STATUS_CODE,
    SPAN_FIELD_TOOL_NAME, SPAN_FIELD_USER_ID, SPAN_STATUS_ERROR, SPAN_STATUS_SUCCESS,
};

// Re-export query and storage types
pub use metrics::{
    AggrType, Dimension, Expression, MetricEvent, MetricGranularity, MetricQueryParam,
    MetricResult, MetricRow, MetricSource, MetricType, OExpression, TIME_BUCKET_KEY,
};
