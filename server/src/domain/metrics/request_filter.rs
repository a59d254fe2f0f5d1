//! Normalisation of caller filters
//!
//! Callers filter on `status` and on latencies in milliseconds. Spans store a
//! numeric `status_code` and latencies in microseconds, so the tree is
//! rewritten in place before it reaches a query.

use super::error::MetricError;
use crate::data::types::{
    FieldType, FilterField, FilterFields, QueryType, SPAN_FIELD_DURATION,
    SPAN_FIELD_LATENCY_FIRST_RESP, SPAN_FIELD_LATENCY_FIRST_TOKEN_RESP,
    SPAN_FIELD_REASONING_DURATION, SPAN_FIELD_START_TIME_FIRST_RESP,
    SPAN_FIELD_START_TIME_FIRST_TOKEN_RESP, SPAN_FIELD_STATUS, SPAN_FIELD_STATUS_CODE,
    SPAN_STATUS_ERROR, SPAN_STATUS_SUCCESS,
};

const LATENCY_FIELDS: [&str; 6] = [
    SPAN_FIELD_DURATION,
    SPAN_FIELD_LATENCY_FIRST_RESP,
    SPAN_FIELD_START_TIME_FIRST_RESP,
    SPAN_FIELD_START_TIME_FIRST_TOKEN_RESP,
    SPAN_FIELD_LATENCY_FIRST_TOKEN_RESP,
    SPAN_FIELD_REASONING_DURATION,
];

const MICROS_PER_MILLI: i64 = 1000;

/// Rewrite every status and latency condition of `filter`
pub fn normalize_request_filter(filter: &mut FilterFields) -> Result<(), MetricError> {
    filter
        .traverse_mut(&mut process_specific_filter)
        .map_err(MetricError::InvalidParam)
}

fn process_specific_filter(field: &mut FilterField) -> Result<(), String> {
    if field.field_name == SPAN_FIELD_STATUS {
        process_status_filter(field)
    } else if LATENCY_FIELDS.contains(&field.field_name.as_str()) {
        process_latency_filter(field)
    } else {
        Ok(())
    }
}

fn process_status_filter(field: &mut FilterField) -> Result<(), String> {
    if field.query_type != Some(QueryType::In) {
        return Err("status filter should use in operator".to_string());
    }
    let mut success = false;
    let mut error = false;
    for value in &field.values {
        match value.as_str() {
            SPAN_STATUS_SUCCESS => success = true,
            SPAN_STATUS_ERROR => error = true,
            other => return Err(format!("invalid status value {other}")),
        }
    }

    field.field_name = SPAN_FIELD_STATUS_CODE.to_string();
    field.field_type = FieldType::Long;
    match (success, error) {
        (true, true) => {
            field.query_type = Some(QueryType::AlwaysTrue);
            field.values.clear();
        }
        (true, false) => field.values = vec!["0".to_string()],
        (false, true) => {
            field.query_type = Some(QueryType::NotIn);
            field.values = vec!["0".to_string()];
        }
        (false, false) => return Err("invalid status code query".to_string()),
    }
    Ok(())
}

/// Milliseconds to microseconds
fn process_latency_filter(field: &mut FilterField) -> Result<(), String> {
    if field.field_type != FieldType::Long {
        return Err(format!("latency field {} type should be long", field.field_name));
    }
    field.values = field
        .values
        .iter()
        .map(|value| {
            value
                .parse::<i64>()
                .map(|ms| ms.saturating_mul(MICROS_PER_MILLI).to_string())
                .map_err(|e| format!("fail to parse long value {value}: {e}"))
        })
        .collect::<Result<_, _>>()?;
    Ok(())
}
