//! Const metrics used as compound operands

use crate::data::types::MetricGranularity;
use crate::domain::metrics::definition::{ConstMetric, MetricRef};

use super::CONST_MINUTE;

/// Minutes in one bucket of the requested granularity
pub fn const_minute() -> MetricRef {
    ConstMetric::new(CONST_MINUTE, minutes_per_bucket).into_ref()
}

fn minutes_per_bucket(granularity: MetricGranularity) -> String {
    (granularity.seconds() / 60).to_string()
}
