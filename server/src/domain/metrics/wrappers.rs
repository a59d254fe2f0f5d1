//! Aggregating wrappers
//!
//! Per-span expressions such as `duration/1000` are not aggregations by
//! themselves. A wrapper turns one into `avg(...)`, `quantile(0.9)(...)` and
//! so on, producing `<base>_<suffix>` metrics at registry construction.

use std::sync::Arc;

use async_trait::async_trait;

use super::definition::{MetricDefinition, MetricRef, MetricWrapper};
use super::error::MetricError;
use super::providers::SpanFilter;
use super::types::SpanEnv;
use crate::data::types::{
    AggrType, Dimension, Expression, FilterField, MetricGranularity, MetricSource, MetricType,
    OExpression,
};

/// Wraps a base expression in an aggregate function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateWrapper {
    suffix: &'static str,
    function: &'static str,
    aggr_type: AggrType,
}

impl AggregateWrapper {
    pub const fn new(suffix: &'static str, function: &'static str, aggr_type: AggrType) -> Self {
        Self {
            suffix,
            function,
            aggr_type,
        }
    }

    pub fn avg() -> Self {
        Self::new("avg", "avg", AggrType::Avg)
    }

    pub fn min() -> Self {
        Self::new("min", "min", AggrType::Min)
    }

    pub fn max() -> Self {
        Self::new("max", "max", AggrType::Max)
    }

    /// Percentiles cannot be re-aggregated exactly; offline they fall back to avg
    pub fn pct50() -> Self {
        Self::new("pct50", "quantile(0.5)", AggrType::Avg)
    }

    pub fn pct90() -> Self {
        Self::new("pct90", "quantile(0.9)", AggrType::Avg)
    }

    pub fn pct99() -> Self {
        Self::new("pct99", "quantile(0.99)", AggrType::Avg)
    }
}

impl MetricWrapper for AggregateWrapper {
    fn wrap(&self, base: MetricRef) -> MetricRef {
        Arc::new(WrappedMetric {
            name: format!("{}_{}", base.name(), self.suffix),
            function: self.function,
            aggr_type: self.aggr_type,
            base,
        })
    }
}

/// The standard latency wrapper set
pub fn latency_wrappers() -> Vec<Arc<dyn MetricWrapper>> {
    vec![
        Arc::new(AggregateWrapper::avg()),
        Arc::new(AggregateWrapper::min()),
        Arc::new(AggregateWrapper::max()),
        Arc::new(AggregateWrapper::pct50()),
        Arc::new(AggregateWrapper::pct90()),
        Arc::new(AggregateWrapper::pct99()),
    ]
}

/// Metric produced by an [`AggregateWrapper`]
struct WrappedMetric {
    name: String,
    function: &'static str,
    aggr_type: AggrType,
    base: MetricRef,
}

#[async_trait]
impl MetricDefinition for WrappedMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn metric_type(&self) -> MetricType {
        self.base.metric_type()
    }

    fn source(&self) -> MetricSource {
        self.base.source()
    }

    fn expression(&self, granularity: MetricGranularity) -> Expression {
        let base = self.base.expression(granularity);
        Expression::with_fields(format!("{}({})", self.function, base.expression), base.fields)
    }

    fn o_expression(&self) -> OExpression {
        OExpression::new(self.aggr_type)
    }

    async fn where_filter(
        &self,
        filter: &dyn SpanFilter,
        env: &SpanEnv,
    ) -> Result<Vec<FilterField>, MetricError> {
        self.base.where_filter(filter, env).await
    }

    fn group_by(&self) -> Vec<Dimension> {
        self.base.group_by()
    }

    fn interpolate(&self) -> Option<&str> {
        self.base.interpolate()
    }
}
