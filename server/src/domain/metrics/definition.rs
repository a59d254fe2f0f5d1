//! Metric definitions and their optional capabilities
//!
//! Every metric implements [`MetricDefinition`]. Optional capabilities are
//! probed through narrowing methods with empty defaults:
//! - `wrappers()` - the definition is expanded into one derived metric per wrapper
//! - `compound()` - the value is computed from sub-metrics with an operator
//! - `is_const()` - carries no queryable data, its expression is its value
//! - `interpolate()` - gap-fill value for time series
//!
//! [`SpanMetric`], [`CompoundMetricDef`] and [`ConstMetric`] cover the
//! built-in library; the registry only relies on the trait.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::MetricError;
use super::providers::SpanFilter;
use super::types::{MetricOperator, NULL_VALUE, SpanEnv};
use crate::data::types::{
    Dimension, Expression, FieldType, FilterField, MetricGranularity, MetricSource, MetricType,
    OExpression, QueryType, SPAN_FIELD_SPAN_TYPE,
};

pub type MetricRef = Arc<dyn MetricDefinition>;

#[async_trait]
pub trait MetricDefinition: Send + Sync {
    /// Unique within the registry
    fn name(&self) -> &str;

    fn metric_type(&self) -> MetricType;

    fn source(&self) -> MetricSource {
        MetricSource::Online
    }

    /// Online aggregation expression for a bucket width
    fn expression(&self, granularity: MetricGranularity) -> Expression;

    /// Offline re-aggregation descriptor
    fn o_expression(&self) -> OExpression;

    /// The metric's own condition, built on top of the platform span filter
    async fn where_filter(
        &self,
        filter: &dyn SpanFilter,
        env: &SpanEnv,
    ) -> Result<Vec<FilterField>, MetricError>;

    fn group_by(&self) -> Vec<Dimension> {
        Vec::new()
    }

    // ==================== Capabilities ====================

    fn wrappers(&self) -> Vec<Arc<dyn MetricWrapper>> {
        Vec::new()
    }

    fn compound(&self) -> Option<&dyn CompoundMetric> {
        None
    }

    fn is_const(&self) -> bool {
        false
    }

    fn interpolate(&self) -> Option<&str> {
        None
    }
}

impl fmt::Debug for dyn MetricDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricDefinition")
            .field("name", &self.name())
            .field("type", &self.metric_type())
            .finish()
    }
}

/// Derives a renamed variant of a base definition
pub trait MetricWrapper: Send + Sync {
    fn wrap(&self, base: MetricRef) -> MetricRef;
}

/// Metric computed from sub-metrics
pub trait CompoundMetric: Send + Sync {
    /// Sub-metrics in operand order (numerator first for divide)
    fn metrics(&self) -> &[MetricRef];

    fn operator(&self) -> MetricOperator;
}

// ============================================================================
// Span metric
// ============================================================================

/// Which spans a metric aggregates over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanScope {
    All,
    Root,
    Llm,
    Tool,
}

/// Span type value for tool spans
pub const SPAN_TYPE_TOOL: &str = "tool";

type ExpressionFn = Arc<dyn Fn(MetricGranularity) -> Expression + Send + Sync>;

/// Declarative metric aggregated directly from spans
pub struct SpanMetric {
    name: String,
    metric_type: MetricType,
    scope: SpanScope,
    expression: ExpressionFn,
    o_expression: OExpression,
    conditions: Vec<FilterField>,
    group_by: Vec<Dimension>,
    wrappers: Vec<Arc<dyn MetricWrapper>>,
    fill: Option<&'static str>,
}

impl SpanMetric {
    pub fn new(
        name: impl Into<String>,
        metric_type: MetricType,
        scope: SpanScope,
        o_expression: OExpression,
        expression: impl Fn(MetricGranularity) -> Expression + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            metric_type,
            scope,
            expression: Arc::new(expression),
            o_expression,
            conditions: Vec::new(),
            group_by: Vec::new(),
            wrappers: Vec::new(),
            fill: None,
        }
    }

    /// Extra condition ANDed with the scope filter
    pub fn with_condition(mut self, field: FilterField) -> Self {
        self.conditions.push(field);
        self
    }

    pub fn with_group_by(mut self, dimension: Dimension) -> Self {
        self.group_by.push(dimension);
        self
    }

    pub fn with_wrappers(mut self, wrappers: Vec<Arc<dyn MetricWrapper>>) -> Self {
        self.wrappers = wrappers;
        self
    }

    /// Fill missing buckets with `null` instead of `0`
    pub fn fill_null(mut self) -> Self {
        self.fill = Some(NULL_VALUE);
        self
    }

    pub fn into_ref(self) -> MetricRef {
        Arc::new(self)
    }
}

#[async_trait]
impl MetricDefinition for SpanMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    fn expression(&self, granularity: MetricGranularity) -> Expression {
        (self.expression)(granularity)
    }

    fn o_expression(&self) -> OExpression {
        self.o_expression.clone()
    }

    async fn where_filter(
        &self,
        filter: &dyn SpanFilter,
        env: &SpanEnv,
    ) -> Result<Vec<FilterField>, MetricError> {
        let mut fields = match self.scope {
            SpanScope::All => filter.build_all_span_filter(env).await?,
            SpanScope::Root => filter.build_root_span_filter(env).await?,
            SpanScope::Llm => filter.build_llm_span_filter(env).await?,
            SpanScope::Tool => {
                let mut fields = filter.build_all_span_filter(env).await?;
                fields.push(FilterField::condition(
                    SPAN_FIELD_SPAN_TYPE,
                    FieldType::String,
                    QueryType::Eq,
                    vec![SPAN_TYPE_TOOL.to_string()],
                ));
                fields
            }
        };
        fields.extend(self.conditions.iter().cloned());
        Ok(fields)
    }

    fn group_by(&self) -> Vec<Dimension> {
        self.group_by.clone()
    }

    fn wrappers(&self) -> Vec<Arc<dyn MetricWrapper>> {
        self.wrappers.clone()
    }

    fn interpolate(&self) -> Option<&str> {
        self.fill
    }
}

// ============================================================================
// Compound metric
// ============================================================================

/// Metric derived from sub-metric results
pub struct CompoundMetricDef {
    name: String,
    metric_type: MetricType,
    operator: MetricOperator,
    metrics: Vec<MetricRef>,
}

impl CompoundMetricDef {
    pub fn divide(
        name: impl Into<String>,
        metric_type: MetricType,
        numerator: MetricRef,
        denominator: MetricRef,
    ) -> Self {
        Self {
            name: name.into(),
            metric_type,
            operator: MetricOperator::Divide,
            metrics: vec![numerator, denominator],
        }
    }

    /// Pie keyed by sub-metric name, each slice being that metric's summary
    pub fn pie(name: impl Into<String>, metrics: Vec<MetricRef>) -> Self {
        Self {
            name: name.into(),
            metric_type: MetricType::Pie,
            operator: MetricOperator::Pie,
            metrics,
        }
    }

    pub fn into_ref(self) -> MetricRef {
        Arc::new(self)
    }
}

#[async_trait]
impl MetricDefinition for CompoundMetricDef {
    fn name(&self) -> &str {
        &self.name
    }

    fn metric_type(&self) -> MetricType {
        self.metric_type
    }

    fn expression(&self, _granularity: MetricGranularity) -> Expression {
        Expression::default()
    }

    fn o_expression(&self) -> OExpression {
        OExpression::default()
    }

    async fn where_filter(
        &self,
        _filter: &dyn SpanFilter,
        _env: &SpanEnv,
    ) -> Result<Vec<FilterField>, MetricError> {
        Ok(Vec::new())
    }

    fn compound(&self) -> Option<&dyn CompoundMetric> {
        Some(self)
    }
}

impl CompoundMetric for CompoundMetricDef {
    fn metrics(&self) -> &[MetricRef] {
        &self.metrics
    }

    fn operator(&self) -> MetricOperator {
        self.operator
    }
}

// ============================================================================
// Const metric
// ============================================================================

/// Summary whose expression is its value; never queried or traversed
pub struct ConstMetric {
    name: String,
    value: fn(MetricGranularity) -> String,
}

impl ConstMetric {
    pub fn new(name: impl Into<String>, value: fn(MetricGranularity) -> String) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn into_ref(self) -> MetricRef {
        Arc::new(self)
    }
}

#[async_trait]
impl MetricDefinition for ConstMetric {
    fn name(&self) -> &str {
        &self.name
    }

    fn metric_type(&self) -> MetricType {
        MetricType::Summary
    }

    fn expression(&self, granularity: MetricGranularity) -> Expression {
        Expression::new((self.value)(granularity))
    }

    fn o_expression(&self) -> OExpression {
        OExpression::default()
    }

    async fn where_filter(
        &self,
        _filter: &dyn SpanFilter,
        _env: &SpanEnv,
    ) -> Result<Vec<FilterField>, MetricError> {
        Ok(Vec::new())
    }

    fn is_const(&self) -> bool {
        true
    }
}
