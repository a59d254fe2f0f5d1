//! Physical query construction
//!
//! Several metrics can share one repository call when their definitions have
//! the same shape. [`combine_metric_infos`] checks that and merges the
//! aggregations; [`build_filter`] composes the filter tree sent to the store.

use super::error::MetricError;
use crate::data::types::{
    Dimension, FilterField, FilterFields, MetricGranularity, MetricQueryParam, MetricType,
};

/// Query shape of one metric (or of several merged ones)
#[derive(Debug, Clone, PartialEq)]
pub struct MetricInfo {
    pub metric_type: MetricType,
    /// One aggregation per metric, aliased by the metric name
    pub aggregations: Vec<Dimension>,
    pub group_by: Vec<Dimension>,
    pub where_fields: Vec<FilterField>,
}

/// Everything needed to run one physical query and format its rows
#[derive(Debug, Clone)]
pub struct MetricQueryBuilder {
    pub metric_names: Vec<String>,
    /// Bucket width used for gap filling
    pub granularity: MetricGranularity,
    pub info: MetricInfo,
    pub param: MetricQueryParam,
}

impl MetricQueryBuilder {
    /// Aliases of the aggregations, one per metric
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.info.aggregations.iter().map(|d| d.alias.as_str())
    }
}

/// Merge per-metric shapes into one query.
///
/// All inputs must agree on type, where-condition and group-by. The
/// where-condition comparison is positional: the same conditions in a
/// different order are a different shape.
pub fn combine_metric_infos(infos: Vec<MetricInfo>) -> Result<MetricInfo, MetricError> {
    let mut iter = infos.into_iter();
    let mut out = iter
        .next()
        .ok_or_else(|| MetricError::invalid_param("no metric to query"))?;
    for info in iter {
        if info.metric_type != out.metric_type {
            return Err(MetricError::invalid_param("metric types not the same"));
        }
        if info.where_fields != out.where_fields {
            return Err(MetricError::invalid_param("metric condition not the same"));
        }
        if info.group_by != out.group_by {
            return Err(MetricError::invalid_param("metric groupby not the same"));
        }
        out.aggregations.extend(info.aggregations);
    }
    Ok(out)
}

/// Compose the query filter.
///
/// Returns `None` when the platform contributes no basic filter and does not
/// force the query; callers then answer with an empty result.
pub fn build_filter(
    basic: Vec<FilterField>,
    force_query: bool,
    where_fields: &[FilterField],
    request: Option<&FilterFields>,
) -> Option<FilterFields> {
    if basic.is_empty() && !force_query {
        return None;
    }
    let mut span_filter = basic;
    span_filter.extend(where_fields.iter().cloned());
    Some(FilterFields::and(vec![
        FilterField::subtree(Some(FilterFields::and(span_filter))),
        FilterField::subtree(request.cloned()),
    ]))
}

/// Append drill-down fields as group-bys aliased by field name, skipping fields
/// the metric already groups by.
pub fn append_drill_down(
    group_bys: &mut Vec<Dimension>,
    drill_down: &[FilterField],
) -> Result<(), MetricError> {
    for field in drill_down {
        if field.field_name.is_empty() {
            return Err(MetricError::invalid_param("drill down field name is empty"));
        }
        let present = group_bys.iter().any(|d| {
            d.field
                .as_ref()
                .is_some_and(|f| f.field_name == field.field_name)
        });
        if !present {
            group_bys.push(Dimension::group_by(field.clone(), field.field_name.clone()));
        }
    }
    Ok(())
}
