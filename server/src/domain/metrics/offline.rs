//! Queries against the pre-aggregated offline store
//!
//! Offline rows are the events written by traversal: one value per metric,
//! day, workspace and drill-down combination. A query re-aggregates them with
//! the metric's offline expression.

use std::collections::HashSet;

use super::error::MetricError;
use super::query::{MetricInfo, MetricQueryBuilder};
use super::registry::MetricRegistry;
use super::types::QueryMetricsReq;
use crate::data::types::{
    AggrType, Dimension, FilterField, FilterFields, MetricGranularity, MetricQueryParam,
    MetricSource, MetricType, OFFLINE_FIELD_METRIC_NAME, OFFLINE_FIELD_PLATFORM_TYPE, QueryType,
    SPAN_FIELD_SPACE_ID,
};

/// Offline rows are daily, so time series are always bucketed per day
pub const OFFLINE_GRANULARITY: MetricGranularity = MetricGranularity::OneDay;

pub fn build_offline_metric_query(
    registry: &MetricRegistry,
    req: &QueryMetricsReq,
    metric_name: &str,
) -> Result<MetricQueryBuilder, MetricError> {
    let def = registry.definition(metric_name)?;
    let metric_type = def.metric_type();

    let mut o_expression = def.o_expression();
    if o_expression.metric_name.is_empty() {
        o_expression.metric_name = def.name().to_string();
    }
    let aggregations = vec![Dimension {
        o_expression: Some(o_expression.clone()),
        alias: def.name().to_string(),
        ..Default::default()
    }];

    let mut base = vec![
        FilterField::eq_string(SPAN_FIELD_SPACE_ID, req.workspace_id.to_string()),
        FilterField::eq_string(OFFLINE_FIELD_PLATFORM_TYPE, req.platform_type.clone()),
        FilterField::eq_string(OFFLINE_FIELD_METRIC_NAME, o_expression.metric_name.clone()),
    ];
    base.extend(build_extra_filter(
        registry,
        req,
        metric_name,
        o_expression.aggr_type,
    ));

    let info = MetricInfo {
        metric_type,
        aggregations,
        group_by: def.group_by(),
        where_fields: Vec::new(),
    };
    let param = MetricQueryParam {
        workspace_id: req.workspace_id.to_string(),
        aggregations: info.aggregations.clone(),
        group_bys: info.group_by.clone(),
        filters: Some(FilterFields::and(vec![
            FilterField::subtree(Some(FilterFields::and(base))),
            FilterField::subtree(req.filter_fields.clone()),
        ])),
        start_at: req.start_time,
        end_at: req.end_time,
        granularity: (metric_type == MetricType::TimeSeries).then_some(OFFLINE_GRANULARITY),
        source: MetricSource::Offline,
        ..Default::default()
    };

    Ok(MetricQueryBuilder {
        metric_names: vec![metric_name.to_string()],
        granularity: OFFLINE_GRANULARITY,
        info,
        param,
    })
}

/// `NotExist` conditions for AVG metrics.
///
/// Traversal stores an average for every subset of drill-down objects. Rows
/// drilled by a dimension the caller did not filter on must not be averaged
/// together with the undrilled rows, so every platform and group drill-down
/// field absent from the request filter is required to be unset.
pub fn build_extra_filter(
    registry: &MetricRegistry,
    req: &QueryMetricsReq,
    metric_name: &str,
    aggr_type: Option<AggrType>,
) -> Vec<FilterField> {
    if aggr_type != Some(AggrType::Avg) {
        return Vec::new();
    }
    let catalog = registry.catalog();
    let Some(platform) = catalog.platform_metric_defs.get(&req.platform_type) else {
        return Vec::new();
    };

    let requested: HashSet<String> = req
        .filter_fields
        .as_ref()
        .map(|f| f.field_names().into_iter().collect())
        .unwrap_or_default();

    platform
        .drill_down_objects
        .iter()
        .chain(registry.group_drill_down(metric_name))
        .filter_map(|key| catalog.drill_down_objects.get(key))
        .filter(|field| !requested.contains(&field.field_name))
        .map(|field| {
            FilterField::condition(
                field.field_name.clone(),
                field.field_type,
                QueryType::NotExist,
                Vec::new(),
            )
        })
        .collect()
}
