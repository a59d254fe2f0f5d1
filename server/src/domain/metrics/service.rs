//! Metrics query service
//!
//! One long-lived instance per process. Collaborators are injected at
//! construction; the registry is built once and only read afterwards, so the
//! service can be shared across concurrent queries and traversals.
//!
//! Query flow:
//! 1. Normalise the caller filter and reject unknown names
//! 2. Compound metrics fan out to their sub-metrics and combine the results
//! 3. Everything else is routed online, offline or split between both
//! 4. Rows are formatted into each metric's declared shape

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use chrono_tz::Tz;
use futures::future::try_join_all;

use super::catalog::PlatformMetrics;
use super::compound::{divide_metrics, merge_metrics, pie_metrics};
use super::definition::MetricDefinition;
use super::drilldown::{DrillDownValueType, build_drill_down_tree};
use super::error::MetricError;
use super::format::format_metrics;
use super::offline::build_offline_metric_query;
use super::providers::{MetricQueryConfig, SpanFilterBuilder, TenantProvider, TraceConfigProvider};
use super::query::{
    MetricInfo, MetricQueryBuilder, append_drill_down, build_filter, combine_metric_infos,
};
use super::registry::MetricRegistry;
use super::request_filter::normalize_request_filter;
use super::traverse::TraverseSettings;
use super::types::{
    Compare, DrillDownValue, GetMetricsResp, Metric, MetricOperator, QueryMetricsReq,
    QueryMetricsResp, SpanEnv,
};
use crate::data::types::{
    Dimension, FilterField, FilterFields, MetricGranularity, MetricQueryParam, MetricSource,
    MetricType, QueryType, SPAN_FIELD_SPACE_ID,
};
use crate::data::{MetricRepository, OfflineMetricRepository};

/// Longest range accepted for minute buckets
const MAX_MINUTE_RANGE_MS: i64 = 3 * 3_600_000;

/// Longest range accepted for hour buckets
const MAX_HOUR_RANGE_MS: i64 = 6 * 86_400_000;

/// External services the engine depends on
#[derive(Clone)]
pub struct MetricsCollaborators {
    pub metric_repo: Arc<dyn MetricRepository>,
    pub offline_repo: Arc<dyn OfflineMetricRepository>,
    pub tenant_provider: Arc<dyn TenantProvider>,
    pub filter_builder: Arc<dyn SpanFilterBuilder>,
    pub trace_config: Arc<dyn TraceConfigProvider>,
}

#[derive(Debug, Clone)]
pub struct MetricsSettings {
    /// Zone of day boundaries: bucket alignment, offline cut-over and traversal dates
    pub timezone: Tz,
    pub traverse: TraverseSettings,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            traverse: TraverseSettings::default(),
        }
    }
}

/// Caller of [`MetricsService::get_drill_down_values`]
#[derive(Debug, Clone, Default)]
pub struct DrillDownValuesReq {
    pub platform_type: String,
    pub workspace_id: i64,
    pub value_type: Option<DrillDownValueType>,
    pub filter_fields: Option<FilterFields>,
    pub start_time: i64,
    pub end_time: i64,
}

pub struct MetricsService {
    pub(super) deps: MetricsCollaborators,
    pub(super) registry: MetricRegistry,
    pub(super) settings: MetricsSettings,
}

impl MetricsService {
    /// Build the registry from `catalog` and wire the collaborators
    pub fn new(
        catalog: PlatformMetrics,
        deps: MetricsCollaborators,
        settings: MetricsSettings,
    ) -> Result<Self, MetricError> {
        Ok(Self::with_registry(
            MetricRegistry::new(catalog)?,
            deps,
            settings,
        ))
    }

    pub fn with_registry(
        registry: MetricRegistry,
        deps: MetricsCollaborators,
        settings: MetricsSettings,
    ) -> Self {
        Self {
            deps,
            registry,
            settings,
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &MetricsSettings {
        &self.settings
    }

    // ========================================================================
    // Realtime queries
    // ========================================================================

    /// Query one compound metric or any number of same-shaped metrics.
    ///
    /// Empty name lists, disabled workspaces and inverted ranges answer with an
    /// empty response without touching a store.
    pub async fn query_metrics(
        &self,
        mut req: QueryMetricsReq,
    ) -> Result<QueryMetricsResp, MetricError> {
        if req.metric_names.is_empty() {
            return Ok(QueryMetricsResp::default());
        }
        let config = self.deps.trace_config.get_metric_query_config();
        if config
            .disabled_workspaces
            .contains(&req.workspace_id.to_string())
        {
            tracing::debug!(workspace_id = req.workspace_id, "Metrics disabled for workspace");
            return Ok(QueryMetricsResp::default());
        }
        if req.start_time > req.end_time {
            return Ok(QueryMetricsResp::default());
        }
        if let Some(filter) = req.filter_fields.as_mut() {
            normalize_request_filter(filter)?;
        }

        let mut compound = None;
        for name in &req.metric_names {
            let def = self.registry.definition(name)?;
            if def.compound().is_some() {
                if req.metric_names.len() != 1 {
                    return Err(MetricError::invalid_param(format!(
                        "compound metric {name} must be queried alone"
                    )));
                }
                compound = Some(def.clone());
            }
        }

        match compound {
            Some(def) => self.query_compound_metric(&req, def.as_ref(), &config).await,
            None => self.query_routed_metrics(req, &config).await,
        }
    }

    /// Query the primary window and, when asked, a compared window
    pub async fn query_metrics_with_compare(
        &self,
        req: QueryMetricsReq,
        compare: Option<Compare>,
    ) -> Result<GetMetricsResp, MetricError> {
        validate_granularity_range(&req)?;
        let Some(compare) = compare else {
            let resp = self.query_metrics(req).await?;
            return Ok(GetMetricsResp {
                metrics: resp.metrics,
                compared_metrics: BTreeMap::new(),
            });
        };

        let (start_time, end_time) = compare_window(req.start_time, req.end_time, compare);
        let compared_req = QueryMetricsReq {
            start_time,
            end_time,
            ..req.clone()
        };
        let (primary, compared) = tokio::try_join!(
            self.query_metrics(req),
            self.query_metrics(compared_req)
        )?;
        Ok(GetMetricsResp {
            metrics: primary.metrics,
            compared_metrics: compared.metrics,
        })
    }

    /// Observed values of a drill-down dimension as a tree, largest first
    pub async fn get_drill_down_values(
        &self,
        req: DrillDownValuesReq,
    ) -> Result<Vec<DrillDownValue>, MetricError> {
        let value_type = req
            .value_type
            .ok_or_else(|| MetricError::invalid_param("drill down value type is required"))?;
        let metric_name = value_type.metric_name();
        let resp = self
            .query_metrics(QueryMetricsReq {
                platform_type: req.platform_type,
                workspace_id: req.workspace_id,
                metric_names: vec![metric_name.to_string()],
                filter_fields: req.filter_fields,
                start_time: req.start_time,
                end_time: req.end_time,
                ..Default::default()
            })
            .await?;
        let Some(metric) = resp.metrics.get(metric_name) else {
            return Ok(Vec::new());
        };
        let keys = self.registry.group_by_aliases(metric_name)?;
        Ok(build_drill_down_tree(&metric.pie, &keys))
    }

    /// Ordered group-by aliases of a metric
    pub fn get_metric_group_by(&self, name: &str) -> Result<Vec<String>, MetricError> {
        self.registry.group_by_aliases(name)
    }

    async fn query_compound_metric(
        &self,
        req: &QueryMetricsReq,
        def: &dyn MetricDefinition,
        config: &MetricQueryConfig,
    ) -> Result<QueryMetricsResp, MetricError> {
        let Some(compound) = def.compound() else {
            return Err(MetricError::internal(format!(
                "metric {} is not compound",
                def.name()
            )));
        };
        let subs = compound.metrics();
        if subs.is_empty() {
            return Ok(QueryMetricsResp::default());
        }

        let responses = try_join_all(subs.iter().map(|sub| async move {
            if sub.is_const() {
                let value = sub.expression(req.granularity).expression;
                return Ok(QueryMetricsResp {
                    metrics: BTreeMap::from([(sub.name().to_string(), Metric::summary(value))]),
                });
            }
            let sub_req = QueryMetricsReq {
                metric_names: vec![sub.name().to_string()],
                group_by_space_id: false,
                ..req.clone()
            };
            self.query_routed_metrics(sub_req, config).await
        }))
        .await?;

        match compound.operator() {
            MetricOperator::Divide => {
                let operands: Vec<&str> = subs.iter().map(|sub| sub.name()).collect();
                divide_metrics(&responses, &operands, def.name())
            }
            MetricOperator::Pie => Ok(pie_metrics(&responses, def.name())),
        }
    }

    /// Send the request online, offline or split at the critical point
    async fn query_routed_metrics(
        &self,
        req: QueryMetricsReq,
        config: &MetricQueryConfig,
    ) -> Result<QueryMetricsResp, MetricError> {
        let offline_capable = config.support_offline
            && self
                .registry
                .catalog()
                .platform_metric_defs
                .contains_key(&req.platform_type);
        if !offline_capable {
            return self.query_online_metrics(&req).await;
        }

        let critical_point = crate::utils::time::days_before_midnight_millis(
            Utc::now(),
            config.offline_critical_point_days,
            self.settings.timezone,
        );
        if req.start_time >= critical_point {
            return self.query_online_metrics(&req).await;
        }
        if req.end_time < critical_point {
            return self.query_offline_metrics(&req).await;
        }

        tracing::debug!(
            critical_point,
            start = req.start_time,
            end = req.end_time,
            "Splitting query between offline and online stores"
        );
        let online_req = QueryMetricsReq {
            start_time: critical_point,
            ..req.clone()
        };
        let offline_req = QueryMetricsReq {
            end_time: critical_point - 1,
            ..req
        };
        let (online, offline) = tokio::try_join!(
            self.query_online_metrics(&online_req),
            self.query_offline_metrics(&offline_req)
        )?;
        Ok(QueryMetricsResp {
            metrics: merge_metrics(online.metrics, offline.metrics),
        })
    }

    /// One repository call for all requested metrics
    pub(super) async fn query_online_metrics(
        &self,
        req: &QueryMetricsReq,
    ) -> Result<QueryMetricsResp, MetricError> {
        let Some(builder) = self.build_online_metric_query(req).await? else {
            return Ok(QueryMetricsResp::default());
        };

        let started = Instant::now();
        let result = self.deps.metric_repo.get_metrics(&builder.param).await?;
        tracing::info!(
            metrics = ?builder.metric_names,
            rows = result.data.len(),
            cost_ms = started.elapsed().as_millis() as u64,
            "Online metrics fetched"
        );

        Ok(QueryMetricsResp {
            metrics: format_metrics(
                &result.data,
                &builder,
                &self.registry,
                self.settings.timezone,
            ),
        })
    }

    /// Returns `None` when the platform filter neither restricts nor forces the query
    async fn build_online_metric_query(
        &self,
        req: &QueryMetricsReq,
    ) -> Result<Option<MetricQueryBuilder>, MetricError> {
        let span_filter = self
            .deps
            .filter_builder
            .build_platform_related_filter(&req.platform_type)
            .await?;
        let tenants = self
            .deps
            .tenant_provider
            .get_metric_tenants_by_platform_type(&req.platform_type)
            .await?;
        let env = SpanEnv {
            workspace_id: req.workspace_id,
            source: req.source.clone(),
        };

        let mut infos = Vec::with_capacity(req.metric_names.len());
        for name in &req.metric_names {
            let def = self.registry.definition(name)?;
            infos.push(MetricInfo {
                metric_type: def.metric_type(),
                aggregations: vec![Dimension {
                    expression: Some(def.expression(req.granularity)),
                    alias: def.name().to_string(),
                    ..Default::default()
                }],
                group_by: def.group_by(),
                where_fields: def.where_filter(span_filter.as_ref(), &env).await?,
            });
        }
        let info = combine_metric_infos(infos)?;

        let (basic, force_query) = span_filter.build_basic_span_filter(&env).await?;
        let Some(mut filters) = build_filter(
            basic,
            force_query,
            &info.where_fields,
            req.filter_fields.as_ref(),
        ) else {
            tracing::debug!(platform = %req.platform_type, "Empty span filter, query skipped");
            return Ok(None);
        };

        let mut group_bys = info.group_by.clone();
        append_drill_down(&mut group_bys, &req.drill_down_fields)?;

        let mut source = MetricSource::Online;
        if req.group_by_space_id {
            widen_all_workspaces(&mut filters);
            source = MetricSource::Offline;
        }

        let param = MetricQueryParam {
            workspace_id: req.workspace_id.to_string(),
            tenants,
            aggregations: info.aggregations.clone(),
            group_bys,
            filters: Some(filters),
            start_at: req.start_time,
            end_at: req.end_time,
            granularity: (info.metric_type == MetricType::TimeSeries).then_some(req.granularity),
            source,
        };
        Ok(Some(MetricQueryBuilder {
            metric_names: req.metric_names.clone(),
            granularity: req.granularity,
            info,
            param,
        }))
    }

    /// One offline repository call per metric
    async fn query_offline_metrics(
        &self,
        req: &QueryMetricsReq,
    ) -> Result<QueryMetricsResp, MetricError> {
        let mut metrics = BTreeMap::new();
        for name in &req.metric_names {
            let builder = build_offline_metric_query(&self.registry, req, name)?;
            let started = Instant::now();
            let result = self.deps.offline_repo.get_metrics(&builder.param).await?;
            tracing::info!(
                metric = %name,
                rows = result.data.len(),
                cost_ms = started.elapsed().as_millis() as u64,
                "Offline metrics fetched"
            );
            metrics.extend(format_metrics(
                &result.data,
                &builder,
                &self.registry,
                self.settings.timezone,
            ));
        }
        Ok(QueryMetricsResp { metrics })
    }
}

/// Workspace 0 stands for every workspace: `space_id = 0` becomes `space_id exists`
fn widen_all_workspaces(filters: &mut FilterFields) {
    let Ok(()) = filters.traverse_mut(&mut |field: &mut FilterField| {
        if field.field_name == SPAN_FIELD_SPACE_ID && field.values.first().is_some_and(|v| v == "0") {
            field.query_type = Some(QueryType::Exist);
            field.values.clear();
        }
        Ok::<(), std::convert::Infallible>(())
    });
}

/// Reject bucket widths too fine for the requested range
pub fn validate_granularity_range(req: &QueryMetricsReq) -> Result<(), MetricError> {
    let range = req.end_time - req.start_time;
    let limit = match req.granularity {
        MetricGranularity::OneMinute => Some(MAX_MINUTE_RANGE_MS),
        MetricGranularity::OneHour => Some(MAX_HOUR_RANGE_MS),
        MetricGranularity::OneDay | MetricGranularity::OneWeek => None,
    };
    match limit {
        Some(limit) if range > limit => Err(MetricError::invalid_param(format!(
            "time range too large for {} granularity",
            req.granularity.as_str()
        ))),
        _ => Ok(()),
    }
}

/// Window compared against `[start, end]`
pub fn compare_window(start: i64, end: i64, compare: Compare) -> (i64, i64) {
    match compare {
        Compare::Mom => (start - (end - start), start),
        Compare::Yoy { shift } => {
            let shift_ms = shift.saturating_mul(1000);
            (start - shift_ms, end - shift_ms)
        }
    }
}
