//! Offline backfill
//!
//! A traversal computes one day of every selected metric online, drilled by
//! each configured drill-down combination and grouped by workspace, and stores
//! the flattened values in the offline store. Items fail independently: a
//! failure is logged and reported, and the batch carries on. Re-running a day
//! writes the same event keys again.

use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::definition::MetricRef;
use super::drilldown::{DEFAULT_MAX_DRILL_DOWN_DIMENSIONS, build_drill_down_fields};
use super::error::MetricError;
use super::registry::MetricRegistry;
use super::service::MetricsService;
use super::types::{
    DEFAULT_GROUP_KEY, Metric, PlatformType, QueryMetricsReq, TraverseMetricDetail,
    TraverseMetricsReq, TraverseMetricsResp,
};
use crate::data::types::{FilterField, MetricEvent, MetricGranularity, MetricType, SPAN_FIELD_SPACE_ID};
use crate::utils::json::decode_string_map;
use crate::utils::retry::RetryPolicy;
use crate::utils::time::{parse_day_range, yesterday};

#[derive(Debug, Clone)]
pub struct TraverseSettings {
    /// Retry around each item's online query
    pub retry: RetryPolicy,
    /// Items in flight at once; 1 runs the batch sequentially
    pub concurrency: usize,
    /// Pause after a failed item
    pub failure_cooldown: Duration,
    /// Bound on the drill-down dimensions of an AVG metric
    pub max_drill_down_dimensions: usize,
}

impl Default for TraverseSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            concurrency: 1,
            failure_cooldown: Duration::ZERO,
            max_drill_down_dimensions: DEFAULT_MAX_DRILL_DOWN_DIMENSIONS,
        }
    }
}

/// A leaf metric selected for a platform
#[derive(Clone, Debug)]
pub struct TraverseMetric {
    pub platform_type: PlatformType,
    /// Group that registered the metric
    pub group_name: String,
    pub def: MetricRef,
}

struct TraverseItem {
    platform_type: PlatformType,
    def: MetricRef,
    drill_down: Vec<FilterField>,
}

/// Day and workspace shared by every item of one traversal
struct TraverseWindow {
    workspace_id: i64,
    start_date: String,
    start_at: i64,
    end_at: i64,
}

impl MetricsService {
    /// Backfill one day into the offline store
    pub async fn traverse_metrics(
        &self,
        mut req: TraverseMetricsReq,
    ) -> Result<TraverseMetricsResp, MetricError> {
        if req.start_date.is_empty() {
            req.start_date = yesterday(chrono::Utc::now(), self.settings.timezone);
        }
        let (start_at, end_at) =
            parse_day_range(&req.start_date, self.settings.timezone).map_err(MetricError::InvalidParam)?;
        if req.platform_types.is_empty() {
            req.platform_types = self.registry.catalog().platforms();
        }

        let metrics = build_traverse_metrics(&self.registry, &req.platform_types, &req.metric_names)?;
        let items = self.build_traverse_items(metrics)?;
        tracing::info!(
            date = %req.start_date,
            workspace_id = req.workspace_id,
            platforms = ?req.platform_types,
            items = items.len(),
            "Starting metric traversal"
        );

        let window = TraverseWindow {
            workspace_id: req.workspace_id,
            start_date: req.start_date,
            start_at,
            end_at,
        };
        let cancel = req.cancel.unwrap_or_default();
        let outcomes: Vec<Option<Result<(), TraverseMetricDetail>>> = stream::iter(items)
            .map(|item| self.run_traverse_item(item, &window, &cancel))
            .buffered(self.settings.traverse.concurrency.max(1))
            .collect()
            .await;

        let mut resp = TraverseMetricsResp::default();
        for outcome in outcomes.into_iter().flatten() {
            resp.statistic.total += 1;
            match outcome {
                Ok(()) => resp.statistic.success += 1,
                Err(detail) => {
                    resp.statistic.failure += 1;
                    resp.failures.push(detail);
                }
            }
        }
        tracing::info!(
            date = %window.start_date,
            total = resp.statistic.total,
            success = resp.statistic.success,
            failure = resp.statistic.failure,
            cancelled = cancel.is_cancelled(),
            "Metric traversal finished"
        );
        Ok(resp)
    }

    fn build_traverse_items(
        &self,
        metrics: Vec<TraverseMetric>,
    ) -> Result<Vec<TraverseItem>, MetricError> {
        let catalog = self.registry.catalog();
        let mut items = Vec::new();
        for metric in metrics {
            let platform = catalog
                .platform_metric_defs
                .get(&metric.platform_type)
                .ok_or_else(|| {
                    MetricError::internal(format!("platform {} not found", metric.platform_type))
                })?;
            let group = catalog.metric_groups.get(&metric.group_name).ok_or_else(|| {
                MetricError::internal(format!("metric group {} not found", metric.group_name))
            })?;
            let combinations = build_drill_down_fields(
                catalog,
                platform,
                group,
                metric.def.as_ref(),
                self.settings.traverse.max_drill_down_dimensions,
            )?;
            tracing::debug!(
                platform = %metric.platform_type,
                metric = %metric.def.name(),
                combinations = combinations.len(),
                "Drill-down combinations built"
            );
            items.extend(combinations.into_iter().map(|drill_down| TraverseItem {
                platform_type: metric.platform_type.clone(),
                def: metric.def.clone(),
                drill_down,
            }));
        }
        Ok(items)
    }

    /// `None` when the item was never started because of cancellation
    async fn run_traverse_item(
        &self,
        item: TraverseItem,
        window: &TraverseWindow,
        cancel: &CancellationToken,
    ) -> Option<Result<(), TraverseMetricDetail>> {
        if cancel.is_cancelled() {
            return None;
        }
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MetricError::Cancelled),
            result = self.traverse_item(&item, window) => result,
        };
        let time_cost = started.elapsed();

        match result {
            Ok(events) => {
                tracing::debug!(
                    platform = %item.platform_type,
                    metric = %item.def.name(),
                    events,
                    cost_ms = time_cost.as_millis() as u64,
                    "Metric traversed"
                );
                Some(Ok(()))
            }
            Err(error) => {
                tracing::error!(
                    platform = %item.platform_type,
                    metric = %item.def.name(),
                    error = %error,
                    cost_ms = time_cost.as_millis() as u64,
                    "Metric traversal failed"
                );
                let cooldown = self.settings.traverse.failure_cooldown;
                if !cooldown.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(cooldown) => {}
                        _ = cancel.cancelled() => {}
                    }
                }
                Some(Err(TraverseMetricDetail {
                    platform_type: item.platform_type,
                    metric_name: item.def.name().to_string(),
                    error,
                    time_cost,
                }))
            }
        }
    }

    /// Query, flatten and store one item; returns the number of events written
    async fn traverse_item(
        &self,
        item: &TraverseItem,
        window: &TraverseWindow,
    ) -> Result<usize, MetricError> {
        let name = item.def.name();
        let req = QueryMetricsReq {
            platform_type: item.platform_type.clone(),
            workspace_id: window.workspace_id,
            metric_names: vec![name.to_string()],
            granularity: MetricGranularity::OneDay,
            drill_down_fields: item.drill_down.clone(),
            start_time: window.start_at,
            end_time: window.end_at,
            group_by_space_id: true,
            ..Default::default()
        };

        let (resp, attempts) = self
            .settings
            .traverse
            .retry
            .run(
                || self.query_online_metrics(&req),
                MetricError::Timeout,
                MetricError::is_retryable,
            )
            .await
            .map_err(|(error, attempts)| {
                tracing::warn!(metric = %name, attempts, "Online query attempts exhausted");
                error
            })?;
        if attempts > 1 {
            tracing::info!(metric = %name, attempts, "Online query succeeded after retry");
        }

        let mut events = extract_metrics(&self.registry, name, resp.metrics.get(name))?;
        if events.is_empty() {
            return Ok(0);
        }
        for event in &mut events {
            event.platform_type = item.platform_type.clone();
            event.start_date = window.start_date.clone();
            event.metric_name = name.to_string();
        }
        let count = events.len();
        self.deps.offline_repo.insert_metrics(events).await?;
        Ok(count)
    }
}

/// Select the leaf metrics to traverse.
///
/// Compound metrics contribute their sub-metrics and const metrics are
/// skipped. Each (platform, metric) pair appears once however many paths lead
/// to it. Unknown platforms are logged and skipped.
pub fn build_traverse_metrics(
    registry: &MetricRegistry,
    platform_types: &[PlatformType],
    metric_names: &[String],
) -> Result<Vec<TraverseMetric>, MetricError> {
    let catalog = registry.catalog();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut out = Vec::new();

    for platform_type in platform_types {
        let Some(platform) = catalog.platform_metric_defs.get(platform_type) else {
            tracing::error!(platform = %platform_type, "Platform not in catalog, skipped");
            continue;
        };
        for group_name in &platform.metric_groups {
            let Some(group) = catalog.metric_groups.get(group_name) else {
                continue;
            };
            for def in &group.metric_definitions {
                if !metric_names.is_empty() && !metric_names.iter().any(|n| n == def.name()) {
                    continue;
                }
                let leaves = match def.compound() {
                    Some(compound) => compound.metrics().to_vec(),
                    None => vec![def.clone()],
                };
                for leaf in leaves {
                    if leaf.is_const() {
                        continue;
                    }
                    let Some(registered) = registry.get(leaf.name()) else {
                        return Err(MetricError::invalid_param(format!(
                            "metric {} not found",
                            leaf.name()
                        )));
                    };
                    if !seen.insert((platform_type.clone(), leaf.name().to_string())) {
                        continue;
                    }
                    let Some(owner) = registry.group_of(leaf.name()) else {
                        return Err(MetricError::invalid_param(format!(
                            "metric {} not found in any group defined",
                            leaf.name()
                        )));
                    };
                    out.push(TraverseMetric {
                        platform_type: platform_type.clone(),
                        group_name: owner.to_string(),
                        def: registered.clone(),
                    });
                }
            }
        }
    }
    Ok(out)
}

/// Flatten a metric result into offline events.
///
/// Group keys are decoded back into drill-down fields; the `space_id` group
/// value becomes the event's workspace.
pub fn extract_metrics(
    registry: &MetricRegistry,
    name: &str,
    metric: Option<&Metric>,
) -> Result<Vec<MetricEvent>, MetricError> {
    let (Some(def), Some(metric)) = (registry.get(name), metric) else {
        return Ok(Vec::new());
    };

    let mut object_keys: BTreeMap<String, String> = def
        .group_by()
        .into_iter()
        .filter_map(|d| d.field.map(|f| (d.alias, f.field_name)))
        .collect();
    for field in registry.catalog().drill_down_objects.values() {
        object_keys.insert(field.field_name.clone(), field.field_name.clone());
    }

    match def.metric_type() {
        MetricType::TimeSeries => metric
            .time_series
            .iter()
            .flatten()
            .map(|(key, points)| {
                let value = points.first().map(|p| p.value.clone()).unwrap_or_default();
                decode_event(key, value, &object_keys)
            })
            .collect(),
        MetricType::Summary if !metric.summary.is_empty() => Ok(vec![MetricEvent {
            metric_value: metric.summary.clone(),
            ..Default::default()
        }]),
        MetricType::Summary | MetricType::Pie => metric
            .pie
            .iter()
            .map(|(key, value)| decode_event(key, value.clone(), &object_keys))
            .collect(),
    }
}

fn decode_event(
    key: &str,
    metric_value: String,
    object_keys: &BTreeMap<String, String>,
) -> Result<MetricEvent, MetricError> {
    let mut event = MetricEvent {
        metric_value,
        ..Default::default()
    };
    if key == DEFAULT_GROUP_KEY {
        return Ok(event);
    }
    let values = decode_string_map(key)
        .map_err(|e| MetricError::Conversion(format!("invalid group key {key}: {e}")))?;
    for (alias, value) in values {
        if let Some(field_name) = object_keys.get(&alias) {
            event.object_keys.insert(field_name.clone(), value);
        } else if alias == SPAN_FIELD_SPACE_ID {
            event.workspace_id = value;
        }
    }
    Ok(event)
}
