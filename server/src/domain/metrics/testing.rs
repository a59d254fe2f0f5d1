//! Hand-written collaborators for engine tests

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::catalog::{MetricGroup, PlatformMetricDef, PlatformMetrics};
use super::definition::{CompoundMetricDef, MetricRef, SpanMetric, SpanScope};
use super::error::MetricError;
use super::providers::{
    MetricQueryConfig, SpanFilter, SpanFilterBuilder, StaticTraceConfig, TenantProvider,
};
use super::service::{MetricsCollaborators, MetricsService, MetricsSettings};
use super::types::SpanEnv;
use crate::data::types::{
    AggrType, Dimension, Expression, FieldType, FilterField, MetricEvent, MetricQueryParam,
    MetricResult, MetricRow, MetricType, OExpression, SPAN_FIELD_MODEL_NAME, SPAN_FIELD_SPACE_ID,
};
use crate::data::{DataError, MetricRepository, OfflineMetricRepository};

pub const PLATFORM: &str = "loop";

pub struct FakeSpanFilter;

#[async_trait]
impl SpanFilter for FakeSpanFilter {
    async fn build_basic_span_filter(
        &self,
        env: &SpanEnv,
    ) -> Result<(Vec<FilterField>, bool), MetricError> {
        Ok((
            vec![FilterField::eq_string(
                SPAN_FIELD_SPACE_ID,
                env.workspace_id.to_string(),
            )],
            false,
        ))
    }

    async fn build_root_span_filter(
        &self,
        _env: &SpanEnv,
    ) -> Result<Vec<FilterField>, MetricError> {
        Ok(vec![FilterField::eq_string("parent_id", "0")])
    }

    async fn build_llm_span_filter(&self, _env: &SpanEnv) -> Result<Vec<FilterField>, MetricError> {
        Ok(vec![FilterField::eq_string("span_type", "model")])
    }

    async fn build_all_span_filter(&self, _env: &SpanEnv) -> Result<Vec<FilterField>, MetricError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
pub struct FakeFilterBuilder {
    pub fail: bool,
}

#[async_trait]
impl SpanFilterBuilder for FakeFilterBuilder {
    async fn build_platform_related_filter(
        &self,
        platform_type: &str,
    ) -> Result<Arc<dyn SpanFilter>, MetricError> {
        if self.fail {
            return Err(MetricError::Upstream(format!(
                "no span filter for {platform_type}"
            )));
        }
        Ok(Arc::new(FakeSpanFilter))
    }
}

pub struct FakeTenants;

#[async_trait]
impl TenantProvider for FakeTenants {
    async fn get_metric_tenants_by_platform_type(
        &self,
        _platform_type: &str,
    ) -> Result<Vec<String>, MetricError> {
        Ok(vec!["spans".to_string()])
    }
}

type Responder = Box<dyn Fn(&MetricQueryParam) -> Result<MetricResult, DataError> + Send + Sync>;

/// Online store answering with a closure and recording every query
pub struct FakeMetricRepo {
    responder: Responder,
    calls: Mutex<Vec<MetricQueryParam>>,
}

impl FakeMetricRepo {
    pub fn new(
        responder: impl Fn(&MetricQueryParam) -> Result<MetricResult, DataError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every aggregation alias of every query answers `value`
    pub fn constant(value: Value) -> Self {
        Self::new(move |param| Ok(single_row(param, value.clone())))
    }

    pub fn calls(&self) -> Vec<MetricQueryParam> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl MetricRepository for FakeMetricRepo {
    async fn get_metrics(&self, param: &MetricQueryParam) -> Result<MetricResult, DataError> {
        self.calls.lock().push(param.clone());
        (self.responder)(param)
    }
}

/// Offline store with a fixed answer, recording queries and inserts
pub struct FakeOfflineRepo {
    responder: Responder,
    queries: Mutex<Vec<MetricQueryParam>>,
    inserted: Mutex<Vec<MetricEvent>>,
    fail_insert: bool,
}

impl FakeOfflineRepo {
    pub fn new(
        responder: impl Fn(&MetricQueryParam) -> Result<MetricResult, DataError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            responder: Box::new(responder),
            queries: Mutex::new(Vec::new()),
            inserted: Mutex::new(Vec::new()),
            fail_insert: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(|_| Ok(MetricResult::default()))
    }

    pub fn failing_inserts() -> Self {
        Self {
            fail_insert: true,
            ..Self::empty()
        }
    }

    pub fn queries(&self) -> Vec<MetricQueryParam> {
        self.queries.lock().clone()
    }

    pub fn inserted(&self) -> Vec<MetricEvent> {
        self.inserted.lock().clone()
    }
}

#[async_trait]
impl OfflineMetricRepository for FakeOfflineRepo {
    async fn get_metrics(&self, param: &MetricQueryParam) -> Result<MetricResult, DataError> {
        self.queries.lock().push(param.clone());
        (self.responder)(param)
    }

    async fn insert_metrics(&self, events: Vec<MetricEvent>) -> Result<(), DataError> {
        if self.fail_insert {
            return Err(DataError::insert("offline", "disk full"));
        }
        self.inserted.lock().extend(events);
        Ok(())
    }
}

/// One row carrying `value` under every aggregation alias of `param`
pub fn single_row(param: &MetricQueryParam, value: Value) -> MetricResult {
    let row: MetricRow = param
        .aggregations
        .iter()
        .map(|d| (d.alias.clone(), value.clone()))
        .collect();
    MetricResult { data: vec![row] }
}

pub fn summary(name: &str, aggr_type: AggrType) -> SpanMetric {
    SpanMetric::new(
        name,
        MetricType::Summary,
        SpanScope::All,
        OExpression::new(aggr_type),
        |_| Expression::new("count()"),
    )
}

/// Catalog with one platform and two groups:
/// - `base`: summaries `num`, `den`, the divide `ratio` and the pie `model_pie`
/// - `extra`: `latency` (AVG) and the divide `num_share` reusing `num`
pub fn test_catalog() -> PlatformMetrics {
    let num = summary("num", AggrType::Sum).into_ref();
    let den = summary("den", AggrType::Sum).into_ref();
    let ratio = CompoundMetricDef::divide("ratio", MetricType::Summary, num.clone(), den.clone())
        .into_ref();
    let model_pie = SpanMetric::new(
        "model_pie",
        MetricType::Pie,
        SpanScope::Llm,
        OExpression::new(AggrType::Sum),
        |_| Expression::new("count()"),
    )
    .with_group_by(Dimension::group_by(
        FilterField::new(SPAN_FIELD_MODEL_NAME, FieldType::String),
        SPAN_FIELD_MODEL_NAME,
    ))
    .into_ref();
    let latency = summary("latency", AggrType::Avg).into_ref();
    let num_share =
        CompoundMetricDef::divide("num_share", MetricType::Summary, num.clone(), den.clone())
            .into_ref();

    catalog_with(vec![
        ("base", vec![num, den, ratio, model_pie], Vec::new()),
        ("extra", vec![latency, num_share], Vec::new()),
    ])
}

/// Single-platform catalog over `groups` with a `model_name` drill-down object
pub fn catalog_with(groups: Vec<(&str, Vec<MetricRef>, Vec<String>)>) -> PlatformMetrics {
    let platform = PlatformMetricDef {
        metric_groups: groups.iter().map(|(name, _, _)| name.to_string()).collect(),
        drill_down_objects: Vec::new(),
    };
    PlatformMetrics {
        platform_metric_defs: BTreeMap::from([(PLATFORM.to_string(), platform)]),
        metric_groups: groups
            .into_iter()
            .map(|(name, metric_definitions, drill_down_objects)| {
                (
                    name.to_string(),
                    MetricGroup {
                        metric_definitions,
                        drill_down_objects,
                    },
                )
            })
            .collect(),
        drill_down_objects: BTreeMap::from([(
            SPAN_FIELD_MODEL_NAME.to_string(),
            FilterField::new(SPAN_FIELD_MODEL_NAME, FieldType::String),
        )]),
    }
}

pub struct Harness {
    pub service: MetricsService,
    pub online: Arc<FakeMetricRepo>,
    pub offline: Arc<FakeOfflineRepo>,
}

pub fn harness(catalog: PlatformMetrics, online: FakeMetricRepo) -> Harness {
    harness_with(
        catalog,
        online,
        FakeOfflineRepo::empty(),
        MetricQueryConfig::default(),
        MetricsSettings::default(),
    )
}

pub fn harness_with(
    catalog: PlatformMetrics,
    online: FakeMetricRepo,
    offline: FakeOfflineRepo,
    config: MetricQueryConfig,
    settings: MetricsSettings,
) -> Harness {
    let online = Arc::new(online);
    let offline = Arc::new(offline);
    let deps = MetricsCollaborators {
        metric_repo: online.clone(),
        offline_repo: offline.clone(),
        tenant_provider: Arc::new(FakeTenants),
        filter_builder: Arc::new(FakeFilterBuilder::default()),
        trace_config: Arc::new(StaticTraceConfig::new(config)),
    };
    let service = MetricsService::new(catalog, deps, settings).unwrap();
    Harness {
        service,
        online,
        offline,
    }
}

pub fn disabled(workspaces: &[&str]) -> MetricQueryConfig {
    MetricQueryConfig {
        disabled_workspaces: workspaces.iter().map(|w| w.to_string()).collect::<HashSet<_>>(),
        ..Default::default()
    }
}
