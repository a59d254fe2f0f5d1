//! Collaborators consumed by the metrics engine
//!
//! Span filters, tenant resolution and runtime query configuration are owned
//! by other parts of the platform. The engine sees them only through these
//! traits and receives implementations at construction.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::MetricError;
use super::types::SpanEnv;
use crate::data::types::FilterField;

/// Platform-specific span filter
#[async_trait]
pub trait SpanFilter: Send + Sync {
    /// Base filter applied to every query on this platform. The flag forces a
    /// query even when the returned filter is empty.
    async fn build_basic_span_filter(
        &self,
        env: &SpanEnv,
    ) -> Result<(Vec<FilterField>, bool), MetricError>;

    /// Restrict to root spans
    async fn build_root_span_filter(&self, env: &SpanEnv)
    -> Result<Vec<FilterField>, MetricError>;

    /// Restrict to model-call spans
    async fn build_llm_span_filter(&self, env: &SpanEnv) -> Result<Vec<FilterField>, MetricError>;

    /// No restriction beyond the platform
    async fn build_all_span_filter(&self, env: &SpanEnv) -> Result<Vec<FilterField>, MetricError>;
}

/// Resolves the span filter for a platform
#[async_trait]
pub trait SpanFilterBuilder: Send + Sync {
    async fn build_platform_related_filter(
        &self,
        platform_type: &str,
    ) -> Result<Arc<dyn SpanFilter>, MetricError>;
}

/// Resolves the storage tenants holding a platform's spans
#[async_trait]
pub trait TenantProvider: Send + Sync {
    async fn get_metric_tenants_by_platform_type(
        &self,
        platform_type: &str,
    ) -> Result<Vec<String>, MetricError>;
}

/// Runtime switches for the query path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricQueryConfig {
    /// Route old ranges to the offline store
    pub support_offline: bool,
    /// Ranges ending before local midnight this many days ago are served offline
    pub offline_critical_point_days: u32,
    /// Workspaces whose queries return an empty response
    pub disabled_workspaces: HashSet<String>,
}

/// Source of `MetricQueryConfig`, read on every query
pub trait TraceConfigProvider: Send + Sync {
    fn get_metric_query_config(&self) -> MetricQueryConfig;
}

/// Config provider serving a value fixed at startup
#[derive(Debug, Clone, Default)]
pub struct StaticTraceConfig {
    config: MetricQueryConfig,
}

impl StaticTraceConfig {
    pub fn new(config: MetricQueryConfig) -> Self {
        Self { config }
    }
}

impl TraceConfigProvider for StaticTraceConfig {
    fn get_metric_query_config(&self) -> MetricQueryConfig {
        self.config.clone()
    }
}
