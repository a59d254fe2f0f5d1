//! Metrics engine
//!
//! Serves realtime metric queries over the span store and backfills the
//! offline store:
//! - `definition`, `wrappers`, `library` - metric definitions and the built-in set
//! - `catalog`, `registry` - platforms, groups and drill-down objects
//! - `query`, `request_filter`, `format`, `compound` - the realtime query path
//! - `offline`, `traverse`, `drilldown` - pre-aggregated metrics
//! - `service` - `MetricsService`, the entry point wiring it all together

pub mod catalog;
pub mod compound;
pub mod definition;
pub mod drilldown;
pub mod error;
pub mod format;
pub mod library;
pub mod offline;
pub mod providers;
pub mod query;
pub mod registry;
pub mod request_filter;
pub mod service;
pub mod traverse;
pub mod types;
pub mod wrappers;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{CatalogConfig, PlatformMetrics};
pub use definition::{MetricDefinition, MetricRef};
pub use drilldown::DrillDownValueType;
pub use error::MetricError;
pub use providers::{
    MetricQueryConfig, SpanFilter, SpanFilterBuilder, StaticTraceConfig, TenantProvider,
    TraceConfigProvider,
};
pub use registry::MetricRegistry;
pub use service::{DrillDownValuesReq, MetricsCollaborators, MetricsService, MetricsSettings};
pub use traverse::TraverseSettings;
pub use types::{
    Compare, GetMetricsResp, Metric, MetricPoint, QueryMetricsReq, QueryMetricsResp,
    TraverseMetricsReq, TraverseMetricsResp,
};
