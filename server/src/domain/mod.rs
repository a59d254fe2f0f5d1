//! Domain logic
//!
//! - `metrics` - metric definitions, realtime queries and offline backfill

pub mod metrics;

pub use metrics::{MetricError, MetricsService};
