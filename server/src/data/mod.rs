//! Data layer
//!
//! The boundary between the metrics engine and the stores behind it:
//! - `types` - Filter tree, query params, result rows and offline events
//! - `traits` - Repository traits implemented by the online and offline stores
//! - `error` - Error type shared by all repository implementations
//!
//! The engine never talks to a storage engine directly; callers inject
//! implementations of `MetricRepository` and `OfflineMetricRepository`.

pub mod error;
pub mod traits;
pub mod types;

pub use error::DataError;
pub use traits::{MetricRepository, OfflineMetricRepository};
