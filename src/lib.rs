//! Metrics aggregation and multi-backend query core of an APM backend.
//!
//! Metric kinds define how partial aggregates combine and how display values
//! are derived ([`metrics`]). Registered models describe how each metric is
//! stored ([`models`]), [`time_bucket`] derives the physical names of a time
//! bucket and [`query`] reads several metrics of one entity at once through
//! one of the [`storage`] adapters.

pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod query;
pub mod storage;
pub mod time_bucket;

// Re-export commonly used types
pub use error::{Error, Result};
pub use metrics::{MetricKind, MetricRegistry, Metrics, MetricsMeta, MetricsRecord};
pub use models::{Model, TableMetadata};
pub use query::{Entity, MultipleMetrics, MultipleMetricsCondition, MultipleMetricsQueryService};
pub use storage::{BackendClients, QueryBackend};
