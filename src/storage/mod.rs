//! Storage backends for multi-metric reads.
//!
//! Three adapters implement [`MultipleMetricsQueryDAO`]:
//! - [`elasticsearch`]: one search across the physical indices of all metrics
//! - [`influxdb`]: one command of per-measurement statements
//! - [`duckdb`]: one statement per metric over a pooled connection
//!
//! Exactly one is active per deployment, selected by `storage.engine`.
//! Search and time-series clients are injected by the application; the
//! relational pool is opened from the connection string.

pub mod duckdb;
pub mod elasticsearch;
pub mod influxdb;
pub mod pool;

pub use self::duckdb::DuckDbMetricsQuery;
pub use self::elasticsearch::{ElasticsearchMetricsQuery, SearchClient, SearchHit};
pub use self::influxdb::{InfluxDbMetricsQuery, QueryResult, Series, TimeSeriesClient};
pub use self::pool::{DuckDbPool, PooledConnection};

use crate::config::ServiceConfig;
use crate::error::{Error, Result};
use crate::query::{MultipleMetrics, MultipleMetricsCondition, MultipleMetricsQueryDAO, QueryContext};
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Prefixes `name` with `namespace_` unless the namespace is empty.
pub fn format_with_namespace(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_owned()
    } else {
        format!("{}_{}", namespace, name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageEngine {
    Elasticsearch,
    InfluxDb,
    DuckDb,
}

impl FromStr for StorageEngine {
    type Err = Error;

    fn from_str(engine: &str) -> Result<Self> {
        match engine.to_ascii_lowercase().as_str() {
            "elasticsearch" | "es" => Ok(StorageEngine::Elasticsearch),
            "influxdb" | "influx" => Ok(StorageEngine::InfluxDb),
            "duckdb" => Ok(StorageEngine::DuckDb),
            _ => Err(Error::Config(format!("Unsupported storage engine: {}", engine))),
        }
    }
}

impl fmt::Display for StorageEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageEngine::Elasticsearch => "elasticsearch",
            StorageEngine::InfluxDb => "influxdb",
            StorageEngine::DuckDb => "duckdb",
        })
    }
}

/// Client handles supplied by the application.
#[derive(Clone, Default)]
pub struct BackendClients {
    pub search: Option<Arc<dyn SearchClient>>,
    pub time_series: Option<Arc<dyn TimeSeriesClient>>,
    /// Relational pool; opened from `storage.connection` when absent.
    pub relational: Option<DuckDbPool>,
}

/// The configured adapter.
pub enum QueryBackend {
    Elasticsearch(ElasticsearchMetricsQuery),
    InfluxDb(InfluxDbMetricsQuery),
    DuckDb(DuckDbMetricsQuery),
}

impl AsRef<dyn MultipleMetricsQueryDAO> for QueryBackend {
    fn as_ref(&self) -> &(dyn MultipleMetricsQueryDAO + 'static) {
        match self {
            QueryBackend::Elasticsearch(backend) => backend,
            QueryBackend::InfluxDb(backend) => backend,
            QueryBackend::DuckDb(backend) => backend,
        }
    }
}

impl QueryBackend {
    /// Builds the adapter selected by `storage.engine`.
    pub fn from_config(
        config: &ServiceConfig,
        context: QueryContext,
        clients: BackendClients,
    ) -> Result<Self> {
        let engine: StorageEngine = config.storage.engine.parse()?;
        let context = context
            .with_percentile_ranks(config.query.percentile_ranks.clone())
            .with_day_step(config.naming.day_step);
        info!(%engine, "Selecting storage backend");

        match engine {
            StorageEngine::Elasticsearch => {
                let client = clients.search.ok_or_else(|| {
                    Error::Config("elasticsearch engine selected without a search client".to_string())
                })?;
                Ok(QueryBackend::Elasticsearch(ElasticsearchMetricsQuery::new(
                    client,
                    context,
                    config.query.max_hits,
                )))
            }
            StorageEngine::InfluxDb => {
                let client = clients.time_series.ok_or_else(|| {
                    Error::Config("influxdb engine selected without a time-series client".to_string())
                })?;
                Ok(QueryBackend::InfluxDb(InfluxDbMetricsQuery::new(
                    client,
                    context,
                    config.query.database.clone(),
                )))
            }
            StorageEngine::DuckDb => {
                let pool = match clients.relational {
                    Some(pool) => pool,
                    None => DuckDbPool::open(&config.storage.connection, config.relational.pool_size)?,
                };
                Ok(QueryBackend::DuckDb(DuckDbMetricsQuery::new(
                    pool,
                    context,
                    config.naming.namespace.clone(),
                )))
            }
        }
    }

    pub fn engine(&self) -> StorageEngine {
        match self {
            QueryBackend::Elasticsearch(_) => StorageEngine::Elasticsearch,
            QueryBackend::InfluxDb(_) => StorageEngine::InfluxDb,
            QueryBackend::DuckDb(_) => StorageEngine::DuckDb,
        }
    }

    pub fn as_influxdb(&self) -> Option<&InfluxDbMetricsQuery> {
        match self {
            QueryBackend::InfluxDb(backend) => Some(backend),
            _ => None,
        }
    }

    pub fn as_duckdb(&self) -> Option<&DuckDbMetricsQuery> {
        match self {
            QueryBackend::DuckDb(backend) => Some(backend),
            _ => None,
        }
    }
}

#[async_trait]
impl MultipleMetricsQueryDAO for QueryBackend {
    async fn read_multiple_metrics(
        &self,
        condition: &MultipleMetricsCondition,
        time_bucket: i64,
    ) -> Result<Vec<MultipleMetrics>> {
        self.as_ref().read_multiple_metrics(condition, time_bucket).await
    }
}
