//! Multi-metric query contract.
//!
//! A query names several metrics, an entity scope and one time bucket. Each
//! storage adapter implements [`MultipleMetricsQueryDAO`] and returns one
//! [`MultipleMetrics`] per stored record id, carrying the decoded values of
//! every requested metric found under that id.

pub mod decode;
pub mod service;

pub use decode::{Decoder, JsonRow, RowSource};
pub use service::MultipleMetricsQueryService;

use crate::error::Result;
use crate::metrics::registry::MetricRegistry;
use crate::metrics::{ENTITY_ID, SERVICE_ID};
use crate::models::TableMetadata;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Subject a query is filtered to.
///
/// With `is_service` the id is matched against the record's own entity id.
/// Otherwise the id names a service and matches every finer-grained entity
/// (instance, endpoint) stored with that service linkage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub is_service: bool,
}

impl Entity {
    pub fn service(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_service: true,
        }
    }

    /// All entities belonging to service `service_id`.
    pub fn of_service(service_id: impl Into<String>) -> Self {
        Self {
            id: service_id.into(),
            is_service: false,
        }
    }

    pub fn unrestricted() -> Self {
        Self::default()
    }

    pub fn build_id(&self) -> &str {
        &self.id
    }

    /// Field and value to filter on, `None` for an unrestricted scope.
    pub fn filter(&self) -> Option<(&'static str, &str)> {
        if self.id.is_empty() {
            None
        } else if self.is_service {
            Some((ENTITY_ID, &self.id))
        } else {
            Some((SERVICE_ID, &self.id))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleMetricsCondition {
    /// Metric names in request order; duplicates are kept.
    pub names: Vec<String>,
    pub entity: Entity,
}

impl MultipleMetricsCondition {
    pub fn new(names: Vec<String>, entity: Entity) -> Self {
        Self { names, entity }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvInt {
    pub id: String,
    pub value: i64,
}

/// Decoded values of one metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsValues {
    pub label: String,
    pub values: Vec<KvInt>,
}

impl MetricsValues {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            values: Vec::new(),
        }
    }

    pub fn add_int_value(&mut self, id: impl Into<String>, value: i64) {
        self.values.push(KvInt {
            id: id.into(),
            value,
        });
    }

    pub fn get(&self, id: &str) -> Option<i64> {
        self.values.iter().find(|kv| kv.id == id).map(|kv| kv.value)
    }
}

/// All values found under one record id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipleMetrics {
    pub id: String,
    pub entity_id: String,
    pub time_bucket: String,
    /// Order across metric names is not significant.
    pub metrics: Vec<MetricsValues>,
}

impl MultipleMetrics {
    pub fn metric(&self, label: &str) -> Option<&MetricsValues> {
        self.metrics.iter().find(|values| values.label == label)
    }
}

/// Backend-specific reader behind [`MultipleMetricsQueryService`].
#[async_trait]
pub trait MultipleMetricsQueryDAO: Send + Sync + 'static {
    async fn read_multiple_metrics(
        &self,
        condition: &MultipleMetricsCondition,
        time_bucket: i64,
    ) -> Result<Vec<MultipleMetrics>>;
}

/// Read-only state shared by every adapter.
#[derive(Clone)]
pub struct QueryContext {
    pub registry: Arc<MetricRegistry>,
    pub metadata: Arc<TableMetadata>,
    pub percentile_ranks: Vec<i32>,
    pub day_step: u32,
}

impl QueryContext {
    pub fn new(registry: Arc<MetricRegistry>, metadata: Arc<TableMetadata>) -> Self {
        Self {
            registry,
            metadata,
            percentile_ranks: crate::metrics::percentile::RANKS.to_vec(),
            day_step: 1,
        }
    }

    pub fn with_percentile_ranks(mut self, ranks: Vec<i32>) -> Self {
        self.percentile_ranks = ranks;
        self
    }

    pub fn with_day_step(mut self, day_step: u32) -> Self {
        self.day_step = day_step.max(1);
        self
    }

    pub fn decoder(&self) -> Decoder<'_> {
        Decoder::new(&self.registry, &self.metadata, &self.percentile_ranks)
    }
}

/// Groups decoded values by record id in first-seen order.
pub(crate) struct ResultCollector {
    time_bucket: String,
    entity_id: String,
    results: Vec<MultipleMetrics>,
    positions: HashMap<String, usize>,
}

impl ResultCollector {
    pub(crate) fn new(condition: &MultipleMetricsCondition, time_bucket: i64) -> Self {
        Self {
            time_bucket: time_bucket.to_string(),
            entity_id: condition.entity.build_id().to_owned(),
            results: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub(crate) fn push(&mut self, id: &str, values: MetricsValues) {
        let position = match self.positions.get(id) {
            Some(position) => *position,
            None => {
                self.results.push(MultipleMetrics {
                    id: id.to_owned(),
                    entity_id: self.entity_id.clone(),
                    time_bucket: self.time_bucket.clone(),
                    metrics: Vec::new(),
                });
                self.positions.insert(id.to_owned(), self.results.len() - 1);
                self.results.len() - 1
            }
        };
        self.results[position].metrics.push(values);
    }

    pub(crate) fn finish(self) -> Vec<MultipleMetrics> {
        self.results
    }
}
