//! Common test utilities: a registered model catalog and in-process fake
//! search and time-series clients.

#![allow(dead_code)]

use apm_metrics_core::models::{ColumnNameResolver, ColumnOverrides};
use apm_metrics_core::query::QueryContext;
use apm_metrics_core::storage::{QueryResult, SearchClient, SearchHit, TimeSeriesClient};
use apm_metrics_core::{Error, MetricKind, MetricRegistry, Model, Result, TableMetadata};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;

pub const RESP_TIME: &str = "service_resp_time";
pub const SLA: &str = "service_sla";
pub const PERCENTILE: &str = "service_percentile";
pub const CPM: &str = "service_cpm";
pub const ENDPOINT_CPM: &str = "endpoint_cpm";

pub const MINUTE: i64 = 202401011200;

pub struct Catalog {
    pub registry: Arc<MetricRegistry>,
    pub metadata: Arc<TableMetadata>,
}

impl Catalog {
    pub fn context(&self) -> QueryContext {
        QueryContext::new(self.registry.clone(), self.metadata.clone())
    }
}

pub fn models() -> Vec<Model> {
    vec![
        Model::for_kind(RESP_TIME, MetricKind::Average),
        Model::for_kind(SLA, MetricKind::Percentage),
        Model::for_kind(PERCENTILE, MetricKind::Percentile),
        Model::for_kind(CPM, MetricKind::Cpm),
        Model::for_kind(ENDPOINT_CPM, MetricKind::Cpm),
    ]
}

fn build(metadata: TableMetadata) -> Catalog {
    let mut builder = MetricRegistry::builder();
    builder
        .register_kind(RESP_TIME, MetricKind::Average)
        .and_then(|b| b.register_kind(SLA, MetricKind::Percentage))
        .and_then(|b| b.register_kind(PERCENTILE, MetricKind::Percentile))
        .and_then(|b| b.register_kind(CPM, MetricKind::Cpm))
        .and_then(|b| b.register_kind(ENDPOINT_CPM, MetricKind::Cpm))
        .expect("fixture registration");
    for model in models() {
        metadata.add_model(model);
    }
    Catalog {
        registry: Arc::new(builder.build()),
        metadata: Arc::new(metadata),
    }
}

pub fn catalog() -> Catalog {
    build(TableMetadata::new())
}

pub fn catalog_with_overrides(overrides: ColumnOverrides) -> Catalog {
    let resolver: Arc<dyn ColumnNameResolver> = Arc::new(overrides);
    build(TableMetadata::with_overrides(resolver))
}

/// One stored document.
#[derive(Clone)]
pub struct Document {
    pub index: String,
    pub id: String,
    pub source: Map<String, JsonValue>,
}

impl Document {
    pub fn new(index: &str, id: &str, source: JsonValue) -> Self {
        let source = match source {
            JsonValue::Object(map) => map,
            other => panic!("document source must be an object: {}", other),
        };
        Self {
            index: index.to_owned(),
            id: id.to_owned(),
            source,
        }
    }
}

/// Search client over an in-memory document list. Applies the `term`
/// clauses of a bool query and the `size` limit.
#[derive(Default)]
pub struct FakeSearchClient {
    pub namespace: String,
    pub documents: Vec<Document>,
    pub fail_with: Option<String>,
    pub requests: Mutex<Vec<(Vec<String>, JsonValue)>>,
}

impl FakeSearchClient {
    pub fn with_documents(documents: Vec<Document>) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }
}

fn matches_terms(source: &Map<String, JsonValue>, body: &JsonValue) -> bool {
    let must = body["query"]["bool"]["must"].as_array().cloned().unwrap_or_default();
    must.iter().all(|clause| {
        clause["term"]
            .as_object()
            .map(|term| term.iter().all(|(field, value)| source.get(field) == Some(value)))
            .unwrap_or(false)
    })
}

#[async_trait]
impl SearchClient for FakeSearchClient {
    fn format_index_name(&self, name: &str) -> String {
        if self.namespace.is_empty() {
            name.to_owned()
        } else {
            format!("{}_{}", self.namespace, name)
        }
    }

    async fn search(&self, indices: &[String], body: &JsonValue) -> Result<Vec<SearchHit>> {
        self.requests.lock().push((indices.to_vec(), body.clone()));
        if let Some(message) = &self.fail_with {
            return Err(Error::BackendIo(message.clone()));
        }
        let size = body["size"].as_u64().unwrap_or(10) as usize;
        Ok(self
            .documents
            .iter()
            .filter(|doc| indices.contains(&doc.index) && matches_terms(&doc.source, body))
            .take(size)
            .map(|doc| SearchHit {
                index: doc.index.clone(),
                id: doc.id.clone(),
                source: doc.source.clone(),
            })
            .collect())
    }
}

/// Time-series client returning canned results and recording commands.
pub struct FakeTimeSeriesClient {
    pub results: Result<Vec<QueryResult>>,
    pub commands: Mutex<Vec<String>>,
}

impl FakeTimeSeriesClient {
    pub fn new(results: Vec<QueryResult>) -> Self {
        Self {
            results: Ok(results),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            results: Err(Error::BackendIo(message.to_owned())),
            commands: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TimeSeriesClient for FakeTimeSeriesClient {
    async fn query(&self, command: &str) -> Result<Vec<QueryResult>> {
        self.commands.lock().push(command.to_owned());
        match &self.results {
            Ok(results) => Ok(results.clone()),
            Err(err) => Err(Error::BackendIo(err.to_string())),
        }
    }
}

/// Source document of an Average record.
pub fn avg_source(entity: &str, service: &str, value: i64, count: i64, max: i64, min: i64) -> JsonValue {
    json!({
        "entity_id": entity,
        "service_id": service,
        "time_bucket": MINUTE,
        "summation": value * count,
        "count": count,
        "max": max,
        "min": min,
        "value": value,
    })
}

/// Source document of a Percentage record.
pub fn sla_source(entity: &str, service: &str, matched: i64, total: i64) -> JsonValue {
    json!({
        "entity_id": entity,
        "service_id": service,
        "time_bucket": MINUTE,
        "match": matched,
        "total": total,
        "percentage": matched * 10000 / total,
    })
}
