//! Document-store adapter.
//!
//! One search fans out over the physical indices of every requested metric.
//! Each hit's index is mapped back to its logical metric name and the hit's
//! document id becomes the record id.

use crate::error::{Error, Result};
use crate::metrics::TIME_BUCKET;
use crate::query::{
    JsonRow, MultipleMetrics, MultipleMetricsCondition, MultipleMetricsQueryDAO, QueryContext,
    ResultCollector,
};
use crate::time_bucket::IndexNameMaker;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::Arc;
use tracing::debug;

/// One search hit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Map<String, JsonValue>,
}

/// Search client handle injected by the application.
#[async_trait]
pub trait SearchClient: Send + Sync + 'static {
    /// Name the index is stored under, e.g. with a namespace prefix.
    fn format_index_name(&self, name: &str) -> String;

    /// Runs one query across `indices`, which are already formatted.
    async fn search(&self, indices: &[String], body: &JsonValue) -> Result<Vec<SearchHit>>;
}

pub struct ElasticsearchMetricsQuery {
    client: Arc<dyn SearchClient>,
    context: QueryContext,
    max_hits: usize,
}

impl ElasticsearchMetricsQuery {
    pub fn new(client: Arc<dyn SearchClient>, context: QueryContext, max_hits: usize) -> Self {
        Self {
            client,
            context,
            max_hits,
        }
    }

    fn build_query(&self, condition: &MultipleMetricsCondition, time_bucket: i64) -> JsonValue {
        let mut must = vec![json!({ "term": { TIME_BUCKET: time_bucket } })];
        if let Some((field, id)) = condition.entity.filter() {
            must.push(json!({ "term": { field: id } }));
        }
        json!({
            "size": self.max_hits,
            "query": { "bool": { "must": must } }
        })
    }
}

#[async_trait]
impl MultipleMetricsQueryDAO for ElasticsearchMetricsQuery {
    async fn read_multiple_metrics(
        &self,
        condition: &MultipleMetricsCondition,
        time_bucket: i64,
    ) -> Result<Vec<MultipleMetrics>> {
        let maker = IndexNameMaker::new(&condition.names, time_bucket, self.context.day_step)?;
        let index_to_metric = maker.make_map(|name| self.client.format_index_name(name));
        let indices: Vec<String> = maker
            .make()
            .iter()
            .map(|name| self.client.format_index_name(name))
            .collect();

        let body = self.build_query(condition, time_bucket);
        debug!(?indices, query = %body, "Searching metric indices");
        let hits = self.client.search(&indices, &body).await?;
        debug!(hits = hits.len(), "Search returned");

        let decoder = self.context.decoder();
        let mut collector = ResultCollector::new(condition, time_bucket);
        for hit in &hits {
            if hit.id.is_empty() {
                continue;
            }
            let metric_name = index_to_metric.get(&hit.index).ok_or_else(|| {
                Error::Decode(format!("hit from unrequested index {}", hit.index))
            })?;
            let values = decoder.decode(metric_name, &JsonRow::new(&hit.source))?;
            collector.push(&hit.id, values);
        }
        Ok(collector.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricRegistry;
    use crate::models::TableMetadata;
    use crate::query::Entity;

    struct NoopClient;

    #[async_trait]
    impl SearchClient for NoopClient {
        fn format_index_name(&self, name: &str) -> String {
            name.to_owned()
        }

        async fn search(&self, _indices: &[String], _body: &JsonValue) -> Result<Vec<SearchHit>> {
            Ok(Vec::new())
        }
    }

    fn query() -> ElasticsearchMetricsQuery {
        let context = QueryContext::new(
            Arc::new(MetricRegistry::default()),
            Arc::new(TableMetadata::new()),
        );
        ElasticsearchMetricsQuery::new(Arc::new(NoopClient), context, 500)
    }

    #[test]
    fn test_query_filters_on_entity_id_for_services() {
        let condition = MultipleMetricsCondition::new(vec![], Entity::service("svc-A"));
        let body = query().build_query(&condition, 202401011200);
        assert_eq!(body["size"], 500);
        assert_eq!(
            body["query"]["bool"]["must"],
            json!([
                { "term": { "time_bucket": 202401011200_i64 } },
                { "term": { "entity_id": "svc-A" } }
            ])
        );
    }

    #[test]
    fn test_query_filters_on_service_id_for_children() {
        let condition = MultipleMetricsCondition::new(vec![], Entity::of_service("svc-A"));
        let body = query().build_query(&condition, 202401011200);
        assert_eq!(body["query"]["bool"]["must"][1], json!({ "term": { "service_id": "svc-A" } }));
    }

    #[test]
    fn test_unrestricted_query_has_only_time_bucket() {
        let condition = MultipleMetricsCondition::new(vec![], Entity::unrestricted());
        let body = query().build_query(&condition, 20240101);
        assert_eq!(body["query"]["bool"]["must"].as_array().map(Vec::len), Some(1));
    }
}
