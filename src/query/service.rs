use super::{MultipleMetrics, MultipleMetricsCondition, MultipleMetricsQueryDAO};
use crate::error::Result;
use crate::metrics::registry::MetricRegistry;
use crate::models::TableMetadata;
use crate::time_bucket::infer_downsampling;
use std::sync::Arc;
use tracing::{debug, warn};

/// Entry point for multi-metric reads.
///
/// Drops names without both a model and a registered kind, then delegates to
/// the configured storage adapter. No value math happens here.
#[derive(Clone)]
pub struct MultipleMetricsQueryService {
    registry: Arc<MetricRegistry>,
    metadata: Arc<TableMetadata>,
    dao: Arc<dyn MultipleMetricsQueryDAO>,
}

impl MultipleMetricsQueryService {
    pub fn new(
        registry: Arc<MetricRegistry>,
        metadata: Arc<TableMetadata>,
        dao: Arc<dyn MultipleMetricsQueryDAO>,
    ) -> Self {
        Self {
            registry,
            metadata,
            dao,
        }
    }

    pub async fn read_multiple_metrics(
        &self,
        condition: &MultipleMetricsCondition,
        time_bucket: i64,
    ) -> Result<Vec<MultipleMetrics>> {
        infer_downsampling(time_bucket)?;

        let (known, dropped): (Vec<String>, Vec<String>) = condition
            .names
            .iter()
            .cloned()
            .partition(|name| self.metadata.contains(name) && self.registry.contains(name));
        if !dropped.is_empty() {
            warn!(?dropped, "Ignoring unregistered metric names");
        }
        if known.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            metrics = ?known,
            entity = %condition.entity.id,
            is_service = condition.entity.is_service,
            time_bucket,
            "Reading multiple metrics"
        );
        let filtered = MultipleMetricsCondition::new(known, condition.entity.clone());
        self.dao.read_multiple_metrics(&filtered, time_bucket).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::metrics::MetricKind;
    use crate::models::Model;
    use crate::query::Entity;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingDao {
        seen: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl MultipleMetricsQueryDAO for RecordingDao {
        async fn read_multiple_metrics(
            &self,
            condition: &MultipleMetricsCondition,
            _time_bucket: i64,
        ) -> Result<Vec<MultipleMetrics>> {
            self.seen.lock().push(condition.names.clone());
            Ok(Vec::new())
        }
    }

    fn service(dao: Arc<RecordingDao>) -> MultipleMetricsQueryService {
        let mut builder = MetricRegistry::builder();
        builder
            .register_kind("resp_time", MetricKind::Average)
            .unwrap()
            .register_kind("kind_only", MetricKind::Sum)
            .unwrap();
        let metadata = TableMetadata::new();
        metadata.add_model(Model::for_kind("resp_time", MetricKind::Average));
        metadata.add_model(Model::for_kind("model_only", MetricKind::Sum));
        MultipleMetricsQueryService::new(Arc::new(builder.build()), Arc::new(metadata), dao)
    }

    #[tokio::test]
    async fn test_unknown_names_are_dropped() {
        let dao = Arc::new(RecordingDao::default());
        let service = service(dao.clone());
        let condition = MultipleMetricsCondition::new(
            vec![
                "resp_time".into(),
                "never_registered".into(),
                "kind_only".into(),
                "model_only".into(),
                "resp_time".into(),
            ],
            Entity::service("svc-A"),
        );

        service.read_multiple_metrics(&condition, 202401011200).await.unwrap();
        assert_eq!(*dao.seen.lock(), vec![vec!["resp_time".to_owned(), "resp_time".to_owned()]]);
    }

    #[tokio::test]
    async fn test_nothing_known_skips_backend() {
        let dao = Arc::new(RecordingDao::default());
        let service = service(dao.clone());
        let condition = MultipleMetricsCondition::new(vec!["nope".into()], Entity::service("svc-A"));

        let results = service.read_multiple_metrics(&condition, 202401011200).await.unwrap();
        assert!(results.is_empty());
        assert!(dao.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_time_bucket() {
        let dao = Arc::new(RecordingDao::default());
        let service = service(dao);
        let condition = MultipleMetricsCondition::new(vec!["resp_time".into()], Entity::service("svc-A"));
        assert!(matches!(
            service.read_multiple_metrics(&condition, 2024).await,
            Err(Error::InvalidTimeBucket(2024))
        ));
    }
}
