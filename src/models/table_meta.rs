//! Metric name → column metadata.
//!
//! Lookups go through two levels: an optional [`ColumnNameResolver`] supplied
//! per deployment (relational reserved-word renames, for instance) and then the
//! static logical → storage mapping taken from the registered [`Model`].

use super::Model;
use crate::error::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Per-deployment column rename layer consulted before the model mapping.
pub trait ColumnNameResolver: Send + Sync + 'static {
    fn storage_name(&self, metric_name: &str, column: &str) -> Option<String>;
}

/// Static rename table: per-metric entries win over global ones.
#[derive(Debug, Clone, Default)]
pub struct ColumnOverrides {
    global: HashMap<String, String>,
    per_metric: HashMap<String, HashMap<String, String>>,
}

impl ColumnOverrides {
    pub fn new(
        global: HashMap<String, String>,
        per_metric: HashMap<String, HashMap<String, String>>,
    ) -> Self {
        Self { global, per_metric }
    }

    pub fn rename(mut self, column: &str, storage_name: &str) -> Self {
        self.global.insert(column.to_owned(), storage_name.to_owned());
        self
    }

    pub fn rename_for(mut self, metric_name: &str, column: &str, storage_name: &str) -> Self {
        self.per_metric
            .entry(metric_name.to_owned())
            .or_default()
            .insert(column.to_owned(), storage_name.to_owned());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty() && self.per_metric.is_empty()
    }
}

impl ColumnNameResolver for ColumnOverrides {
    fn storage_name(&self, metric_name: &str, column: &str) -> Option<String> {
        self.per_metric
            .get(metric_name)
            .and_then(|columns| columns.get(column))
            .or_else(|| self.global.get(column))
            .cloned()
    }
}

/// Column mapping of one model.
#[derive(Debug, Clone)]
pub struct TableMetaInfo {
    pub model: Model,
    /// logical → storage
    pub column_and_storage_map: HashMap<String, String>,
    /// Logical name of the display value column
    pub value_column: Option<String>,
}

impl TableMetaInfo {
    fn from_model(model: Model) -> Self {
        let column_and_storage_map = model
            .columns
            .iter()
            .map(|column| {
                (
                    column.column_name.name.clone(),
                    column.column_name.storage_name.clone(),
                )
            })
            .collect();
        let value_column = model.value_column().map(str::to_owned);
        Self {
            model,
            column_and_storage_map,
            value_column,
        }
    }
}

/// Shared column metadata for all registered models.
///
/// Re-adding a model replaces its mapping as a whole, so schema reloads never
/// leave a mix of old and new columns visible to queries.
#[derive(Default)]
pub struct TableMetadata {
    tables: RwLock<HashMap<String, Arc<TableMetaInfo>>>,
    overrides: Option<Arc<dyn ColumnNameResolver>>,
}

impl TableMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: Arc<dyn ColumnNameResolver>) -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            overrides: Some(overrides),
        }
    }

    pub fn add_model(&self, model: Model) {
        debug!(model = %model.name, columns = model.columns.len(), "Registering table metadata");
        let info = Arc::new(TableMetaInfo::from_model(model));
        self.tables.write().insert(info.model.name.clone(), info);
    }

    pub fn resolve(&self, metric_name: &str) -> Result<Arc<TableMetaInfo>> {
        self.tables
            .read()
            .get(metric_name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no table metadata for {}", metric_name)))
    }

    pub fn contains(&self, metric_name: &str) -> bool {
        self.tables.read().contains_key(metric_name)
    }

    /// Names of all registered models.
    pub fn model_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Physical name of a logical column: override first, then the model.
    pub fn physical_name(&self, metric_name: &str, column: &str) -> Result<String> {
        if let Some(renamed) = self
            .overrides
            .as_ref()
            .and_then(|overrides| overrides.storage_name(metric_name, column))
        {
            return Ok(renamed);
        }

        self.resolve(metric_name)?
            .column_and_storage_map
            .get(column)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("column {} is not defined for {}", column, metric_name))
            })
    }

    /// Logical name of the display value column of a metric.
    pub fn value_column(&self, metric_name: &str) -> Result<String> {
        self.resolve(metric_name)?
            .value_column
            .clone()
            .ok_or_else(|| Error::NotFound(format!("{} declares no value column", metric_name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKind;

    #[test]
    fn test_resolve_unregistered() {
        let metadata = TableMetadata::new();
        assert!(matches!(metadata.resolve("missing"), Err(Error::NotFound(_))));
        assert!(metadata.physical_name("missing", "value").is_err());
    }

    #[test]
    fn test_static_mapping() {
        let metadata = TableMetadata::new();
        metadata.add_model(
            Model::for_kind("service_resp_time", MetricKind::Average)
                .with_storage_name("value", "avg_value"),
        );
        assert_eq!(
            metadata.physical_name("service_resp_time", "value").unwrap(),
            "avg_value"
        );
        assert_eq!(metadata.physical_name("service_resp_time", "count").unwrap(), "count");
        assert!(matches!(
            metadata.physical_name("service_resp_time", "dataset"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_override_takes_precedence() {
        let overrides = ColumnOverrides::default()
            .rename("match", "match_num")
            .rename_for("service_sla", "match", "sla_match");
        let metadata = TableMetadata::with_overrides(Arc::new(overrides));
        metadata.add_model(Model::for_kind("service_sla", MetricKind::Percentage));
        metadata.add_model(Model::for_kind("endpoint_sla", MetricKind::Percentage));

        assert_eq!(metadata.physical_name("service_sla", "match").unwrap(), "sla_match");
        assert_eq!(metadata.physical_name("endpoint_sla", "match").unwrap(), "match_num");
        assert_eq!(metadata.physical_name("endpoint_sla", "total").unwrap(), "total");
        // logical keys are still those of the model
        assert!(metadata
            .resolve("endpoint_sla")
            .unwrap()
            .column_and_storage_map
            .contains_key("match"));
    }

    #[test]
    fn test_add_model_replaces_mapping() {
        let metadata = TableMetadata::new();
        metadata.add_model(Model::for_kind("m", MetricKind::Average));
        metadata.add_model(Model::for_kind("m", MetricKind::Sum));
        assert!(metadata.physical_name("m", "summation").is_err());
        assert_eq!(metadata.value_column("m").unwrap(), "value");
    }
}
