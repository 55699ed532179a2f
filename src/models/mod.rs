//! Storage model descriptors.
//!
//! A [`Model`] is what the aggregation-script compiler emits for one metric:
//! its name and ordered columns, each with a logical name, the name it is
//! stored under and its role. Models are registered with
//! [`TableMetadata`](table_meta::TableMetadata), which the query adapters use to
//! find physical column names.

pub mod table_meta;

pub use table_meta::{ColumnNameResolver, ColumnOverrides, TableMetaInfo, TableMetadata};

use crate::metrics::registry::MetricKind;
use crate::metrics::{avg, percent, percentile, value, ENTITY_ID, SERVICE_ID, TIME_BUCKET};
use serde::{Deserialize, Serialize};

/// Logical and storage name of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnName {
    pub name: String,
    pub storage_name: String,
}

impl ColumnName {
    /// Column stored under its logical name.
    pub fn same(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            storage_name: name.to_owned(),
        }
    }
}

/// What a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Key or linkage column (entity id, service id, time bucket)
    Key,
    /// Accumulator persisted only for merging
    StorageOnly,
    /// The display value of the metric
    Value,
    /// Encoded sparse histogram
    Histogram,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelColumn {
    pub column_name: ColumnName,
    pub role: ColumnRole,
}

impl ModelColumn {
    pub fn new(name: &str, role: ColumnRole) -> Self {
        Self {
            column_name: ColumnName::same(name),
            role,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    pub name: String,
    pub columns: Vec<ModelColumn>,
}

impl Model {
    pub fn new(name: impl Into<String>, columns: Vec<ModelColumn>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Default model for a metric of `kind`: key columns followed by the
    /// kind's accumulators and display value, all stored under their logical
    /// names.
    pub fn for_kind(name: impl Into<String>, kind: MetricKind) -> Self {
        use ColumnRole::*;

        let mut columns = vec![
            ModelColumn::new(ENTITY_ID, Key),
            ModelColumn::new(SERVICE_ID, Key),
            ModelColumn::new(TIME_BUCKET, Key),
        ];
        let kind_columns: &[(&str, ColumnRole)] = match kind {
            MetricKind::Average => &[
                (avg::SUMMATION, StorageOnly),
                (avg::COUNT, StorageOnly),
                (avg::MAX, StorageOnly),
                (avg::MIN, StorageOnly),
                (avg::VALUE, Value),
            ],
            MetricKind::Percentile => &[
                (percentile::PRECISION, StorageOnly),
                (percentile::DATASET, Histogram),
                (percentile::VALUE, Histogram),
            ],
            MetricKind::Percentage => &[
                (percent::TOTAL, StorageOnly),
                (percent::PERCENTAGE, Value),
                (percent::MATCH, StorageOnly),
            ],
            MetricKind::Cpm => &[(value::TOTAL, StorageOnly), (value::VALUE, Value)],
            MetricKind::Sum | MetricKind::Max | MetricKind::SingleValue => {
                &[(value::VALUE, Value)]
            }
        };
        columns.extend(
            kind_columns
                .iter()
                .map(|(column, role)| ModelColumn::new(column, *role)),
        );
        Self::new(name, columns)
    }

    /// Renames the storage name of a logical column.
    pub fn with_storage_name(mut self, logical: &str, storage: &str) -> Self {
        for column in &mut self.columns {
            if column.column_name.name == logical {
                column.column_name.storage_name = storage.to_owned();
            }
        }
        self
    }

    /// Logical name of the display value column, if the model has one.
    pub fn value_column(&self) -> Option<&str> {
        self.columns
            .iter()
            .find(|column| column.role == ColumnRole::Value)
            .map(|column| column.column_name.name.as_str())
    }
}
