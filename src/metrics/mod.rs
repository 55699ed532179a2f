//! Mergeable metric records.
//!
//! Every metric kind keeps raw accumulators and one or more display fields.
//! The aggregation pipeline feeds partial aggregates through each kind's
//! `combine` entrance or merges whole records with [`Metrics::merge`], then calls
//! [`Metrics::calculate`] once per flush to derive the display fields. Merging
//! must only ever read accumulators so that combines may arrive in any order
//! and grouping from any number of workers.

pub mod avg;
pub mod data_table;
pub mod percent;
pub mod percentile;
pub mod registry;
pub mod value;

pub use avg::LongAvgMetrics;
pub use data_table::DataTable;
pub use percent::PercentMetrics;
pub use percentile::PercentileMetrics;
pub use registry::{MetricKind, MetricKindDescriptor, MetricRegistry, MetricRegistryBuilder};
pub use value::{CpmMetrics, MaxMetrics, SumMetrics};

use crate::error::{Error, Result};
use crate::time_bucket::{to_day_bucket, to_hour_bucket};
use serde::{Deserialize, Serialize};

/// Storage id of a metrics record.
pub const ID: &str = "id";
pub const ENTITY_ID: &str = "entity_id";
pub const SERVICE_ID: &str = "service_id";
pub const TIME_BUCKET: &str = "time_bucket";

/// Composite key of a metrics record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricsMeta {
    pub entity_id: String,
    /// Owning service for endpoint or instance level entities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_id: Option<String>,
    pub time_bucket: i64,
}

impl MetricsMeta {
    pub fn new(entity_id: impl Into<String>, time_bucket: i64) -> Self {
        Self {
            entity_id: entity_id.into(),
            service_id: None,
            time_bucket,
        }
    }

    pub fn with_service(mut self, service_id: impl Into<String>) -> Self {
        self.service_id = Some(service_id.into());
        self
    }

    pub fn id(&self) -> String {
        format!("{}_{}", self.time_bucket, self.entity_id)
    }
}

/// Scalar stored in one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StorageValue {
    Long(i64),
    Text(String),
}

/// Contract shared by all metric kinds.
pub trait Metrics: Clone + Send + Sync + 'static {
    const KIND: MetricKind;

    fn meta(&self) -> &MetricsMeta;

    fn meta_mut(&mut self) -> &mut MetricsMeta;

    /// Merges another record of the same kind by its accumulators.
    fn merge(&mut self, other: &Self);

    /// Derives the display fields from the accumulators only. Calling it again
    /// without an intervening combine gives the same result.
    fn calculate(&mut self) -> Result<()>;

    /// Kind-specific logical columns and values.
    fn storage_columns(&self) -> Vec<(&'static str, StorageValue)>;

    fn id(&self) -> String {
        self.meta().id()
    }

    /// Copy re-keyed to the hour bucket. Display fields need recalculating.
    fn to_hour(&self) -> Result<Self> {
        let mut hour = self.clone();
        hour.meta_mut().time_bucket = to_hour_bucket(self.meta().time_bucket)?;
        Ok(hour)
    }

    /// Copy re-keyed to the day bucket. Display fields need recalculating.
    fn to_day(&self) -> Result<Self> {
        let mut day = self.clone();
        day.meta_mut().time_bucket = to_day_bucket(self.meta().time_bucket)?;
        Ok(day)
    }

    /// Full row: id, key columns and kind columns.
    fn to_storage(&self) -> Vec<(&'static str, StorageValue)> {
        let meta = self.meta();
        let mut row = vec![
            (ID, StorageValue::Text(meta.id())),
            (ENTITY_ID, StorageValue::Text(meta.entity_id.clone())),
            (TIME_BUCKET, StorageValue::Long(meta.time_bucket)),
        ];
        if let Some(service_id) = &meta.service_id {
            row.push((SERVICE_ID, StorageValue::Text(service_id.clone())));
        }
        row.extend(self.storage_columns());
        row
    }
}

/// A record of any kind, for code that handles kinds dynamically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum MetricsRecord {
    Average(LongAvgMetrics),
    Percentile(PercentileMetrics),
    Percentage(PercentMetrics),
    Cpm(CpmMetrics),
    Sum(SumMetrics),
    Max(MaxMetrics),
}

macro_rules! dispatch {
    ($record:expr, $inner:ident => $body:expr) => {
        match $record {
            MetricsRecord::Average($inner) => $body,
            MetricsRecord::Percentile($inner) => $body,
            MetricsRecord::Percentage($inner) => $body,
            MetricsRecord::Cpm($inner) => $body,
            MetricsRecord::Sum($inner) => $body,
            MetricsRecord::Max($inner) => $body,
        }
    };
}

impl MetricsRecord {
    /// Empty record of `kind`. `SingleValue` has no concrete record.
    pub fn empty(kind: MetricKind, meta: MetricsMeta) -> Result<Self> {
        Ok(match kind {
            MetricKind::Average => MetricsRecord::Average(LongAvgMetrics::new(meta)),
            MetricKind::Percentile => MetricsRecord::Percentile(PercentileMetrics::new(meta, 1)),
            MetricKind::Percentage => MetricsRecord::Percentage(PercentMetrics::new(meta)),
            MetricKind::Cpm => MetricsRecord::Cpm(CpmMetrics::new(meta)),
            MetricKind::Sum => MetricsRecord::Sum(SumMetrics::new(meta)),
            MetricKind::Max => MetricsRecord::Max(MaxMetrics::new(meta)),
            MetricKind::SingleValue => {
                return Err(Error::InvalidState(
                    "SingleValue is abstract and has no record type".to_owned(),
                ))
            }
        })
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricsRecord::Average(_) => LongAvgMetrics::KIND,
            MetricsRecord::Percentile(_) => PercentileMetrics::KIND,
            MetricsRecord::Percentage(_) => PercentMetrics::KIND,
            MetricsRecord::Cpm(_) => CpmMetrics::KIND,
            MetricsRecord::Sum(_) => SumMetrics::KIND,
            MetricsRecord::Max(_) => MaxMetrics::KIND,
        }
    }

    /// Merges `other` into `self`. Fails on a kind mismatch.
    pub fn combine(&mut self, other: &MetricsRecord) -> Result<()> {
        match (self, other) {
            (MetricsRecord::Average(a), MetricsRecord::Average(b)) => a.merge(b),
            (MetricsRecord::Percentile(a), MetricsRecord::Percentile(b)) => a.merge(b),
            (MetricsRecord::Percentage(a), MetricsRecord::Percentage(b)) => a.merge(b),
            (MetricsRecord::Cpm(a), MetricsRecord::Cpm(b)) => a.merge(b),
            (MetricsRecord::Sum(a), MetricsRecord::Sum(b)) => a.merge(b),
            (MetricsRecord::Max(a), MetricsRecord::Max(b)) => a.merge(b),
            (this, other) => {
                return Err(Error::TypeMismatch {
                    expected: this.kind().name(),
                    found: other.kind().name(),
                })
            }
        }
        Ok(())
    }

    pub fn calculate(&mut self) -> Result<()> {
        dispatch!(self, m => m.calculate())
    }

    /// Sets the rank list of a percentile record. Returns whether it changed;
    /// other kinds are left alone.
    pub fn set_percentile_ranks(&mut self, ranks: &[i32]) -> bool {
        match self {
            MetricsRecord::Percentile(m) if m.ranks != ranks => {
                m.ranks = ranks.to_vec();
                true
            }
            _ => false,
        }
    }

    pub fn meta(&self) -> &MetricsMeta {
        dispatch!(self, m => m.meta())
    }

    pub fn id(&self) -> String {
        self.meta().id()
    }

    pub fn to_storage(&self) -> Vec<(&'static str, StorageValue)> {
        dispatch!(self, m => m.to_storage())
    }

    pub fn to_hour(&self) -> Result<Self> {
        Ok(match self {
            MetricsRecord::Average(m) => MetricsRecord::Average(m.to_hour()?),
            MetricsRecord::Percentile(m) => MetricsRecord::Percentile(m.to_hour()?),
            MetricsRecord::Percentage(m) => MetricsRecord::Percentage(m.to_hour()?),
            MetricsRecord::Cpm(m) => MetricsRecord::Cpm(m.to_hour()?),
            MetricsRecord::Sum(m) => MetricsRecord::Sum(m.to_hour()?),
            MetricsRecord::Max(m) => MetricsRecord::Max(m.to_hour()?),
        })
    }

    pub fn to_day(&self) -> Result<Self> {
        Ok(match self {
            MetricsRecord::Average(m) => MetricsRecord::Average(m.to_day()?),
            MetricsRecord::Percentile(m) => MetricsRecord::Percentile(m.to_day()?),
            MetricsRecord::Percentage(m) => MetricsRecord::Percentage(m.to_day()?),
            MetricsRecord::Cpm(m) => MetricsRecord::Cpm(m.to_day()?),
            MetricsRecord::Sum(m) => MetricsRecord::Sum(m.to_day()?),
            MetricsRecord::Max(m) => MetricsRecord::Max(m.to_day()?),
        })
    }
}
