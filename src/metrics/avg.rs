use super::{Metrics, MetricsMeta, StorageValue};
use crate::error::{Error, Result};
use crate::metrics::registry::MetricKind;
use serde::{Deserialize, Serialize};

pub const SUMMATION: &str = "summation";
pub const COUNT: &str = "count";
pub const VALUE: &str = "value";
pub const MAX: &str = "max";
pub const MIN: &str = "min";

/// Running average over long values, with min and max tracking.
///
/// `min` uses 0 as its "unset" marker. A legitimate minimum of 0 is therefore
/// replaced by the next incoming minimum, even a larger one. This mirrors the
/// stored data produced by existing aggregation workers and is kept as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LongAvgMetrics {
    #[serde(flatten)]
    pub meta: MetricsMeta,
    pub summation: i64,
    pub count: i64,
    pub max: i64,
    pub min: i64,
    pub value: i64,
}

impl LongAvgMetrics {
    pub fn new(meta: MetricsMeta) -> Self {
        Self {
            meta,
            ..Default::default()
        }
    }

    /// Merges one partial aggregate.
    pub fn combine(&mut self, summation: i64, count: i64, max: i64, min: i64) {
        self.summation = self.summation.saturating_add(summation);
        self.count = self.count.saturating_add(count);
        if max > self.max {
            self.max = max;
        }
        if min < self.min || self.min == 0 {
            self.min = min;
        }
    }
}

impl Metrics for LongAvgMetrics {
    const KIND: MetricKind = MetricKind::Average;

    fn meta(&self) -> &MetricsMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MetricsMeta {
        &mut self.meta
    }

    fn merge(&mut self, other: &Self) {
        self.combine(other.summation, other.count, other.max, other.min);
    }

    fn calculate(&mut self) -> Result<()> {
        if self.count == 0 {
            return Err(Error::InvalidState(format!(
                "average {} has a zero count",
                self.id()
            )));
        }
        self.value = self.summation.checked_div(self.count).ok_or_else(|| {
            Error::InvalidState(format!("average {} is out of range", self.id()))
        })?;
        Ok(())
    }

    fn storage_columns(&self) -> Vec<(&'static str, StorageValue)> {
        vec![
            (SUMMATION, StorageValue::Long(self.summation)),
            (COUNT, StorageValue::Long(self.count)),
            (MAX, StorageValue::Long(self.max)),
            (MIN, StorageValue::Long(self.min)),
            (VALUE, StorageValue::Long(self.value)),
        ]
    }
}
