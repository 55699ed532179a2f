use super::{Metrics, MetricsMeta, StorageValue};
use crate::error::{Error, Result};
use crate::metrics::registry::MetricKind;
use serde::{Deserialize, Serialize};

pub const TOTAL: &str = "total";
pub const PERCENTAGE: &str = "percentage";
pub const MATCH: &str = "match";

/// Fixed-point scale of `percentage`: 10000 means 100%.
pub const PERCENTAGE_SCALE: i64 = 10_000;

/// Ratio of matching events, e.g. successful calls for an SLA metric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentMetrics {
    #[serde(flatten)]
    pub meta: MetricsMeta,
    pub total: i64,
    #[serde(rename = "match")]
    pub match_count: i64,
    pub percentage: i64,
}

impl PercentMetrics {
    pub fn new(meta: MetricsMeta) -> Self {
        Self {
            meta,
            ..Default::default()
        }
    }

    /// Records one event.
    pub fn combine(&mut self, is_match: bool) {
        if is_match {
            self.match_count = self.match_count.saturating_add(1);
        }
        self.total = self.total.saturating_add(1);
    }

    /// Merges pre-counted match and total deltas.
    pub fn combine_counts(&mut self, match_count: i64, total: i64) {
        self.match_count = self.match_count.saturating_add(match_count);
        self.total = self.total.saturating_add(total);
    }
}

impl Metrics for PercentMetrics {
    const KIND: MetricKind = MetricKind::Percentage;

    fn meta(&self) -> &MetricsMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MetricsMeta {
        &mut self.meta
    }

    fn merge(&mut self, other: &Self) {
        self.combine_counts(other.match_count, other.total);
    }

    fn calculate(&mut self) -> Result<()> {
        if self.total == 0 {
            return Err(Error::InvalidState(format!(
                "percentage {} has a zero total",
                self.id()
            )));
        }
        let percentage =
            i128::from(self.match_count) * i128::from(PERCENTAGE_SCALE) / i128::from(self.total);
        self.percentage = i64::try_from(percentage).map_err(|_| {
            Error::InvalidState(format!("percentage {} is out of range", self.id()))
        })?;
        Ok(())
    }

    fn storage_columns(&self) -> Vec<(&'static str, StorageValue)> {
        vec![
            (TOTAL, StorageValue::Long(self.total)),
            (PERCENTAGE, StorageValue::Long(self.percentage)),
            (MATCH, StorageValue::Long(self.match_count)),
        ]
    }
}
