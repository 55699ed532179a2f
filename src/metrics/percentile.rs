use super::{DataTable, Metrics, MetricsMeta, StorageValue};
use crate::error::Result;
use crate::metrics::registry::MetricKind;
use serde::{Deserialize, Serialize};

pub const DATASET: &str = "dataset";
pub const VALUE: &str = "value";
pub const PRECISION: &str = "precision";

/// Ranks reported for percentile metrics, in rank-index order.
pub const RANKS: [i32; 5] = [50, 75, 90, 95, 99];

fn default_ranks() -> Vec<i32> {
    RANKS.to_vec()
}

/// Latency histogram with percentile derivation.
///
/// `dataset` counts values per bucket (`value / precision`). `calculate` fills
/// `percentile_values` with rank index → bucket lower bound, where index `i`
/// stands for `ranks[i]`. Readers label the stored table with their own rank
/// list, so both sides must agree on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PercentileMetrics {
    #[serde(flatten)]
    pub meta: MetricsMeta,
    pub precision: u32,
    pub dataset: DataTable,
    #[serde(rename = "value")]
    pub percentile_values: DataTable,
    #[serde(default = "default_ranks", skip_serializing)]
    pub ranks: Vec<i32>,
}

impl Default for PercentileMetrics {
    fn default() -> Self {
        Self::new(MetricsMeta::default(), 1)
    }
}

impl PercentileMetrics {
    pub fn new(meta: MetricsMeta, precision: u32) -> Self {
        Self {
            meta,
            precision: precision.max(1),
            dataset: DataTable::new(),
            percentile_values: DataTable::new(),
            ranks: default_ranks(),
        }
    }

    /// Uses `ranks` instead of [`RANKS`] on the next `calculate`.
    pub fn with_ranks(mut self, ranks: Vec<i32>) -> Self {
        self.ranks = ranks;
        self
    }

    /// Records one observed value.
    pub fn combine(&mut self, value: u64) {
        let bucket = value / u64::from(self.precision);
        self.dataset.increment(bucket, 1);
    }
}

impl Metrics for PercentileMetrics {
    const KIND: MetricKind = MetricKind::Percentile;

    fn meta(&self) -> &MetricsMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MetricsMeta {
        &mut self.meta
    }

    fn merge(&mut self, other: &Self) {
        self.dataset.append(&other.dataset);
    }

    fn calculate(&mut self) -> Result<()> {
        self.percentile_values.clear();
        let total = self.dataset.sum_of_values();
        if total == 0 {
            return Ok(());
        }

        // round(total * rank / 100)
        let roofs: Vec<i128> = self
            .ranks
            .iter()
            .map(|rank| (i128::from(total) * i128::from(*rank) + 50) / 100)
            .collect();

        let mut count: i128 = 0;
        let mut next_rank = 0;
        for (bucket, bucket_count) in self.dataset.iter() {
            count += i128::from(bucket_count);
            while next_rank < roofs.len() && count >= roofs[next_rank] {
                let value = bucket * u64::from(self.precision);
                self.percentile_values
                    .put(next_rank as u64, i64::try_from(value).unwrap_or(i64::MAX));
                next_rank += 1;
            }
        }
        Ok(())
    }

    fn storage_columns(&self) -> Vec<(&'static str, StorageValue)> {
        vec![
            (PRECISION, StorageValue::Long(i64::from(self.precision))),
            (DATASET, StorageValue::Text(self.dataset.encode())),
            (VALUE, StorageValue::Text(self.percentile_values.encode())),
        ]
    }
}
