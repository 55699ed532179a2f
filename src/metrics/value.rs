//! Single-value kinds: calls per minute, sum and max.

use super::{Metrics, MetricsMeta, StorageValue};
use crate::error::Result;
use crate::metrics::registry::MetricKind;
use crate::time_bucket::infer_downsampling;
use serde::{Deserialize, Serialize};

pub const VALUE: &str = "value";
pub const TOTAL: &str = "total";

/// Calls per minute. `total` accumulates calls, `value` is the per-minute rate
/// over the width of the record's time bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpmMetrics {
    #[serde(flatten)]
    pub meta: MetricsMeta,
    pub total: i64,
    pub value: i64,
}

impl CpmMetrics {
    pub fn new(meta: MetricsMeta) -> Self {
        Self {
            meta,
            ..Default::default()
        }
    }

    pub fn combine(&mut self, count: i64) {
        self.total = self.total.saturating_add(count);
    }
}

impl Metrics for CpmMetrics {
    const KIND: MetricKind = MetricKind::Cpm;

    fn meta(&self) -> &MetricsMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MetricsMeta {
        &mut self.meta
    }

    fn merge(&mut self, other: &Self) {
        self.combine(other.total);
    }

    fn calculate(&mut self) -> Result<()> {
        let minutes = infer_downsampling(self.meta.time_bucket)?.minutes();
        self.value = self.total / minutes;
        Ok(())
    }

    fn storage_columns(&self) -> Vec<(&'static str, StorageValue)> {
        vec![
            (TOTAL, StorageValue::Long(self.total)),
            (VALUE, StorageValue::Long(self.value)),
        ]
    }
}

/// Plain running sum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SumMetrics {
    #[serde(flatten)]
    pub meta: MetricsMeta,
    pub value: i64,
}

impl SumMetrics {
    pub fn new(meta: MetricsMeta) -> Self {
        Self { meta, value: 0 }
    }

    pub fn combine(&mut self, value: i64) {
        self.value = self.value.saturating_add(value);
    }
}

impl Metrics for SumMetrics {
    const KIND: MetricKind = MetricKind::Sum;

    fn meta(&self) -> &MetricsMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MetricsMeta {
        &mut self.meta
    }

    fn merge(&mut self, other: &Self) {
        self.combine(other.value);
    }

    fn calculate(&mut self) -> Result<()> {
        Ok(())
    }

    fn storage_columns(&self) -> Vec<(&'static str, StorageValue)> {
        vec![(VALUE, StorageValue::Long(self.value))]
    }
}

/// Monotonic maximum.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxMetrics {
    #[serde(flatten)]
    pub meta: MetricsMeta,
    pub value: i64,
}

impl MaxMetrics {
    pub fn new(meta: MetricsMeta) -> Self {
        Self { meta, value: 0 }
    }

    pub fn combine(&mut self, value: i64) {
        if value > self.value {
            self.value = value;
        }
    }
}

impl Metrics for MaxMetrics {
    const KIND: MetricKind = MetricKind::Max;

    fn meta(&self) -> &MetricsMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut MetricsMeta {
        &mut self.meta
    }

    fn merge(&mut self, other: &Self) {
        self.combine(other.value);
    }

    fn calculate(&mut self) -> Result<()> {
        Ok(())
    }

    fn storage_columns(&self) -> Vec<(&'static str, StorageValue)> {
        vec![(VALUE, StorageValue::Long(self.value))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpm_per_granularity() {
        let mut minute = CpmMetrics::new(MetricsMeta::new("svc", 202401011200));
        minute.combine(120);
        minute.calculate().unwrap();
        assert_eq!(minute.value, 120);

        let mut hour = minute.to_hour().unwrap();
        hour.calculate().unwrap();
        assert_eq!(hour.meta.time_bucket, 2024010112);
        assert_eq!(hour.value, 2);
    }

    #[test]
    fn test_sum_and_max() {
        let meta = MetricsMeta::new("svc", 202401011200);
        let mut sum = SumMetrics::new(meta.clone());
        sum.combine(3);
        sum.combine(4);
        assert_eq!(sum.value, 7);

        let mut max = MaxMetrics::new(meta);
        max.combine(3);
        max.combine(9);
        max.combine(4);
        assert_eq!(max.value, 9);
    }
}
