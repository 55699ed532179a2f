//! Per-kind decoding of stored rows into [`MetricsValues`].

use super::MetricsValues;
use crate::error::{Error, Result};
use crate::metrics::registry::{MetricKind, MetricRegistry};
use crate::metrics::{avg, percent, percentile, DataTable};
use crate::models::TableMetadata;
use serde_json::{Map, Value as JsonValue};

/// Column access on one raw row or hit, by physical column name.
///
/// A column absent from the row is a decode error. A present but null column
/// reads as `None`.
pub trait RowSource {
    fn long(&self, column: &str) -> Result<Option<i64>>;

    fn text(&self, column: &str) -> Result<Option<String>>;
}

/// Row backed by a JSON object, as returned by document stores.
pub struct JsonRow<'a> {
    fields: &'a Map<String, JsonValue>,
}

impl<'a> JsonRow<'a> {
    pub fn new(fields: &'a Map<String, JsonValue>) -> Self {
        Self { fields }
    }

    fn field(&self, column: &str) -> Result<&'a JsonValue> {
        self.fields
            .get(column)
            .ok_or_else(|| Error::Decode(format!("column {} is missing", column)))
    }
}

impl RowSource for JsonRow<'_> {
    fn long(&self, column: &str) -> Result<Option<i64>> {
        json_long(column, self.field(column)?)
    }

    fn text(&self, column: &str) -> Result<Option<String>> {
        Ok(json_text(self.field(column)?))
    }
}

/// Reads an integer from a JSON scalar. Whole floats and numeric strings are
/// accepted since some stores return every field as a float or as text.
pub(crate) fn json_long(column: &str, value: &JsonValue) -> Result<Option<i64>> {
    match value {
        JsonValue::Null => Ok(None),
        JsonValue::Number(number) => number
            .as_i64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            })
            .map(Some)
            .ok_or_else(|| Error::Decode(format!("column {} is not an integer: {}", column, number))),
        JsonValue::String(text) => text
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Decode(format!("column {} is not an integer: {:?}", column, text))),
        other => Err(Error::Decode(format!(
            "column {} is not an integer: {}",
            column, other
        ))),
    }
}

pub(crate) fn json_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// Turns rows of known metrics into labelled value sets.
pub struct Decoder<'a> {
    registry: &'a MetricRegistry,
    metadata: &'a TableMetadata,
    ranks: &'a [i32],
}

impl<'a> Decoder<'a> {
    pub fn new(registry: &'a MetricRegistry, metadata: &'a TableMetadata, ranks: &'a [i32]) -> Self {
        Self {
            registry,
            metadata,
            ranks,
        }
    }

    /// Decodes the row of `metric_name` according to its registered kind.
    pub fn decode(&self, metric_name: &str, row: &dyn RowSource) -> Result<MetricsValues> {
        let kind = self.registry.resolve(metric_name)?.kind;
        let mut values = MetricsValues::new(metric_name);

        match kind {
            MetricKind::Percentile => {
                let column = self.metadata.physical_name(metric_name, percentile::VALUE)?;
                let histogram = DataTable::decode(row.text(&column)?.as_deref())?;
                for (index, value) in histogram.iter() {
                    if let Some(rank) = usize::try_from(index)
                        .ok()
                        .and_then(|index| self.ranks.get(index))
                    {
                        values.add_int_value(rank.to_string(), value);
                    }
                }
            }
            MetricKind::Average => {
                for column in [avg::VALUE, avg::COUNT, avg::MAX, avg::MIN] {
                    let value = self.read_long(metric_name, column, row)?;
                    values.add_int_value(column, value);
                }
            }
            MetricKind::Percentage => {
                for column in [percent::MATCH, percent::TOTAL, percent::PERCENTAGE] {
                    let value = self.read_long(metric_name, column, row)?;
                    values.add_int_value(column, value);
                }
            }
            MetricKind::SingleValue | MetricKind::Cpm | MetricKind::Sum | MetricKind::Max => {
                let column = self.metadata.value_column(metric_name)?;
                let value = self.read_long(metric_name, &column, row)?;
                values.add_int_value(column, value);
            }
        }

        Ok(values)
    }

    fn read_long(&self, metric_name: &str, column: &str, row: &dyn RowSource) -> Result<i64> {
        let physical = self.metadata.physical_name(metric_name, column)?;
        Ok(row.long(&physical)?.unwrap_or_default())
    }
}
