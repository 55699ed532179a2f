//! Time-series adapter.
//!
//! Issues one `SELECT` per requested metric, concatenated into a single
//! command. Every returned row yields its own value set keyed by the row's
//! `id` column.

use crate::error::{Error, Result};
use crate::metrics::{ID, TIME_BUCKET};
use crate::query::decode::{json_long, json_text};
use crate::query::{
    MultipleMetrics, MultipleMetricsCondition, MultipleMetricsQueryDAO, QueryContext,
    ResultCollector, RowSource,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::debug;

/// One series of a statement result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<JsonValue>>,
}

/// Result of one statement in a multi-statement command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub series: Vec<Series>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Time-series client handle injected by the application.
#[async_trait]
pub trait TimeSeriesClient: Send + Sync + 'static {
    fn format_measurement_name(&self, name: &str) -> String {
        name.to_owned()
    }

    /// Runs a command of `;`-separated statements, one result per statement.
    async fn query(&self, command: &str) -> Result<Vec<QueryResult>>;
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('\\', "\\\\").replace('"', "\\\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

struct SeriesRow<'a> {
    columns: &'a HashMap<&'a str, usize>,
    values: &'a [JsonValue],
}

impl SeriesRow<'_> {
    fn field(&self, column: &str) -> Result<&JsonValue> {
        self.columns
            .get(column)
            .and_then(|index| self.values.get(*index))
            .ok_or_else(|| Error::Decode(format!("column {} is missing", column)))
    }
}

impl RowSource for SeriesRow<'_> {
    fn long(&self, column: &str) -> Result<Option<i64>> {
        json_long(column, self.field(column)?)
    }

    fn text(&self, column: &str) -> Result<Option<String>> {
        Ok(json_text(self.field(column)?))
    }
}

pub struct InfluxDbMetricsQuery {
    client: Arc<dyn TimeSeriesClient>,
    context: QueryContext,
    database: String,
}

impl InfluxDbMetricsQuery {
    pub fn new(
        client: Arc<dyn TimeSeriesClient>,
        context: QueryContext,
        database: impl Into<String>,
    ) -> Self {
        Self {
            client,
            context,
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    fn build_command(&self, condition: &MultipleMetricsCondition, time_bucket: i64) -> String {
        let database = quote_identifier(&self.database);
        let mut command = String::new();
        for name in &condition.names {
            let measurement = quote_identifier(&self.client.format_measurement_name(name));
            let _ = write!(
                command,
                "SELECT * FROM {}..{} WHERE {} = {}",
                database,
                measurement,
                quote_identifier(TIME_BUCKET),
                time_bucket
            );
            if let Some((field, id)) = condition.entity.filter() {
                let _ = write!(command, " AND {} = {}", quote_identifier(field), quote_literal(id));
            }
            command.push(';');
        }
        command
    }
}

#[async_trait]
impl MultipleMetricsQueryDAO for InfluxDbMetricsQuery {
    async fn read_multiple_metrics(
        &self,
        condition: &MultipleMetricsCondition,
        time_bucket: i64,
    ) -> Result<Vec<MultipleMetrics>> {
        let measurement_to_metric: HashMap<String, &str> = condition
            .names
            .iter()
            .map(|name| (self.client.format_measurement_name(name), name.as_str()))
            .collect();

        let command = self.build_command(condition, time_bucket);
        debug!(%command, "Querying measurements");
        let results = self.client.query(&command).await?;

        let decoder = self.context.decoder();
        let mut collector = ResultCollector::new(condition, time_bucket);
        for result in &results {
            if let Some(error) = &result.error {
                return Err(Error::BackendIo(error.clone()));
            }
            for series in &result.series {
                let metric_name = measurement_to_metric.get(&series.name).ok_or_else(|| {
                    Error::Decode(format!("series from unrequested measurement {}", series.name))
                })?;
                let columns: HashMap<&str, usize> = series
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(index, column)| (column.as_str(), index))
                    .collect();

                for values in &series.values {
                    let row = SeriesRow {
                        columns: &columns,
                        values,
                    };
                    let id = match row.text(ID)? {
                        Some(id) if !id.is_empty() => id,
                        _ => {
                            debug!(measurement = %series.name, "Skipping row without id");
                            continue;
                        }
                    };
                    let metrics_values = decoder.decode(metric_name, &row)?;
                    collector.push(&id, metrics_values);
                }
            }
        }
        Ok(collector.finish())
    }
}
