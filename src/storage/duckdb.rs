//! Relational adapter backed by DuckDB.
//!
//! Each query holds one pooled connection and runs one `SELECT` per requested
//! metric, in request order. The statement position labels the rows it
//! returns, so no table name parsing is needed.

use super::format_with_namespace;
use super::pool::DuckDbPool;
use crate::error::{Error, Result};
use crate::metrics::{MetricsRecord, StorageValue, ENTITY_ID, ID, SERVICE_ID, TIME_BUCKET};
use crate::models::{ColumnRole, Model};
use crate::query::{
    MultipleMetrics, MultipleMetricsCondition, MultipleMetricsQueryDAO, QueryContext,
    ResultCollector, RowSource,
};
use crate::time_bucket::{infer_downsampling, physical_name};
use async_trait::async_trait;
use duckdb::types::ToSql;
use duckdb::{Connection, Row};
use tracing::{debug, info};

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn is_key_column(column: &str) -> bool {
    matches!(column, ID | ENTITY_ID | SERVICE_ID | TIME_BUCKET)
}

fn column_error(err: duckdb::Error) -> Error {
    match err {
        duckdb::Error::InvalidColumnName(column) => {
            Error::Decode(format!("column {} is missing", column))
        }
        duckdb::Error::InvalidColumnType(index, column, found) => Error::Decode(format!(
            "column {} ({}) has unexpected type {}",
            column, index, found
        )),
        other => other.into(),
    }
}

fn as_sql(value: &StorageValue) -> &dyn ToSql {
    match value {
        StorageValue::Long(value) => value,
        StorageValue::Text(value) => value,
    }
}

struct SqlRow<'a, 'stmt>(&'a Row<'stmt>);

impl RowSource for SqlRow<'_, '_> {
    fn long(&self, column: &str) -> Result<Option<i64>> {
        self.0.get::<_, Option<i64>>(column).map_err(column_error)
    }

    fn text(&self, column: &str) -> Result<Option<String>> {
        self.0.get::<_, Option<String>>(column).map_err(column_error)
    }
}

pub struct DuckDbMetricsQuery {
    pool: DuckDbPool,
    context: QueryContext,
    namespace: String,
}

impl DuckDbMetricsQuery {
    pub fn new(pool: DuckDbPool, context: QueryContext, namespace: impl Into<String>) -> Self {
        Self {
            pool,
            context,
            namespace: namespace.into(),
        }
    }

    pub fn pool(&self) -> &DuckDbPool {
        &self.pool
    }

    /// Table holding `metric_name` at `time_bucket`.
    pub fn table_name(&self, metric_name: &str, time_bucket: i64) -> Result<String> {
        let downsampling = infer_downsampling(time_bucket)?;
        let name = physical_name(metric_name, downsampling, time_bucket, self.context.day_step)?;
        Ok(format_with_namespace(&self.namespace, &name))
    }

    fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
        let count: i64 = conn.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE table_name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn column_type(role: ColumnRole, column: &str) -> &'static str {
        match role {
            ColumnRole::Key if column == TIME_BUCKET => "BIGINT",
            ColumnRole::Key | ColumnRole::Histogram => "VARCHAR",
            ColumnRole::StorageOnly | ColumnRole::Value => "BIGINT",
        }
    }

    fn storage_column(&self, metric_name: &str, column: &str) -> Result<String> {
        if is_key_column(column) {
            Ok(column.to_owned())
        } else {
            self.context.metadata.physical_name(metric_name, column)
        }
    }

    /// Creates the table of `model` at `time_bucket` if it does not exist.
    /// Returns the table name.
    pub async fn create_table(&self, model: &Model, time_bucket: i64) -> Result<String> {
        let table = self.table_name(&model.name, time_bucket)?;
        let mut columns = vec![format!("{} VARCHAR PRIMARY KEY", quote_identifier(ID))];
        for column in &model.columns {
            let logical = &column.column_name.name;
            let storage = self.storage_column(&model.name, logical)?;
            columns.push(format!(
                "{} {}",
                quote_identifier(&storage),
                Self::column_type(column.role, logical)
            ));
        }

        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&table),
            columns.join(", ")
        );
        debug!(%sql, "Creating metrics table");
        let conn = self.pool.acquire().await?;
        conn.execute_batch(&sql)?;
        info!(table = %table, "Metrics table ready");
        Ok(table)
    }

    /// Upserts records of `metric_name` by record id. Each record lands in the
    /// table of its own time bucket, which must already exist.
    ///
    /// Percentile records calculated against another rank list are
    /// recalculated with the ranks this adapter labels them with on read.
    pub async fn insert(&self, metric_name: &str, records: &[MetricsRecord]) -> Result<usize> {
        let mut statements = Vec::with_capacity(records.len());
        for record in records {
            let table = self.table_name(metric_name, record.meta().time_bucket)?;
            let row = match record {
                MetricsRecord::Percentile(m) if m.ranks != self.context.percentile_ranks => {
                    debug!(id = %record.id(), "Recalculating percentile with configured ranks");
                    let mut aligned = record.clone();
                    aligned.set_percentile_ranks(&self.context.percentile_ranks);
                    aligned.calculate()?;
                    aligned.to_storage()
                }
                _ => record.to_storage(),
            };

            let mut columns = Vec::with_capacity(row.len());
            let mut values = Vec::with_capacity(row.len());
            for (column, value) in row {
                columns.push(quote_identifier(&self.storage_column(metric_name, column)?));
                values.push(value);
            }
            let sql = format!(
                "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                quote_identifier(&table),
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            );
            statements.push((sql, values));
        }

        let mut conn = self.pool.acquire().await?;
        let tx = conn.transaction()?;
        for (sql, values) in &statements {
            let params: Vec<&dyn ToSql> = values.iter().map(as_sql).collect();
            tx.execute(sql, params.as_slice())?;
        }
        tx.commit()?;
        debug!(metric = metric_name, rows = statements.len(), "Inserted metrics");
        Ok(statements.len())
    }
}

#[async_trait]
impl MultipleMetricsQueryDAO for DuckDbMetricsQuery {
    async fn read_multiple_metrics(
        &self,
        condition: &MultipleMetricsCondition,
        time_bucket: i64,
    ) -> Result<Vec<MultipleMetrics>> {
        let tables = condition
            .names
            .iter()
            .map(|name| self.table_name(name, time_bucket))
            .collect::<Result<Vec<_>>>()?;

        let filter = condition.entity.filter();
        let mut sql_where = format!("{} = ?", quote_identifier(TIME_BUCKET));
        if let Some((field, _)) = filter {
            sql_where.push_str(&format!(" AND {} = ?", quote_identifier(field)));
        }

        let decoder = self.context.decoder();
        let mut collector = ResultCollector::new(condition, time_bucket);
        let conn = self.pool.acquire().await?;
        let mut params: Vec<&dyn ToSql> = vec![&time_bucket];
        if let Some((_, id)) = &filter {
            params.push(id);
        }
        for (metric_name, table) in condition.names.iter().zip(&tables) {
            if !Self::table_exists(&conn, table)? {
                debug!(table = %table, "No table for time bucket, skipping");
                continue;
            }

            let sql = format!("SELECT * FROM {} WHERE {}", quote_identifier(table), sql_where);
            debug!(%sql, metric = %metric_name, "Executing metrics query");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(params.as_slice())?;
            while let Some(row) = rows.next()? {
                let row = SqlRow(row);
                let id = match row.text(ID)? {
                    Some(id) if !id.is_empty() => id,
                    _ => {
                        debug!(table = %table, "Skipping row without id");
                        continue;
                    }
                };
                let values = decoder.decode(metric_name, &row)?;
                collector.push(&id, values);
            }
        }
        Ok(collector.finish())
    }
}
