//! Metrics query binary.
//!
//! Loads the service configuration and a model catalog, opens the relational
//! backend and prints the multi-metric read of one entity as JSON. Optional
//! seed records are written first, which makes the binary usable against an
//! in-memory database.

use anyhow::{bail, Context};
use apm_metrics_core::config::{Args, ServiceConfig};
use apm_metrics_core::metrics::MetricKindDescriptor;
use apm_metrics_core::models::{ColumnNameResolver, ModelColumn};
use apm_metrics_core::query::QueryContext;
use apm_metrics_core::storage::StorageEngine;
use apm_metrics_core::{
    BackendClients, Entity, MetricKind, MetricRegistry, MetricsRecord, Model, MultipleMetricsCondition,
    MultipleMetricsQueryService, QueryBackend, TableMetadata,
};
use clap::Parser;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    args: Args,

    /// JSON list of `{name, kind, columns?}` model entries
    #[arg(long)]
    models: PathBuf,

    /// JSON list of `{metric, record}` entries written before querying
    #[arg(long)]
    records: Option<PathBuf>,

    /// Metric names to read
    #[arg(long = "metric", required = true)]
    metrics: Vec<String>,

    /// Entity id; empty reads every entity
    #[arg(long, default_value = "")]
    entity: String,

    /// Treat the entity id as a service id shared by child entities
    #[arg(long)]
    children: bool,

    /// Time bucket (yyyyMMddHHmm, yyyyMMddHH or yyyyMMdd)
    #[arg(long)]
    time_bucket: i64,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log filter directives
    #[arg(long)]
    log_filter: Option<String>,
}

#[derive(Deserialize)]
struct ModelEntry {
    name: String,
    kind: MetricKind,
    #[serde(default)]
    columns: Option<Vec<ModelColumn>>,
}

#[derive(Deserialize)]
struct RecordEntry {
    metric: String,
    record: MetricsRecord,
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> anyhow::Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(cli.log_level.parse().unwrap_or(Level::INFO).into())
                .parse_lossy(cli.log_filter.as_deref().unwrap_or("apm_metrics_core=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config = ServiceConfig::load(&cli.args)?;
    let engine: StorageEngine = config.storage.engine.parse()?;
    if engine != StorageEngine::DuckDb {
        bail!("the {} engine needs an injected client and cannot be used from the command line", engine);
    }

    let entries: Vec<ModelEntry> = read_json(&cli.models).await?;
    let mut registry = MetricRegistry::builder();
    let metadata = match config.column_overrides() {
        Some(overrides) => {
            let resolver: Arc<dyn ColumnNameResolver> = Arc::new(overrides);
            TableMetadata::with_overrides(resolver)
        }
        None => TableMetadata::new(),
    };
    let mut models = Vec::with_capacity(entries.len());
    for entry in entries {
        registry.register(MetricKindDescriptor::new(&entry.name, entry.kind))?;
        let model = match entry.columns {
            Some(columns) => Model::new(&entry.name, columns),
            None => Model::for_kind(&entry.name, entry.kind),
        };
        metadata.add_model(model.clone());
        models.push(model);
    }
    let registry = Arc::new(registry.build());
    let metadata = Arc::new(metadata);
    info!(models = models.len(), "Model catalog loaded");

    let context = QueryContext::new(registry.clone(), metadata.clone());
    let backend = QueryBackend::from_config(&config, context, BackendClients::default())?;

    if let (Some(path), Some(relational)) = (&cli.records, backend.as_duckdb()) {
        let records: Vec<RecordEntry> = read_json(path).await?;
        let mut created = BTreeSet::new();
        for entry in &records {
            let time_bucket = entry.record.meta().time_bucket;
            if created.insert((entry.metric.clone(), time_bucket)) {
                let model = models
                    .iter()
                    .find(|model| model.name == entry.metric)
                    .with_context(|| format!("no model for seeded metric {}", entry.metric))?;
                relational.create_table(model, time_bucket).await?;
            }
            let mut record = entry.record.clone();
            record.set_percentile_ranks(&config.query.percentile_ranks);
            record.calculate()?;
            relational.insert(&entry.metric, &[record]).await?;
        }
        info!(records = records.len(), "Seed records written");
    }

    let service = MultipleMetricsQueryService::new(registry, metadata, Arc::new(backend));
    let entity = Entity {
        id: cli.entity,
        is_service: !cli.children,
    };
    let condition = MultipleMetricsCondition::new(cli.metrics, entity);
    let results = service.read_multiple_metrics(&condition, cli.time_bucket).await?;

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
