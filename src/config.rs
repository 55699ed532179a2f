//! Configuration management for the metrics query core.
//!
//! This module provides configuration handling through multiple sources:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/apm-metrics/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (prefixed with `APM_METRICS_`, sections separated by `__`)
//! 5. Command-line arguments
//!
//! Configuration options are loaded in order of precedence, with later sources
//! overriding earlier ones.
//!
//! # Environment Variables
//!
//! - `APM_METRICS_STORAGE__ENGINE` - Storage engine (`elasticsearch`, `influxdb`, `duckdb`)
//! - `APM_METRICS_STORAGE__CONNECTION` - Engine connection string
//! - `APM_METRICS_NAMING__DAY_STEP` - Days grouped into one physical partition
//! - `APM_METRICS_QUERY__DATABASE` - Time-series database name

use crate::error::{Error, Result};
use crate::models::ColumnOverrides;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Command-line arguments
#[derive(Debug, Default, Parser)]
#[clap(version, about)]
pub struct Args {
    /// Configuration file path
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Storage engine type
    #[clap(long)]
    pub engine: Option<String>,

    /// Storage engine connection string
    #[clap(long)]
    pub engine_connection: Option<String>,

    /// Namespace prefix of physical names
    #[clap(long)]
    pub namespace: Option<String>,

    /// Days grouped into one physical partition
    #[clap(long)]
    pub day_step: Option<u32>,
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Storage configuration
    pub storage: StorageConfig,
    /// Physical naming
    #[serde(default)]
    pub naming: NamingConfig,
    /// Query settings
    #[serde(default)]
    pub query: QueryConfig,
    /// Relational backend settings
    #[serde(default)]
    pub relational: RelationalConfig,
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage engine type
    pub engine: String,
    /// Connection string
    #[serde(default)]
    pub connection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamingConfig {
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "default_day_step")]
    pub day_step: u32,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            day_step: default_day_step(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Ranks reported for percentile metrics, by rank index. Percentile
    /// records written through the relational backend are calculated with it.
    #[serde(default = "default_percentile_ranks")]
    pub percentile_ranks: Vec<i32>,
    /// Result window of one document search
    #[serde(default = "default_max_hits")]
    pub max_hits: usize,
    /// Time-series database name
    #[serde(default = "default_database")]
    pub database: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            percentile_ranks: default_percentile_ranks(),
            max_hits: default_max_hits(),
            database: default_database(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalConfig {
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Logical → physical column renames for every metric
    #[serde(default)]
    pub column_overrides: HashMap<String, String>,
    /// Metric → logical → physical column renames
    #[serde(default)]
    pub metric_column_overrides: HashMap<String, HashMap<String, String>>,
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            column_overrides: HashMap::new(),
            metric_column_overrides: HashMap::new(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from all sources
    pub fn load(args: &Args) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name("/etc/apm-metrics/config.toml").required(false));

        // Load user config if specified
        if let Some(path) = &args.config {
            builder = builder.add_source(config::File::from(path.as_path()));
        }

        // Add environment variables
        builder = builder.add_source(
            config::Environment::with_prefix("APM_METRICS")
                .prefix_separator("_")
                .separator("__"),
        );

        let mut config: ServiceConfig = builder.build()?.try_deserialize()?;

        // Override with command line args
        if let Some(engine) = &args.engine {
            config.storage.engine = engine.clone();
        }
        if let Some(connection) = &args.engine_connection {
            config.storage.connection = connection.clone();
        }
        if let Some(namespace) = &args.namespace {
            config.naming.namespace = namespace.clone();
        }
        if let Some(day_step) = args.day_step {
            config.naming.day_step = day_step;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.naming.day_step == 0 {
            return Err(Error::Config("naming.day_step must be at least 1".to_string()));
        }
        if self.relational.pool_size == 0 {
            return Err(Error::Config("relational.pool_size must be at least 1".to_string()));
        }
        if self.query.percentile_ranks.is_empty() {
            return Err(Error::Config("query.percentile_ranks must not be empty".to_string()));
        }
        Ok(())
    }

    /// Column rename layer for the relational backend, if any is configured.
    pub fn column_overrides(&self) -> Option<ColumnOverrides> {
        let overrides = ColumnOverrides::new(
            self.relational.column_overrides.clone(),
            self.relational.metric_column_overrides.clone(),
        );
        (!overrides.is_empty()).then_some(overrides)
    }
}

fn default_day_step() -> u32 {
    1
}

fn default_percentile_ranks() -> Vec<i32> {
    crate::metrics::percentile::RANKS.to_vec()
}

fn default_max_hits() -> usize {
    10000
}

fn default_database() -> String {
    "skywalking".to_string()
}

fn default_pool_size() -> usize {
    4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnNameResolver;
    use std::io::Write;

    #[test]
    fn test_config_defaults() {
        let config = ServiceConfig::load(&Args::default()).unwrap();
        assert_eq!(config.storage.engine, "duckdb");
        assert_eq!(config.naming.day_step, 1);
        assert_eq!(config.query.percentile_ranks, vec![50, 75, 90, 95, 99]);
        assert_eq!(config.query.max_hits, 10000);
        assert_eq!(config.query.database, "skywalking");
        assert_eq!(config.relational.pool_size, 4);
        assert!(config.column_overrides().is_none());
    }

    #[test]
    fn test_user_file_and_args() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[storage]
engine = "elasticsearch"

[naming]
namespace = "sw"
day_step = 3

[query]
database = "apm"

[relational.column_overrides]
match = "match_num"
"#
        )
        .unwrap();

        let args = Args {
            config: Some(file.path().to_path_buf()),
            engine: Some("influxdb".to_string()),
            ..Default::default()
        };
        let config = ServiceConfig::load(&args).unwrap();
        assert_eq!(config.storage.engine, "influxdb");
        assert_eq!(config.naming.namespace, "sw");
        assert_eq!(config.naming.day_step, 3);
        assert_eq!(config.query.database, "apm");
        assert_eq!(config.query.max_hits, 10000);

        let overrides = config.column_overrides().unwrap();
        assert_eq!(overrides.storage_name("any", "match").as_deref(), Some("match_num"));
    }

    #[test]
    fn test_zero_day_step_rejected() {
        let args = Args {
            day_step: Some(0),
            ..Default::default()
        };
        assert!(matches!(ServiceConfig::load(&args), Err(Error::Config(_))));
    }
}
