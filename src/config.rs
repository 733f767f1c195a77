// ABOUTME: Command-line and environment configuration for the replicator
// ABOUTME: Resolves the DuckDB source path, the target URL and pass tuning settings

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use url::Url;

use crate::error::ReplicationError;
use crate::ledger::DEFAULT_LEDGER_TABLE;
use crate::sync::SyncConfig;
use crate::utils::{validate_connection_string, validate_identifier};

/// Where the DuckDB source lives.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Path to the DuckDB database file
    #[arg(long = "duckdb-path", env = "DUCKDB_PATH", global = true)]
    pub duckdb_path: Option<PathBuf>,
    /// Base directory that a relative DuckDB path is resolved against
    #[arg(long = "data-dir", env = "DUCKDB_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,
}

impl SourceArgs {
    /// Resolve the DuckDB file path and check that the file exists.
    pub fn resolve(&self) -> Result<PathBuf, ReplicationError> {
        let path = self.duckdb_path.as_deref().ok_or_else(|| {
            ReplicationError::config("DuckDB path not provided. Use `--duckdb-path` or set DUCKDB_PATH.")
        })?;
        let resolved = resolve_source_path(path, self.data_dir.as_deref());

        if !resolved.is_file() {
            return Err(ReplicationError::config(format!(
                "DuckDB file not found: {}",
                resolved.display()
            )));
        }

        Ok(resolved)
    }
}

fn resolve_source_path(path: &Path, data_dir: Option<&Path>) -> PathBuf {
    match data_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// How to reach the target warehouse: a full URL or its discrete parts.
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target PostgreSQL connection string (takes precedence over DB_* settings)
    #[arg(long = "target", env = "TARGET_URL", global = true, hide_env_values = true)]
    pub target_url: Option<String>,
    /// Target host
    #[arg(long = "db-host", env = "DB_HOST", global = true)]
    pub host: Option<String>,
    /// Target port
    #[arg(long = "db-port", env = "DB_PORT", global = true, default_value_t = 5432)]
    pub port: u16,
    /// Target database name
    #[arg(long = "db-name", env = "DB_NAME", global = true)]
    pub name: Option<String>,
    /// Target user
    #[arg(long = "db-user", env = "DB_USER", global = true)]
    pub user: Option<String>,
    /// Target password
    #[arg(long = "db-password", env = "DB_PASSWORD", global = true, hide_env_values = true)]
    pub password: Option<String>,
}

impl TargetArgs {
    /// Target connection string, either given directly or assembled from the
    /// DB_* settings.
    pub fn resolve_url(&self) -> Result<String, ReplicationError> {
        let url = match &self.target_url {
            Some(url) => url.clone(),
            None => {
                let missing: Vec<&str> = [
                    ("DB_HOST", self.host.is_none()),
                    ("DB_NAME", self.name.is_none()),
                    ("DB_USER", self.user.is_none()),
                ]
                .iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| *name)
                .collect();

                if !missing.is_empty() {
                    return Err(ReplicationError::config(format!(
                        "Target database not configured. Use `--target`/TARGET_URL or set {}.",
                        missing.join(", ")
                    )));
                }

                build_target_url(
                    self.host.as_deref().unwrap_or_default(),
                    self.port,
                    self.name.as_deref().unwrap_or_default(),
                    self.user.as_deref().unwrap_or_default(),
                    self.password.as_deref(),
                )?
            }
        };

        validate_connection_string(&url).map_err(|e| ReplicationError::config(format!("{:#}", e)))?;
        Ok(url)
    }
}

/// Assemble a `postgresql://` URL, percent-encoding credentials and names.
pub fn build_target_url(
    host: &str,
    port: u16,
    database: &str,
    user: &str,
    password: Option<&str>,
) -> Result<String, ReplicationError> {
    let invalid = |part: &str| ReplicationError::config(format!("Invalid target {}", part));

    let mut url = Url::parse("postgresql://localhost").map_err(|_| invalid("URL"))?;
    url.set_host(Some(host)).map_err(|_| invalid("host"))?;
    url.set_port(Some(port)).map_err(|_| invalid("port"))?;
    url.set_username(user).map_err(|_| invalid("user"))?;
    url.set_password(password).map_err(|_| invalid("password"))?;
    url.set_path(&format!("/{}", database));

    Ok(url.to_string())
}

/// Settings shaping a replication pass.
#[derive(Args, Debug, Clone)]
pub struct TuningArgs {
    /// Target schema holding replicated tables and the ledger
    #[arg(long = "schema", env = "TARGET_SCHEMA", global = true, default_value = "public")]
    pub schema: String,
    /// Name of the ledger table
    #[arg(long = "ledger-table", env = "LEDGER_TABLE", global = true, default_value = DEFAULT_LEDGER_TABLE)]
    pub ledger_table: String,
    /// Tables replicated concurrently
    #[arg(long = "workers", env = "REPLICATOR_WORKERS", global = true, default_value_t = 4)]
    pub workers: usize,
    /// Rows per transfer batch
    #[arg(long = "batch-size", env = "REPLICATOR_BATCH_SIZE", global = true, default_value_t = 1000)]
    pub batch_size: usize,
    /// Time budget per table, in seconds
    #[arg(long = "unit-timeout", env = "REPLICATOR_UNIT_TIMEOUT_SECS", global = true, default_value_t = 1800)]
    pub unit_timeout_secs: u64,
}

impl TuningArgs {
    pub fn to_sync_config(&self, tables: Vec<String>) -> Result<SyncConfig, ReplicationError> {
        if self.workers == 0 {
            return Err(ReplicationError::config("--workers must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(ReplicationError::config("--batch-size must be at least 1"));
        }
        if self.unit_timeout_secs == 0 {
            return Err(ReplicationError::config("--unit-timeout must be at least 1 second"));
        }
        validate_identifier(&self.schema)
            .map_err(|e| ReplicationError::config(format!("Invalid target schema: {:#}", e)))?;
        validate_identifier(&self.ledger_table)
            .map_err(|e| ReplicationError::config(format!("Invalid ledger table: {:#}", e)))?;

        Ok(SyncConfig {
            workers: self.workers,
            batch_size: self.batch_size,
            unit_timeout: Duration::from_secs(self.unit_timeout_secs),
            schema: self.schema.clone(),
            ledger_table: self.ledger_table.clone(),
            tables,
        })
    }
}
