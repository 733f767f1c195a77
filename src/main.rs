// ABOUTME: CLI entry point for duckdb-replicator
// ABOUTME: Parses configuration and routes to the sync, status, and validate commands

use clap::{Parser, Subcommand};
use duckdb_replicator::commands;
use duckdb_replicator::config::{SourceArgs, TargetArgs, TuningArgs};
use duckdb_replicator::target::TargetConnector;

#[derive(Parser)]
#[command(name = "duckdb-replicator")]
#[command(about = "Replicate DuckDB tables into a PostgreSQL warehouse", long_about = None)]
#[command(version)]
struct Cli {
    /// Allow self-signed TLS certificates (insecure - use only for testing)
    #[arg(
        long = "allow-self-signed-certs",
        global = true,
        default_value_t = false
    )]
    allow_self_signed_certs: bool,
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    #[command(flatten)]
    source: SourceArgs,
    #[command(flatten)]
    target: TargetArgs,
    #[command(flatten)]
    tuning: TuningArgs,
    /// Defaults to `sync` when omitted
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one replication pass: create/alter target tables, copy new rows, drop vanished tables
    Sync {
        /// Only replicate these source tables (comma-separated); disables table drops
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },
    /// Show per-table replication progress recorded in the ledger
    Status {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check both stores and preview what the next pass would do
    Validate {
        /// Only preview these source tables (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // 1. RUST_LOG environment variable has highest precedence
    // 2. --log flag is used if RUST_LOG is not set
    // 3. Default to "info" if neither are provided
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let target_url = cli.target.resolve_url()?;
    let connector = TargetConnector::new(&target_url, cli.allow_self_signed_certs)?;

    match cli.command.unwrap_or(Commands::Sync { tables: Vec::new() }) {
        Commands::Sync { tables } => {
            let source_path = cli.source.resolve()?;
            let config = cli.tuning.to_sync_config(tables)?;
            commands::sync(&source_path, connector, config).await
        }
        Commands::Status { json } => {
            commands::status(connector, &cli.tuning.schema, &cli.tuning.ledger_table, json).await
        }
        Commands::Validate { tables } => {
            let source_path = cli.source.resolve()?;
            let config = cli.tuning.to_sync_config(tables)?;
            commands::validate(&source_path, connector, config).await
        }
    }
}
