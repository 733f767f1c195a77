// ABOUTME: Sync command - runs one replication pass from DuckDB to the warehouse
// ABOUTME: Prints a per-table summary; individual table failures do not fail the command

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::error::ReplicationError;
use crate::schema::SchemaChange;
use crate::source::DuckDbSource;
use crate::sync::{PassReport, SyncConfig, Synchronizer, TableAction};
use crate::target::TargetConnector;

/// Replicate every source table (or the configured subset) once.
///
/// Fails only when the pass cannot run at all. Tables that fail inside the
/// pass are logged and listed in the summary, and the next run retries them
/// from their last committed offset.
pub async fn sync(source_path: &Path, connector: TargetConnector, config: SyncConfig) -> Result<()> {
    tracing::info!("Starting replication pass");
    tracing::info!("Source: {}", source_path.display());
    tracing::info!("Target: {}", connector.display_url());

    let source = DuckDbSource::open(source_path).map_err(ReplicationError::source_unreachable)?;
    let synchronizer = Synchronizer::new(Arc::new(source), connector, config)?;
    let report = synchronizer.run_pass().await?;

    print!("{}", render_summary(&report));

    if !report.is_success() {
        tracing::warn!(
            "{} table(s) failed; re-run to retry them from their last committed offset",
            report.failed_count()
        );
    }

    Ok(())
}

fn render_summary(report: &PassReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Replication pass finished in {}ms", report.duration_ms);
    for outcome in &report.outcomes {
        let line = match &outcome.result {
            Ok(TableAction::Replicated(unit)) => {
                let schema = match &unit.schema_change {
                    SchemaChange::Created => "created, ".to_string(),
                    SchemaChange::Altered { added } => format!("added {}, ", added.join(", ")),
                    SchemaChange::Unchanged => String::new(),
                };
                if unit.rows_loaded == 0 && unit.schema_change == SchemaChange::Unchanged {
                    format!("up to date ({} rows)", unit.rows_total)
                } else {
                    format!(
                        "{}{} rows loaded ({} total)",
                        schema, unit.rows_loaded, unit.rows_total
                    )
                }
            }
            Ok(TableAction::Dropped) => "dropped".to_string(),
            Err(e) => format!("FAILED [{}] {}", e.kind(), e),
        };
        let _ = writeln!(out, "  {:<32} {}", outcome.table, line);
    }
    let _ = writeln!(
        out,
        "{} table(s), {} rows loaded, {} dropped, {} failed",
        report.outcomes.len(),
        report.rows_loaded(),
        report.dropped_count(),
        report.failed_count()
    );
    out
}
