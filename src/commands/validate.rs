// ABOUTME: Validate command - checks both stores and previews the next pass
// ABOUTME: Reports new, lagging, in-sync and vanished tables without copying rows

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use crate::error::ReplicationError;
use crate::source::DuckDbSource;
use crate::sync::{PlannedAction, SyncConfig, Synchronizer, TablePreview};
use crate::target::TargetConnector;

pub async fn validate(source_path: &Path, connector: TargetConnector, config: SyncConfig) -> Result<()> {
    tracing::info!("Validating source {} and target {}", source_path.display(), connector.display_url());

    let source = DuckDbSource::open(source_path).map_err(ReplicationError::source_unreachable)?;
    let synchronizer = Synchronizer::new(Arc::new(source), connector, config)?;
    let previews = synchronizer.preview().await?;

    print!("{}", render_preview(&previews));
    tracing::info!("Validation complete");
    Ok(())
}

fn render_preview(previews: &[TablePreview]) -> String {
    if previews.is_empty() {
        return "Source has no tables and the ledger is empty.\n".to_string();
    }

    let mut out = String::new();
    for preview in previews {
        let action = match &preview.action {
            PlannedAction::New => format!(
                "new: full load of {} rows",
                preview.source_rows.unwrap_or_default()
            ),
            PlannedAction::Behind { missing_rows } => format!(
                "behind: {} rows to copy (ledger at {})",
                missing_rows,
                preview.ledger_rows.unwrap_or_default()
            ),
            PlannedAction::InSync => format!("in sync ({} rows)", preview.ledger_rows.unwrap_or_default()),
            PlannedAction::Delete => "to delete: gone from source".to_string(),
            PlannedAction::Unreadable(reason) => format!("unreadable: {}", reason),
        };
        let _ = writeln!(out, "  {:<32} {}", preview.table, action);
        if !preview.missing_columns.is_empty() {
            let _ = writeln!(
                out,
                "  {:<32} columns to add: {}",
                "",
                preview.missing_columns.join(", ")
            );
        }
    }
    out
}
