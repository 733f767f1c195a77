// ABOUTME: Status command - shows per-table replication progress from the ledger
// ABOUTME: Read-only; prints a table or JSON

use std::fmt::Write as _;

use anyhow::{Context, Result};

use crate::ledger::{Ledger, LedgerRecord};
use crate::target::{self, TargetConnector};

pub async fn status(connector: TargetConnector, schema: &str, ledger_table: &str, json: bool) -> Result<()> {
    let ledger = Ledger::new(schema, ledger_table)?;
    let client = connector
        .connect_with_retry()
        .await
        .context("Failed to connect to target database")?;

    let records = if target::table_exists(&client, ledger.schema(), ledger.table_name()).await? {
        ledger.list_records(&client).await?
    } else {
        tracing::info!(
            "Ledger table {}.{} does not exist yet",
            ledger.schema(),
            ledger.table_name()
        );
        Vec::new()
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("Failed to serialize ledger records")?
        );
    } else {
        print!("{}", render_records(&records));
    }

    Ok(())
}

fn render_records(records: &[LedgerRecord]) -> String {
    if records.is_empty() {
        return "No tables have been replicated yet.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "{:<32} {:>14}  {}", "TABLE", "ROWS", "LAST SYNCED (UTC)");
    for record in records {
        let synced = record
            .last_synced_at
            .map(|ts| ts.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(
            out,
            "{:<32} {:>14}  {}",
            record.table_name, record.rows_transferred, synced
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_render_empty() {
        assert_eq!(render_records(&[]), "No tables have been replicated yet.\n");
    }

    #[test]
    fn test_render_records() {
        let records = vec![
            LedgerRecord {
                table_name: "orders".to_string(),
                last_synced_at: NaiveDate::from_ymd_opt(2024, 3, 1)
                    .and_then(|d| d.and_hms_opt(12, 30, 5)),
                rows_transferred: 130,
            },
            LedgerRecord {
                table_name: "users".to_string(),
                last_synced_at: None,
                rows_transferred: 0,
            },
        ];
        let out = render_records(&records);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("TABLE"));
        assert!(lines[1].starts_with("orders"));
        assert!(lines[1].contains("130"));
        assert!(lines[1].ends_with("2024-03-01 12:30:05"));
        assert!(lines[2].ends_with("never"));
    }
}
