// ABOUTME: Control ledger - per-table replication progress stored in the target warehouse
// ABOUTME: Rows-transferred offsets are written in the same transaction as the rows they cover

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::Serialize;
use tokio_postgres::{Client, GenericClient, Row};

use crate::utils::{quote_ident, quote_qualified, validate_identifier};

/// Default name of the ledger table.
pub const DEFAULT_LEDGER_TABLE: &str = "replication_ledger";

/// Progress of a single replicated table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerRecord {
    pub table_name: String,
    /// When rows were last committed for this table; `None` until the first
    /// batch lands
    pub last_synced_at: Option<NaiveDateTime>,
    /// Number of leading source rows already copied to the warehouse
    pub rows_transferred: u64,
}

/// Ledger columns, cast so operator-created ledgers with narrower column
/// types (`rows_transferred INTEGER`, say) decode the same way.
const RECORD_COLUMNS: &str =
    "table_name::text, last_synced_at::timestamp, rows_transferred::int8";

impl LedgerRecord {
    fn from_row(row: &Row) -> Result<Self> {
        let table_name: String = row.try_get(0).context("Failed to decode ledger table name")?;
        let last_synced_at = row
            .try_get(1)
            .with_context(|| format!("Failed to decode last_synced_at of '{}'", table_name))?;
        let rows: i64 = row
            .try_get(2)
            .with_context(|| format!("Failed to decode rows_transferred of '{}'", table_name))?;
        Ok(Self {
            table_name,
            last_synced_at,
            rows_transferred: rows.max(0) as u64,
        })
    }
}

/// Handle on the ledger table `schema.table` in the target warehouse.
///
/// The ledger holds no connection of its own. Every operation runs on the
/// client or transaction it is given, so the caller decides which writes
/// commit together.
#[derive(Debug, Clone)]
pub struct Ledger {
    schema: String,
    table: String,
}

impl Ledger {
    pub fn new(schema: &str, table: &str) -> Result<Self> {
        validate_identifier(schema).context("Invalid target schema name")?;
        validate_identifier(table).context("Invalid ledger table name")?;
        Ok(Self {
            schema: schema.to_string(),
            table: table.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    fn qualified(&self) -> String {
        quote_qualified(&self.schema, &self.table)
    }

    /// Create the target schema and the ledger table if they are missing.
    pub async fn ensure_table(&self, client: &Client) -> Result<()> {
        let ddl = format!(
            "CREATE SCHEMA IF NOT EXISTS {};
             CREATE TABLE IF NOT EXISTS {} (
                table_name TEXT PRIMARY KEY,
                last_synced_at TIMESTAMP,
                rows_transferred BIGINT NOT NULL DEFAULT 0
             )",
            quote_ident(&self.schema),
            self.qualified()
        );

        client
            .batch_execute(&ddl)
            .await
            .with_context(|| format!("Failed to create ledger table {}.{}", self.schema, self.table))?;

        tracing::debug!("Ledger table {}.{} is ready", self.schema, self.table);
        Ok(())
    }

    /// Look up the record for `table`. A missing record is not an error.
    pub async fn get<C: GenericClient>(&self, client: &C, table: &str) -> Result<Option<LedgerRecord>> {
        let query = format!(
            "SELECT {} FROM {} WHERE table_name = $1",
            RECORD_COLUMNS,
            self.qualified()
        );
        let row = client
            .query_opt(&query, &[&table])
            .await
            .with_context(|| format!("Failed to read ledger record for '{}'", table))?;

        row.as_ref().map(LedgerRecord::from_row).transpose()
    }

    /// Record a newly observed table with zero rows transferred. Existing
    /// records are left as they are.
    pub async fn initialize<C: GenericClient>(&self, client: &C, table: &str) -> Result<()> {
        let query = format!(
            "INSERT INTO {} (table_name, last_synced_at, rows_transferred)
             VALUES ($1, NULL, 0)
             ON CONFLICT (table_name) DO NOTHING",
            self.qualified()
        );
        client
            .execute(&query, &[&table])
            .await
            .with_context(|| format!("Failed to initialize ledger record for '{}'", table))?;
        Ok(())
    }

    /// Insert or advance the record for `table`.
    ///
    /// `rows_transferred` never moves backwards: the stored value is the
    /// greater of the old and new counts.
    pub async fn upsert_progress<C: GenericClient>(
        &self,
        client: &C,
        table: &str,
        synced_at: NaiveDateTime,
        rows_transferred: u64,
    ) -> Result<()> {
        let rows = i64::try_from(rows_transferred)
            .with_context(|| format!("Row count {} does not fit the ledger", rows_transferred))?;
        let query = format!(
            "INSERT INTO {table} (table_name, last_synced_at, rows_transferred)
             VALUES ($1, $2::timestamp, $3::int8)
             ON CONFLICT (table_name) DO UPDATE SET
                last_synced_at = EXCLUDED.last_synced_at,
                rows_transferred = GREATEST({table}.rows_transferred, EXCLUDED.rows_transferred)",
            table = self.qualified()
        );
        client
            .execute(&query, &[&table, &synced_at, &rows])
            .await
            .with_context(|| format!("Failed to update ledger record for '{}'", table))?;
        Ok(())
    }

    /// Delete the record for `table`. Returns whether a record existed.
    pub async fn remove<C: GenericClient>(&self, client: &C, table: &str) -> Result<bool> {
        let query = format!("DELETE FROM {} WHERE table_name = $1", self.qualified());
        let deleted = client
            .execute(&query, &[&table])
            .await
            .with_context(|| format!("Failed to remove ledger record for '{}'", table))?;
        Ok(deleted > 0)
    }

    /// Names of every table the ledger knows about.
    pub async fn list_known_tables(&self, client: &Client) -> Result<BTreeSet<String>> {
        let query = format!("SELECT table_name FROM {}", self.qualified());
        let rows = client
            .query(&query, &[])
            .await
            .context("Failed to list ledger tables")?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    /// Every record, ordered by table name.
    pub async fn list_records(&self, client: &Client) -> Result<Vec<LedgerRecord>> {
        let query = format!(
            "SELECT {} FROM {} ORDER BY table_name",
            RECORD_COLUMNS,
            self.qualified()
        );
        let rows = client
            .query(&query, &[])
            .await
            .context("Failed to list ledger records")?;
        rows.iter().map(LedgerRecord::from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_names() {
        assert!(Ledger::new("public", DEFAULT_LEDGER_TABLE).is_ok());
        assert!(Ledger::new("", DEFAULT_LEDGER_TABLE).is_err());
        assert!(Ledger::new("public", "bad\0name").is_err());
    }

    #[test]
    fn test_qualified_name_is_quoted() {
        let ledger = Ledger::new("analytics", "Replication Ledger").unwrap();
        assert_eq!(ledger.qualified(), "\"analytics\".\"Replication Ledger\"");
        assert_eq!(ledger.schema(), "analytics");
        assert_eq!(ledger.table_name(), "Replication Ledger");
    }

    #[test]
    fn test_record_columns_decode_as_fixed_types() {
        let columns: Vec<&str> = RECORD_COLUMNS.split(", ").collect();
        assert_eq!(
            columns,
            vec![
                "table_name::text",
                "last_synced_at::timestamp",
                "rows_transferred::int8"
            ]
        );
    }

    #[test]
    fn test_record_serializes_for_status_output() {
        let record = LedgerRecord {
            table_name: "orders".to_string(),
            last_synced_at: None,
            rows_transferred: 130,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["table_name"], "orders");
        assert_eq!(json["rows_transferred"], 130);
        assert!(json["last_synced_at"].is_null());
    }
}
