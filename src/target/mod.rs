// ABOUTME: Target warehouse access - connections, metadata lookups and row writes
// ABOUTME: Metadata is read from information_schema of the configured target schema

pub mod connection;
pub mod params;
pub mod writer;

use anyhow::{Context, Result};
use tokio_postgres::Client;

pub use connection::TargetConnector;

/// Check whether `schema.table` exists on the target.
pub async fn table_exists(client: &Client, schema: &str, table: &str) -> Result<bool> {
    let row = client
        .query_one(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            )",
            &[&schema, &table],
        )
        .await
        .with_context(|| format!("Failed to check existence of {}.{}", schema, table))?;

    Ok(row.get(0))
}

/// Column names of `schema.table` in ordinal order, or `None` when the table
/// does not exist.
pub async fn table_columns(
    client: &Client,
    schema: &str,
    table: &str,
) -> Result<Option<Vec<String>>> {
    if !table_exists(client, schema, table).await? {
        return Ok(None);
    }

    let rows = client
        .query(
            "SELECT column_name
             FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2
             ORDER BY ordinal_position",
            &[&schema, &table],
        )
        .await
        .with_context(|| format!("Failed to read columns of {}.{}", schema, table))?;

    Ok(Some(rows.iter().map(|row| row.get(0)).collect()))
}
