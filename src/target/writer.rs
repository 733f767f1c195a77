// ABOUTME: Batched INSERT writer for the target warehouse
// ABOUTME: Builds multi-row INSERT statements with typed placeholders

use anyhow::{Context, Result};
use tokio_postgres::types::ToSql;
use tokio_postgres::Transaction;

use super::params::{bind, placeholder, BoxedParam};
use crate::source::{ColumnDescriptor, SourceValue};
use crate::utils::{quote_ident, quote_qualified};

/// Parameters allowed per statement, leaving margin under PostgreSQL's 65535.
const MAX_PARAMS: usize = 65000;

/// Largest number of rows a single INSERT can carry for `num_columns`.
pub fn max_rows_per_statement(num_columns: usize) -> usize {
    std::cmp::max(1, MAX_PARAMS / num_columns.max(1))
}

/// Insert `rows` into `schema.table` inside `tx`.
///
/// Rows are split into statements that stay within the parameter limit.
/// Every row must carry one value per entry of `columns`, in that order.
///
/// # Returns
///
/// The number of rows inserted.
pub async fn insert_rows(
    tx: &Transaction<'_>,
    schema: &str,
    table: &str,
    columns: &[ColumnDescriptor],
    rows: Vec<Vec<SourceValue>>,
) -> Result<u64> {
    if rows.is_empty() {
        return Ok(0);
    }

    let chunk_rows = max_rows_per_statement(columns.len());
    let mut inserted = 0u64;
    let mut rows = rows.into_iter().peekable();

    while rows.peek().is_some() {
        let mut params: Vec<BoxedParam> = Vec::with_capacity(chunk_rows * columns.len());
        let mut num_rows = 0usize;
        for row in rows.by_ref().take(chunk_rows) {
            if row.len() != columns.len() {
                anyhow::bail!(
                    "Row has {} values but {} columns are being written",
                    row.len(),
                    columns.len()
                );
            }
            for (value, column) in row.into_iter().zip(columns) {
                let param = bind(value, column.kind())
                    .with_context(|| format!("Failed to bind column '{}'", column.name))?;
                params.push(param);
            }
            num_rows += 1;
        }

        let query = build_insert_query(schema, table, columns, num_rows);
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        inserted += tx
            .execute(&query, &refs)
            .await
            .with_context(|| format!("Failed to insert {} rows into {}.{}", num_rows, schema, table))?;
    }

    Ok(inserted)
}

/// Build a multi-row INSERT for the given columns and batch size.
///
/// Generates a query like:
/// ```sql
/// INSERT INTO "schema"."table" ("id", "total")
/// VALUES ($1::int8, $2::text::DECIMAL(10,2)), ($3::int8, $4::text::DECIMAL(10,2))
/// ```
pub fn build_insert_query(
    schema: &str,
    table: &str,
    columns: &[ColumnDescriptor],
    num_rows: usize,
) -> String {
    let quoted_columns: Vec<String> = columns.iter().map(|c| quote_ident(&c.name)).collect();
    let kinds: Vec<_> = columns
        .iter()
        .map(|c| (c.kind(), c.warehouse_type()))
        .collect();

    let num_cols = columns.len();
    let value_rows: Vec<String> = (0..num_rows)
        .map(|row_idx| {
            let placeholders: Vec<String> = kinds
                .iter()
                .enumerate()
                .map(|(col_idx, (kind, wh_type))| {
                    placeholder(*kind, wh_type, row_idx * num_cols + col_idx + 1)
                })
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect();

    format!(
        "INSERT INTO {} ({}) VALUES {}",
        quote_qualified(schema, table),
        quoted_columns.join(", "),
        value_rows.join(", ")
    )
}
