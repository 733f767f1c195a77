// ABOUTME: Row transfer engine - copies the unsynced tail of a source table in batches
// ABOUTME: Each batch commits together with the ledger offset that covers it

use std::sync::Arc;

use tokio_postgres::Client;

use crate::error::ReplicationError;
use crate::ledger::Ledger;
use crate::source::{run_blocking, ColumnDescriptor, ScanStart, SourceStore, TableSnapshot};
use crate::target::writer::{insert_rows, max_rows_per_statement};

/// Default number of rows read and inserted per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Half-open range `[start, end)` of source rows still to be copied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferRange {
    pub start: u64,
    pub end: u64,
}

impl TransferRange {
    /// Range between the ledger offset and the source row count, or `None`
    /// when the source has nothing new.
    pub fn new(already_transferred: u64, source_rows: u64) -> Option<Self> {
        (source_rows > already_transferred).then_some(Self {
            start: already_transferred,
            end: source_rows,
        })
    }

    /// Number of rows in the range, never zero.
    pub fn row_count(&self) -> u64 {
        self.end - self.start
    }

    /// `(offset, limit)` windows covering the range.
    pub fn batches(&self, batch_size: u64) -> impl Iterator<Item = (u64, u64)> {
        let step = batch_size.max(1);
        let end = self.end;
        (self.start..end)
            .step_by(step as usize)
            .map(move |offset| (offset, step.min(end - offset)))
    }
}

/// Batch size actually used for a table with `num_columns` columns, so one
/// batch always fits in a single INSERT.
pub fn effective_batch_size(requested: usize, num_columns: usize) -> usize {
    requested.clamp(1, max_rows_per_statement(num_columns))
}

/// Copy rows `[already_transferred, snapshot.row_count)` to the target.
///
/// Every batch runs in its own target transaction holding the INSERT and the
/// ledger update to the new offset, so the ledger never runs ahead of or
/// behind the committed rows. A failure leaves earlier batches committed.
///
/// Only the first batch is addressed by offset; each later batch resumes
/// after the row key the previous one ended on.
///
/// # Returns
///
/// The number of rows inserted.
pub async fn transfer_rows<S: SourceStore>(
    source: &Arc<S>,
    client: &mut Client,
    ledger: &Ledger,
    schema: &str,
    snapshot: &TableSnapshot,
    already_transferred: u64,
    batch_size: usize,
) -> Result<u64, ReplicationError> {
    let table = snapshot.table.as_str();
    let range = match TransferRange::new(already_transferred, snapshot.row_count) {
        Some(range) => range,
        None => {
            if snapshot.row_count < already_transferred {
                tracing::warn!(
                    "Source table '{}' has {} rows but the ledger records {}; nothing to copy",
                    table,
                    snapshot.row_count,
                    already_transferred
                );
            }
            return Ok(0);
        }
    };

    let batch_size = effective_batch_size(batch_size, snapshot.columns.len());
    let columns: Arc<Vec<ColumnDescriptor>> = Arc::new(snapshot.columns.clone());

    tracing::info!(
        "Copying rows {}..{} of '{}' ({} rows, batch size {})",
        range.start,
        range.end,
        table,
        range.row_count(),
        batch_size
    );

    let mut loaded = 0u64;
    let mut batch_count = 0u64;
    let mut last_key: Option<i64> = None;

    for (offset, limit) in range.batches(batch_size as u64) {
        let start = match last_key {
            Some(key) => ScanStart::After(key),
            None => ScanStart::Offset(offset),
        };
        let batch = {
            let scan_table = table.to_string();
            let columns = Arc::clone(&columns);
            run_blocking(source, move |s| s.scan_range(&scan_table, &columns, start, limit)).await
        }
        .map_err(|e| ReplicationError::transfer(table, e))?;

        if batch.is_empty() {
            tracing::warn!(
                "Source table '{}' returned no rows at offset {}; stopping early",
                table,
                offset
            );
            break;
        }

        let batch_len = batch.len() as u64;
        last_key = batch.last_key;
        let tx = client
            .transaction()
            .await
            .map_err(|e| ReplicationError::transfer(table, e))?;

        insert_rows(&tx, schema, table, &columns, batch.rows)
            .await
            .map_err(|e| ReplicationError::transfer(table, e))?;

        ledger
            .upsert_progress(&tx, table, chrono::Utc::now().naive_utc(), offset + batch_len)
            .await
            .map_err(ReplicationError::storage)?;

        tx.commit()
            .await
            .map_err(|e| ReplicationError::transfer(table, e))?;

        batch_count += 1;
        loaded += batch_len;

        tracing::debug!(
            "Committed batch {} of '{}': rows {}..{}",
            batch_count,
            table,
            offset,
            offset + batch_len
        );

        if batch_count % 10 == 0 {
            tracing::info!(
                "Progress: '{}' - {} of {} rows copied ({} batches)",
                table,
                loaded,
                range.row_count(),
                batch_count
            );
        }

        if batch_len < limit {
            tracing::warn!(
                "Source table '{}' returned {} of {} requested rows at offset {}; stopping early",
                table,
                batch_len,
                limit,
                offset
            );
            break;
        }
    }

    Ok(loaded)
}
