// ABOUTME: Source store contract for the replicator
// ABOUTME: Table listing, DESCRIBE-like metadata, row counts and ranged scans

pub mod reader;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::types::{warehouse_type, ColumnKind};

pub use reader::DuckDbSource;

/// A column as declared in the source store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    /// Declared type, passed to the warehouse verbatim apart from fixed aliases
    pub declared_type: String,
    /// 1-based ordinal position
    pub position: usize,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>, position: usize) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            position,
        }
    }

    pub fn kind(&self) -> ColumnKind {
        ColumnKind::from_declared(&self.declared_type)
    }

    pub fn warehouse_type(&self) -> String {
        warehouse_type(&self.declared_type)
    }
}

/// Columns and row count of a source table at the moment reconciliation runs.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub row_count: u64,
}

/// A single source cell, decoupled from the source driver's value type.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

/// Where a ranged read begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStart {
    /// Skip this many rows of the stable order.
    Offset(u64),
    /// Resume right after the row carrying this key, as returned in
    /// [`ScanBatch::last_key`]. Lets consecutive batches avoid re-skipping
    /// every row already read.
    After(i64),
}

/// Rows returned by one ranged read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanBatch {
    pub rows: Vec<Vec<SourceValue>>,
    /// Row key of the last row, or `None` when the batch is empty.
    pub last_key: Option<i64>,
}

impl ScanBatch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read-only access to the store being replicated.
///
/// Implementations must tolerate concurrent calls from several workers. Calls
/// are blocking; async callers go through [`run_blocking`].
pub trait SourceStore: Send + Sync + 'static {
    /// User tables, ordered by name.
    fn list_tables(&self) -> Result<Vec<String>>;

    /// Columns of `table` in declaration order.
    fn describe(&self, table: &str) -> Result<Vec<ColumnDescriptor>>;

    fn row_count(&self, table: &str) -> Result<u64>;

    /// Up to `limit` rows in the store's stable row order, beginning at
    /// `start`, each row holding one value per entry of `columns`, in that
    /// order.
    fn scan_range(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        start: ScanStart,
        limit: u64,
    ) -> Result<ScanBatch>;

    fn snapshot(&self, table: &str) -> Result<TableSnapshot> {
        let columns = self.describe(table)?;
        let row_count = self.row_count(table)?;
        Ok(TableSnapshot {
            table: table.to_string(),
            columns,
            row_count,
        })
    }
}

/// Run a blocking source call on the blocking thread pool.
pub async fn run_blocking<S, T, F>(source: &Arc<S>, call: F) -> Result<T>
where
    S: SourceStore,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T> + Send + 'static,
{
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || call(&source))
        .await
        .context("Source read task failed to complete")?
}
