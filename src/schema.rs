// ABOUTME: Schema reconciler - decides and applies additive DDL for one replicated table
// ABOUTME: Creates missing tables, adds missing columns and drops tables gone from the source

use anyhow::{Context, Result};
use tokio_postgres::Client;

use crate::error::ReplicationError;
use crate::ledger::Ledger;
use crate::source::{ColumnDescriptor, TableSnapshot};
use crate::utils::{quote_ident, quote_qualified, validate_identifier, validate_type_name};

/// Structural change needed on the target for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaPlan {
    /// The table does not exist on the target.
    CreateTable,
    /// The table exists but lacks these source columns, in source order.
    AddColumns(Vec<ColumnDescriptor>),
    NoChange,
}

/// Outcome of comparing a source snapshot with the target and the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub plan: SchemaPlan,
    /// No ledger record exists yet; one is created with zero rows together
    /// with the DDL.
    pub initialize_ledger: bool,
}

impl Reconciliation {
    /// Decide what the target needs so it can hold every source column.
    ///
    /// `target_columns` is `None` when the target table does not exist.
    /// Columns are compared by exact name; target-only columns and type
    /// differences are ignored.
    pub fn decide(
        snapshot: &TableSnapshot,
        target_columns: Option<&[String]>,
        has_record: bool,
    ) -> Self {
        let plan = match target_columns {
            None => SchemaPlan::CreateTable,
            Some(existing) => {
                let missing: Vec<ColumnDescriptor> = snapshot
                    .columns
                    .iter()
                    .filter(|c| !existing.iter().any(|e| e == &c.name))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    SchemaPlan::NoChange
                } else {
                    SchemaPlan::AddColumns(missing)
                }
            }
        };

        Self {
            plan,
            initialize_ledger: !has_record,
        }
    }

    /// Nothing to write on the target.
    pub fn is_noop(&self) -> bool {
        self.plan == SchemaPlan::NoChange && !self.initialize_ledger
    }
}

/// What reconciliation actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    Created,
    Altered { added: Vec<String> },
    Unchanged,
}

/// Build `CREATE TABLE IF NOT EXISTS` for a source snapshot.
pub fn create_table_sql(schema: &str, snapshot: &TableSnapshot) -> Result<String> {
    validate_identifier(&snapshot.table).context("Invalid table name")?;
    let definitions = snapshot
        .columns
        .iter()
        .map(column_definition)
        .collect::<Result<Vec<_>>>()?;

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_qualified(schema, &snapshot.table),
        definitions.join(", ")
    ))
}

/// Build `ALTER TABLE ... ADD COLUMN` for one missing column.
pub fn add_column_sql(schema: &str, table: &str, column: &ColumnDescriptor) -> Result<String> {
    validate_identifier(table).context("Invalid table name")?;
    Ok(format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_qualified(schema, table),
        column_definition(column)?
    ))
}

pub fn drop_table_sql(schema: &str, table: &str) -> Result<String> {
    validate_identifier(table).context("Invalid table name")?;
    Ok(format!("DROP TABLE IF EXISTS {}", quote_qualified(schema, table)))
}

fn column_definition(column: &ColumnDescriptor) -> Result<String> {
    validate_identifier(&column.name)
        .with_context(|| format!("Invalid column name '{}'", column.name))?;
    let wh_type = column.warehouse_type();
    validate_type_name(&wh_type)
        .with_context(|| format!("Invalid type for column '{}'", column.name))?;
    Ok(format!("{} {}", quote_ident(&column.name), wh_type))
}

/// Apply a reconciliation in a single target transaction.
///
/// DDL and the zero-row ledger record commit together. A no-op
/// reconciliation opens no transaction at all.
pub async fn apply(
    client: &mut Client,
    ledger: &Ledger,
    schema: &str,
    snapshot: &TableSnapshot,
    reconciliation: &Reconciliation,
) -> Result<SchemaChange, ReplicationError> {
    let table = snapshot.table.as_str();
    if reconciliation.is_noop() {
        return Ok(SchemaChange::Unchanged);
    }

    let statements = match &reconciliation.plan {
        SchemaPlan::CreateTable => vec![create_table_sql(schema, snapshot)],
        SchemaPlan::AddColumns(missing) => missing
            .iter()
            .map(|column| add_column_sql(schema, table, column))
            .collect(),
        SchemaPlan::NoChange => Vec::new(),
    }
    .into_iter()
    .collect::<Result<Vec<_>>>()
    .map_err(|e| ReplicationError::schema_conflict(table, e))?;

    let tx = client
        .transaction()
        .await
        .map_err(|e| ReplicationError::schema_conflict(table, e))?;

    for statement in &statements {
        tracing::debug!("Executing DDL for '{}': {}", table, statement);
        tx.batch_execute(statement)
            .await
            .with_context(|| format!("Target rejected DDL: {}", statement))
            .map_err(|e| ReplicationError::schema_conflict(table, e))?;
    }

    if reconciliation.initialize_ledger {
        ledger
            .initialize(&tx, table)
            .await
            .map_err(ReplicationError::storage)?;
    }

    tx.commit()
        .await
        .context("Failed to commit schema changes")
        .map_err(|e| ReplicationError::schema_conflict(table, e))?;

    let change = match &reconciliation.plan {
        SchemaPlan::CreateTable => {
            tracing::info!(
                "Created table {}.{} with {} columns",
                schema,
                table,
                snapshot.columns.len()
            );
            SchemaChange::Created
        }
        SchemaPlan::AddColumns(missing) => {
            let added: Vec<String> = missing.iter().map(|c| c.name.clone()).collect();
            tracing::info!(
                "Altered table {}.{}: added columns {}",
                schema,
                table,
                added.join(", ")
            );
            SchemaChange::Altered { added }
        }
        SchemaPlan::NoChange => SchemaChange::Unchanged,
    };

    Ok(change)
}

/// Drop a warehouse table and its ledger record in one transaction.
pub async fn drop_table(
    client: &mut Client,
    ledger: &Ledger,
    schema: &str,
    table: &str,
) -> Result<(), ReplicationError> {
    let statement =
        drop_table_sql(schema, table).map_err(|e| ReplicationError::schema_conflict(table, e))?;

    let tx = client
        .transaction()
        .await
        .map_err(|e| ReplicationError::schema_conflict(table, e))?;

    tx.batch_execute(&statement)
        .await
        .with_context(|| format!("Target rejected DDL: {}", statement))
        .map_err(|e| ReplicationError::schema_conflict(table, e))?;

    ledger
        .remove(&tx, table)
        .await
        .map_err(ReplicationError::storage)?;

    tx.commit()
        .await
        .context("Failed to commit table drop")
        .map_err(|e| ReplicationError::schema_conflict(table, e))?;

    Ok(())
}
