// ABOUTME: Synchronizer - runs one replication pass over every source table
// ABOUTME: Drops vanished tables, then replicates each table as an isolated unit on a bounded pool

use std::collections::BTreeSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::ReplicationError;
use crate::ledger::{Ledger, DEFAULT_LEDGER_TABLE};
use crate::schema::{self, Reconciliation, SchemaChange, SchemaPlan};
use crate::source::{run_blocking, SourceStore, TableSnapshot};
use crate::target::{self, TargetConnector};
use crate::transfer::{transfer_rows, DEFAULT_BATCH_SIZE};
use crate::utils::validate_identifier;

/// Configuration for a replication pass.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Units running at the same time
    pub workers: usize,
    /// Rows per transfer batch
    pub batch_size: usize,
    /// Time budget of a single table unit
    pub unit_timeout: Duration,
    /// Target schema holding the replicated tables and the ledger
    pub schema: String,
    pub ledger_table: String,
    /// Source tables to replicate (empty = all tables). A restricted pass
    /// never drops anything.
    pub tables: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            batch_size: DEFAULT_BATCH_SIZE,
            unit_timeout: Duration::from_secs(1800),
            schema: "public".to_string(),
            ledger_table: DEFAULT_LEDGER_TABLE.to_string(),
            tables: Vec::new(),
        }
    }
}

/// What a successful unit did to its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub schema_change: SchemaChange,
    pub rows_loaded: u64,
    /// Ledger offset after the unit
    pub rows_total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableAction {
    Replicated(UnitReport),
    Dropped,
}

/// Final state of one table in a pass.
#[derive(Debug)]
pub struct TableOutcome {
    pub table: String,
    pub result: Result<TableAction, ReplicationError>,
}

impl TableOutcome {
    fn log(&self) {
        match &self.result {
            Ok(TableAction::Replicated(report)) => match &report.schema_change {
                SchemaChange::Created => tracing::info!(
                    "Table '{}': created, loaded {} rows",
                    self.table,
                    report.rows_loaded
                ),
                SchemaChange::Altered { added } => tracing::info!(
                    "Table '{}': altered (added {}), loaded {} rows",
                    self.table,
                    added.join(", "),
                    report.rows_loaded
                ),
                SchemaChange::Unchanged if report.rows_loaded == 0 => tracing::info!(
                    "Table '{}': no-op ({} rows already replicated)",
                    self.table,
                    report.rows_total
                ),
                SchemaChange::Unchanged => tracing::info!(
                    "Table '{}': loaded {} rows ({} total)",
                    self.table,
                    report.rows_loaded,
                    report.rows_total
                ),
            },
            Ok(TableAction::Dropped) => tracing::info!("Table '{}': dropped", self.table),
            Err(e) => tracing::error!("Table '{}': failed ({}): {}", self.table, e.kind(), e),
        }
    }
}

/// Outcomes of one pass, ordered by table name.
#[derive(Debug, Default)]
pub struct PassReport {
    pub outcomes: Vec<TableOutcome>,
    pub duration_ms: u64,
}

impl PassReport {
    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_err()).count()
    }

    pub fn rows_loaded(&self) -> u64 {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.result {
                Ok(TableAction::Replicated(report)) => Some(report.rows_loaded),
                _ => None,
            })
            .sum()
    }

    pub fn dropped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.result, Ok(TableAction::Dropped)))
            .count()
    }

    /// Check if every table in the pass succeeded.
    pub fn is_success(&self) -> bool {
        self.failed_count() == 0
    }

    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.outcomes.iter().find(|o| o.table == table)
    }
}

/// What the next pass would do with a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// No ledger record yet; the table will be created or adopted and fully loaded.
    New,
    /// Source rows not yet copied.
    Behind { missing_rows: u64 },
    InSync,
    /// Recorded in the ledger but gone from the source.
    Delete,
    /// The source table could not be read.
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePreview {
    pub table: String,
    pub source_rows: Option<u64>,
    pub ledger_rows: Option<u64>,
    /// Source columns the target table lacks
    pub missing_columns: Vec<String>,
    pub action: PlannedAction,
}

impl TablePreview {
    fn classify(
        snapshot: &TableSnapshot,
        target_columns: Option<&[String]>,
        ledger_rows: Option<u64>,
    ) -> Self {
        let reconciliation = Reconciliation::decide(snapshot, target_columns, ledger_rows.is_some());
        let missing_columns = match &reconciliation.plan {
            SchemaPlan::AddColumns(missing) => missing.iter().map(|c| c.name.clone()).collect(),
            SchemaPlan::CreateTable | SchemaPlan::NoChange => Vec::new(),
        };
        let action = match ledger_rows {
            None => PlannedAction::New,
            Some(done) if snapshot.row_count > done => PlannedAction::Behind {
                missing_rows: snapshot.row_count - done,
            },
            Some(_) => PlannedAction::InSync,
        };
        Self {
            table: snapshot.table.clone(),
            source_rows: Some(snapshot.row_count),
            ledger_rows,
            missing_columns,
            action,
        }
    }
}

/// Replicates a source store into the target warehouse.
pub struct Synchronizer<S: SourceStore> {
    source: Arc<S>,
    connector: TargetConnector,
    ledger: Ledger,
    config: SyncConfig,
}

impl<S: SourceStore> Synchronizer<S> {
    pub fn new(
        source: Arc<S>,
        connector: TargetConnector,
        config: SyncConfig,
    ) -> Result<Self, ReplicationError> {
        if config.workers == 0 {
            return Err(ReplicationError::config("worker count must be at least 1"));
        }
        if config.batch_size == 0 {
            return Err(ReplicationError::config("batch size must be at least 1"));
        }
        let ledger = Ledger::new(&config.schema, &config.ledger_table)
            .map_err(|e| ReplicationError::config(format!("{:#}", e)))?;

        Ok(Self {
            source,
            connector,
            ledger,
            config,
        })
    }

    /// Run one replication pass.
    ///
    /// Returns `Err` only for pipeline-wide failures: the target cannot be
    /// reached, the ledger cannot be bootstrapped or the source tables cannot
    /// be listed. Per-table failures are reported in the [`PassReport`].
    pub async fn run_pass(&self) -> Result<PassReport, ReplicationError> {
        let start = Instant::now();

        let mut client = self
            .connector
            .connect_with_retry()
            .await
            .map_err(ReplicationError::target_unreachable)?;
        self.ledger
            .ensure_table(&client)
            .await
            .map_err(ReplicationError::storage)?;

        let source_tables = run_blocking(&self.source, |s| s.list_tables())
            .await
            .map_err(ReplicationError::source_unreachable)?;
        let known = self
            .ledger
            .list_known_tables(&client)
            .await
            .map_err(ReplicationError::storage)?;

        let tables = select_tables(&source_tables, &self.config.tables);
        let mut outcomes = Vec::new();

        if self.config.tables.is_empty() {
            for table in vanished_tables(&known, &source_tables) {
                tracing::info!("Table '{}' is gone from the source; dropping it", table);
                let result = schema::drop_table(&mut client, &self.ledger, &self.config.schema, &table)
                    .await
                    .map(|()| TableAction::Dropped);
                let outcome = TableOutcome { table, result };
                outcome.log();
                outcomes.push(outcome);
            }
        } else {
            tracing::info!(
                "Restricted pass over {} table(s); skipping deletion of vanished tables",
                tables.len()
            );
        }
        drop(client);

        tracing::info!(
            "Replicating {} table(s) with {} worker(s)",
            tables.len(),
            self.config.workers
        );

        let units = run_bounded(
            tables,
            self.config.workers,
            self.config.unit_timeout,
            |table| {
                let unit = TableUnit {
                    source: Arc::clone(&self.source),
                    connector: self.connector.clone(),
                    ledger: self.ledger.clone(),
                    schema: self.config.schema.clone(),
                    batch_size: self.config.batch_size,
                };
                async move { unit.run(&table).await }
            },
        )
        .await;
        outcomes.extend(units);

        outcomes.sort_by(|a, b| a.table.cmp(&b.table));
        let report = PassReport {
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        tracing::info!(
            "Pass completed in {}ms: {} table(s), {} rows loaded, {} dropped, {} failed",
            report.duration_ms,
            report.outcomes.len(),
            report.rows_loaded(),
            report.dropped_count(),
            report.failed_count()
        );

        Ok(report)
    }

    /// Describe what the next pass would do without writing any rows.
    ///
    /// The ledger table is bootstrapped if it is missing.
    pub async fn preview(&self) -> Result<Vec<TablePreview>, ReplicationError> {
        let client = self
            .connector
            .connect_with_retry()
            .await
            .map_err(ReplicationError::target_unreachable)?;
        self.ledger
            .ensure_table(&client)
            .await
            .map_err(ReplicationError::storage)?;

        let source_tables = run_blocking(&self.source, |s| s.list_tables())
            .await
            .map_err(ReplicationError::source_unreachable)?;
        let records = self
            .ledger
            .list_records(&client)
            .await
            .map_err(ReplicationError::storage)?;

        let mut previews = Vec::new();
        for table in select_tables(&source_tables, &self.config.tables) {
            let ledger_rows = records
                .iter()
                .find(|r| r.table_name == table)
                .map(|r| r.rows_transferred);

            let snapshot = {
                let table = table.clone();
                run_blocking(&self.source, move |s| s.snapshot(&table)).await
            };
            let snapshot = match snapshot {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    previews.push(TablePreview {
                        table,
                        source_rows: None,
                        ledger_rows,
                        missing_columns: Vec::new(),
                        action: PlannedAction::Unreadable(format!("{:#}", e)),
                    });
                    continue;
                }
            };

            let target_columns = target::table_columns(&client, &self.config.schema, &table)
                .await
                .map_err(|e| ReplicationError::schema_conflict(&table, e))?;
            previews.push(TablePreview::classify(
                &snapshot,
                target_columns.as_deref(),
                ledger_rows,
            ));
        }

        if self.config.tables.is_empty() {
            let known: BTreeSet<String> = records.iter().map(|r| r.table_name.clone()).collect();
            for table in vanished_tables(&known, &source_tables) {
                let ledger_rows = records
                    .iter()
                    .find(|r| r.table_name == table)
                    .map(|r| r.rows_transferred);
                previews.push(TablePreview {
                    table,
                    source_rows: None,
                    ledger_rows,
                    missing_columns: Vec::new(),
                    action: PlannedAction::Delete,
                });
            }
        }

        previews.sort_by(|a, b| a.table.cmp(&b.table));
        Ok(previews)
    }
}

/// Everything one table's unit needs, owned so it can move onto the pool.
struct TableUnit<S: SourceStore> {
    source: Arc<S>,
    connector: TargetConnector,
    ledger: Ledger,
    schema: String,
    batch_size: usize,
}

impl<S: SourceStore> TableUnit<S> {
    /// Reconcile, transfer, and record one table on a dedicated target client.
    async fn run(self, table: &str) -> Result<TableAction, ReplicationError> {
        if table == self.ledger.table_name() {
            return Err(ReplicationError::schema_conflict(
                table,
                anyhow::anyhow!("source table name collides with the ledger table"),
            ));
        }
        validate_identifier(table).map_err(|e| ReplicationError::schema_conflict(table, e))?;

        let snapshot = {
            let table = table.to_string();
            run_blocking(&self.source, move |s| s.snapshot(&table)).await
        }
        .map_err(|e| ReplicationError::transfer(table, e))?;

        let mut client = self
            .connector
            .connect_with_retry()
            .await
            .map_err(ReplicationError::target_unreachable)?;

        let target_columns = target::table_columns(&client, &self.schema, table)
            .await
            .map_err(|e| ReplicationError::schema_conflict(table, e))?;
        let record = self
            .ledger
            .get(&client, table)
            .await
            .map_err(ReplicationError::storage)?;

        let reconciliation =
            Reconciliation::decide(&snapshot, target_columns.as_deref(), record.is_some());
        let schema_change =
            schema::apply(&mut client, &self.ledger, &self.schema, &snapshot, &reconciliation)
                .await?;

        let already = record.map(|r| r.rows_transferred).unwrap_or(0);
        let rows_loaded = transfer_rows(
            &self.source,
            &mut client,
            &self.ledger,
            &self.schema,
            &snapshot,
            already,
            self.batch_size,
        )
        .await?;

        Ok(TableAction::Replicated(UnitReport {
            schema_change,
            rows_loaded,
            rows_total: already + rows_loaded,
        }))
    }
}

/// Run one unit per table with at most `workers` of them in flight.
///
/// Every table gets exactly one outcome, including units that panic, time
/// out or are lost by the runtime.
async fn run_bounded<F, Fut>(
    tables: Vec<String>,
    workers: usize,
    timeout: Duration,
    make_unit: F,
) -> Vec<TableOutcome>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<TableAction, ReplicationError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers));
    let mut pending: BTreeSet<String> = tables.iter().cloned().collect();
    let mut join_set: JoinSet<TableOutcome> = JoinSet::new();

    for table in tables {
        let unit = make_unit(table.clone());
        let semaphore = Arc::clone(&semaphore);

        join_set.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => run_guarded(&table, timeout, unit).await,
                Err(e) => Err(ReplicationError::Panicked {
                    table: table.clone(),
                    message: format!("worker pool closed: {}", e),
                }),
            };
            TableOutcome { table, result }
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(outcome) => {
                pending.remove(&outcome.table);
                outcome.log();
                outcomes.push(outcome);
            }
            Err(e) => tracing::error!("Replication unit ended abnormally: {}", e),
        }
    }

    for table in pending {
        let outcome = TableOutcome {
            result: Err(ReplicationError::Panicked {
                table: table.clone(),
                message: "unit ended without reporting an outcome".to_string(),
            }),
            table,
        };
        outcome.log();
        outcomes.push(outcome);
    }

    outcomes
}

/// Run a unit under its time budget, turning panics into a failure outcome.
async fn run_guarded<Fut>(
    table: &str,
    timeout: Duration,
    unit: Fut,
) -> Result<TableAction, ReplicationError>
where
    Fut: Future<Output = Result<TableAction, ReplicationError>>,
{
    let guarded = AssertUnwindSafe(tokio::time::timeout(timeout, unit))
        .catch_unwind()
        .await;

    match guarded {
        Ok(Ok(result)) => result,
        Ok(Err(_elapsed)) => Err(ReplicationError::Timeout {
            table: table.to_string(),
            after: timeout,
        }),
        Err(panic) => Err(ReplicationError::Panicked {
            table: table.to_string(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Source tables to replicate, honoring an explicit table list.
fn select_tables(source_tables: &[String], requested: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return source_tables.to_vec();
    }
    for name in requested {
        if !source_tables.contains(name) {
            tracing::warn!("Requested table '{}' does not exist in the source; skipping", name);
        }
    }
    source_tables
        .iter()
        .filter(|t| requested.contains(t))
        .cloned()
        .collect()
}

/// Ledger tables no longer present in the source.
fn vanished_tables(known: &BTreeSet<String>, source_tables: &[String]) -> Vec<String> {
    known
        .iter()
        .filter(|t| !source_tables.contains(t))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ColumnDescriptor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn snapshot(row_count: u64) -> TableSnapshot {
        TableSnapshot {
            table: "orders".to_string(),
            columns: vec![
                ColumnDescriptor::new("id", "BIGINT", 1),
                ColumnDescriptor::new("total", "DOUBLE", 2),
            ],
            row_count,
        }
    }

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.workers, 4);
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.unit_timeout, Duration::from_secs(1800));
        assert_eq!(config.schema, "public");
        assert_eq!(config.ledger_table, "replication_ledger");
        assert!(config.tables.is_empty());
    }

    #[test]
    fn test_select_tables() {
        let source = names(&["orders", "users", "events"]);
        assert_eq!(select_tables(&source, &[]), source);
        assert_eq!(
            select_tables(&source, &names(&["users", "missing"])),
            names(&["users"])
        );
    }

    #[test]
    fn test_vanished_tables() {
        let known: BTreeSet<String> = names(&["orders", "legacy", "users"]).into_iter().collect();
        let source = names(&["orders", "users", "new_table"]);
        assert_eq!(vanished_tables(&known, &source), names(&["legacy"]));
        assert!(vanished_tables(&BTreeSet::new(), &source).is_empty());
    }

    #[test]
    fn test_preview_new_table() {
        let preview = TablePreview::classify(&snapshot(100), None, None);
        assert_eq!(preview.action, PlannedAction::New);
        assert_eq!(preview.source_rows, Some(100));
        assert!(preview.missing_columns.is_empty());
    }

    #[test]
    fn test_preview_behind_and_in_sync() {
        let existing = names(&["id", "total"]);
        let behind = TablePreview::classify(&snapshot(130), Some(&existing), Some(100));
        assert_eq!(behind.action, PlannedAction::Behind { missing_rows: 30 });

        let in_sync = TablePreview::classify(&snapshot(100), Some(&existing), Some(100));
        assert_eq!(in_sync.action, PlannedAction::InSync);
    }

    #[test]
    fn test_preview_reports_missing_columns() {
        let existing = names(&["id"]);
        let preview = TablePreview::classify(&snapshot(10), Some(&existing), Some(10));
        assert_eq!(preview.missing_columns, names(&["total"]));
        assert_eq!(preview.action, PlannedAction::InSync);
    }

    #[test]
    fn test_pass_report_counters() {
        let report = PassReport {
            outcomes: vec![
                TableOutcome {
                    table: "orders".to_string(),
                    result: Ok(TableAction::Replicated(UnitReport {
                        schema_change: SchemaChange::Unchanged,
                        rows_loaded: 30,
                        rows_total: 130,
                    })),
                },
                TableOutcome {
                    table: "legacy".to_string(),
                    result: Ok(TableAction::Dropped),
                },
                TableOutcome {
                    table: "users".to_string(),
                    result: Err(ReplicationError::Timeout {
                        table: "users".to_string(),
                        after: Duration::from_secs(1),
                    }),
                },
            ],
            duration_ms: 12,
        };
        assert_eq!(report.rows_loaded(), 30);
        assert_eq!(report.dropped_count(), 1);
        assert_eq!(report.failed_count(), 1);
        assert!(!report.is_success());
        assert!(report.outcome("users").unwrap().result.is_err());
        assert!(report.outcome("nope").is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_run_guarded_reports_timeout() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE orders (id BIGINT); INSERT INTO orders VALUES (1);")
            .unwrap();
        let unit = TableUnit {
            source: Arc::new(crate::source::DuckDbSource::from_connection(conn)),
            // Non-routable address: the connect attempt hangs until the budget runs out
            connector: TargetConnector::new("postgresql://u:p@10.255.255.1:5432/db", false)
                .unwrap(),
            ledger: Ledger::new("public", DEFAULT_LEDGER_TABLE).unwrap(),
            schema: "public".to_string(),
            batch_size: 10,
        };
        let result = run_guarded("orders", Duration::from_millis(50), unit.run("orders")).await;
        match result {
            Err(ReplicationError::Timeout { table, after }) => {
                assert_eq!(table, "orders");
                assert_eq!(after, Duration::from_millis(50));
            }
            other => panic!("expected a timeout for 'orders', got {:?}", other),
        }
    }

    fn table_names(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("t{:02}", i)).collect()
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_worker_count() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = run_bounded(table_names(12), 3, Duration::from_secs(5), |_table| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(TableAction::Dropped)
            }
        })
        .await;

        assert_eq!(outcomes.len(), 12);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_worker_runs_units_one_at_a_time() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = run_bounded(table_names(4), 1, Duration::from_secs(5), |_table| {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(TableAction::Dropped)
            }
        })
        .await;

        assert_eq!(outcomes.len(), 4);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pool_isolates_panicking_unit() {
        let mut outcomes = run_bounded(table_names(3), 2, Duration::from_secs(5), |table| async move {
            if table == "t01" {
                panic!("corrupt batch in {}", table);
            }
            Ok(TableAction::Dropped)
        })
        .await;
        outcomes.sort_by(|a, b| a.table.cmp(&b.table));

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].result.is_ok());
        assert!(outcomes[2].result.is_ok());
        match &outcomes[1].result {
            Err(ReplicationError::Panicked { table, message }) => {
                assert_eq!(table, "t01");
                assert_eq!(message, "corrupt batch in t01");
            }
            other => panic!("expected a panic outcome for 't01', got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unit_rejects_ledger_table_name() {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        let unit = TableUnit {
            source: Arc::new(crate::source::DuckDbSource::from_connection(conn)),
            connector: TargetConnector::new("postgresql://u:p@localhost:5432/db", false).unwrap(),
            ledger: Ledger::new("public", DEFAULT_LEDGER_TABLE).unwrap(),
            schema: "public".to_string(),
            batch_size: 10,
        };
        let err = unit.run(DEFAULT_LEDGER_TABLE).await.unwrap_err();
        assert_eq!(err.kind(), "schema-conflict");
    }
}
