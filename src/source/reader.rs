// ABOUTME: DuckDB source store - introspection and ranged reads of user tables
// ABOUTME: Opens the database file once read-only and clones connections per call

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Context, Result};
use duckdb::types::Value;
use duckdb::{AccessMode, Config, Connection};

use super::{ColumnDescriptor, ScanBatch, ScanStart, SourceStore, SourceValue};
use crate::types::ColumnKind;
use crate::utils::{quote_ident, validate_identifier};

/// A DuckDB database used as the replication source.
///
/// The database is opened once. Every call clones a fresh connection to the
/// same database instance, so concurrent workers read in parallel without
/// sharing a connection.
pub struct DuckDbSource {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl DuckDbSource {
    /// Open a DuckDB database file in read-only mode.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use duckdb_replicator::source::{DuckDbSource, SourceStore};
    /// # fn example() -> anyhow::Result<()> {
    /// let source = DuckDbSource::open("lake.duckdb".as_ref())?;
    /// for table in source.list_tables()? {
    ///     println!("Table: {}", table);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        if !path.is_file() {
            bail!("DuckDB file not found: {}", path.display());
        }

        let config = Config::default()
            .access_mode(AccessMode::ReadOnly)
            .context("Failed to configure read-only DuckDB access")?;
        let conn = Connection::open_with_flags(path, config)
            .with_context(|| format!("Failed to open DuckDB database {}", path.display()))?;

        tracing::info!("Opened DuckDB source {} (read-only)", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an already open connection (in-memory databases, tests).
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            path: None,
        }
    }

    fn connection(&self) -> Result<Connection> {
        let root = self
            .conn
            .lock()
            .map_err(|_| anyhow!("DuckDB source connection lock poisoned"))?;
        root.try_clone()
            .context("Failed to clone DuckDB source connection")
    }
}

impl fmt::Debug for DuckDbSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuckDbSource")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SourceStore for DuckDbSource {
    /// List user tables of the `main` schema, sorted by name.
    fn list_tables(&self) -> Result<Vec<String>> {
        tracing::debug!("Listing tables from DuckDB source");

        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_catalog = current_database() \
                 AND table_schema = 'main' \
                 AND table_type = 'BASE TABLE' \
                 ORDER BY table_name",
            )
            .context("Failed to prepare statement to list tables")?;

        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("Failed to query table list")?
            .collect::<Result<Vec<String>, _>>()
            .context("Failed to collect table names")?;

        tracing::info!("Found {} tables in DuckDB source", tables.len());

        Ok(tables)
    }

    fn describe(&self, table: &str) -> Result<Vec<ColumnDescriptor>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(
                "SELECT column_name, data_type FROM information_schema.columns \
                 WHERE table_catalog = current_database() \
                 AND table_schema = 'main' \
                 AND table_name = ? \
                 ORDER BY ordinal_position",
            )
            .context("Failed to prepare statement to describe table")?;

        let columns = stmt
            .query_map(duckdb::params![table], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .with_context(|| format!("Failed to describe table '{}'", table))?
            .collect::<Result<Vec<(String, String)>, _>>()
            .with_context(|| format!("Failed to collect columns of table '{}'", table))?;

        if columns.is_empty() {
            bail!("Table '{}' does not exist in the DuckDB source", table);
        }

        Ok(columns
            .into_iter()
            .enumerate()
            .map(|(idx, (name, declared))| ColumnDescriptor::new(name, declared, idx + 1))
            .collect())
    }

    fn row_count(&self, table: &str) -> Result<u64> {
        validate_identifier(table).context("Invalid table name for row count query")?;

        let conn = self.connection()?;
        let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: i64 = conn
            .query_row(&query, [], |row| row.get(0))
            .with_context(|| format!("Failed to count rows in table '{}'", table))?;

        Ok(count.max(0) as u64)
    }

    /// Read a window of rows ordered by DuckDB's `rowid`.
    ///
    /// `rowid` grows with insertion order, so for append-only tables a given
    /// offset always addresses the same row across passes. The row key handed
    /// back is the `rowid` itself: only the first batch of a transfer pays for
    /// skipping rows, later batches seek past the previous key.
    fn scan_range(
        &self,
        table: &str,
        columns: &[ColumnDescriptor],
        start: ScanStart,
        limit: u64,
    ) -> Result<ScanBatch> {
        validate_identifier(table).context("Invalid table name for ranged read")?;
        if columns.is_empty() {
            bail!("Table '{}' has no columns to read", table);
        }

        let conn = self.connection()?;
        let query = build_scan_query(table, columns, start);
        let mut stmt = conn
            .prepare(&query)
            .with_context(|| format!("Failed to prepare ranged read for table '{}'", table))?;

        let width = columns.len();
        let raw_rows = match start {
            ScanStart::Offset(offset) => stmt
                .query_map(duckdb::params![limit as i64, offset as i64], |row| {
                    read_keyed_row(row, width)
                })
                .with_context(|| format!("Failed to query rows from table '{}'", table))?
                .collect::<Result<Vec<_>, _>>(),
            ScanStart::After(key) => stmt
                .query_map(duckdb::params![key, limit as i64], |row| {
                    read_keyed_row(row, width)
                })
                .with_context(|| format!("Failed to query rows from table '{}'", table))?
                .collect::<Result<Vec<_>, _>>(),
        }
        .with_context(|| format!("Failed to collect rows from table '{}'", table))?;

        let mut batch = ScanBatch::default();
        for (key, raw) in raw_rows {
            let row = raw
                .into_iter()
                .zip(columns)
                .map(|(value, column)| {
                    to_source_value(value).with_context(|| {
                        format!(
                            "Failed to decode column '{}' of rowid {} in table '{}'",
                            column.name, key, table
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            batch.rows.push(row);
            batch.last_key = Some(key);
        }

        tracing::debug!(
            "Read {} rows from '{}' (start={:?}, limit={})",
            batch.len(),
            table,
            start,
            limit
        );

        Ok(batch)
    }
}

/// Build the ranged read for `columns`, rendering text-carried kinds in SQL.
///
/// The first selected value is always the `rowid` key.
fn build_scan_query(table: &str, columns: &[ColumnDescriptor], start: ScanStart) -> String {
    let mut select_list = vec!["rowid".to_string()];
    select_list.extend(columns.iter().map(|column| {
        let ident = quote_ident(&column.name);
        match column.kind() {
            ColumnKind::Json => format!("CAST(to_json({}) AS VARCHAR)", ident),
            ColumnKind::Cast | ColumnKind::Text => format!("CAST({} AS VARCHAR)", ident),
            _ => ident,
        }
    }));

    let window = match start {
        ScanStart::Offset(_) => "ORDER BY rowid LIMIT ? OFFSET ?",
        ScanStart::After(_) => "WHERE rowid > ? ORDER BY rowid LIMIT ?",
    };

    format!(
        "SELECT {} FROM {} {}",
        select_list.join(", "),
        quote_ident(table),
        window
    )
}

/// Split a scanned row into its `rowid` key and the `width` column values.
fn read_keyed_row(row: &duckdb::Row<'_>, width: usize) -> duckdb::Result<(i64, Vec<Value>)> {
    let key = row.get::<_, i64>(0)?;
    let values = (1..=width)
        .map(|idx| row.get::<_, Value>(idx))
        .collect::<duckdb::Result<Vec<Value>>>()?;
    Ok((key, values))
}

/// Convert a DuckDB value into a driver-independent [`SourceValue`].
fn to_source_value(value: Value) -> Result<SourceValue> {
    Ok(match value {
        Value::Null => SourceValue::Null,
        Value::Boolean(b) => SourceValue::Bool(b),
        Value::TinyInt(i) => SourceValue::Int(i.into()),
        Value::SmallInt(i) => SourceValue::Int(i.into()),
        Value::Int(i) => SourceValue::Int(i.into()),
        Value::BigInt(i) => SourceValue::Int(i),
        Value::UTinyInt(u) => SourceValue::Int(u.into()),
        Value::USmallInt(u) => SourceValue::Int(u.into()),
        Value::UInt(u) => SourceValue::Int(u.into()),
        Value::UBigInt(u) => match i64::try_from(u) {
            Ok(i) => SourceValue::Int(i),
            Err(_) => SourceValue::Text(u.to_string()),
        },
        Value::Float(f) => SourceValue::Float(f.into()),
        Value::Double(f) => SourceValue::Float(f),
        Value::Text(s) => SourceValue::Text(s),
        Value::Enum(s) => SourceValue::Text(s),
        Value::Blob(b) => SourceValue::Bytes(b),
        other => bail!("unsupported DuckDB value {:?}", other),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_source() -> (Connection, DuckDbSource) {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (
                id INTEGER,
                name VARCHAR,
                email VARCHAR,
                age INTEGER
            );
            CREATE TABLE orders (
                id BIGINT,
                user_id INTEGER,
                total DECIMAL(10,2),
                placed_at TIMESTAMP,
                tags VARCHAR[]
            );
            INSERT INTO users VALUES
                (1, 'Alice', 'alice@example.com', 30),
                (2, 'Bob', 'bob@example.com', 25),
                (3, 'Charlie', 'charlie@example.com', NULL);
            INSERT INTO orders VALUES
                (10, 1, 19.99, TIMESTAMP '2024-03-01 12:30:00', ['a', 'b']);",
        )
        .unwrap();

        let source = DuckDbSource::from_connection(conn.try_clone().unwrap());
        (conn, source)
    }

    #[test]
    fn test_list_tables_sorted() {
        let (_conn, source) = create_test_source();
        let tables = source.list_tables().unwrap();
        assert_eq!(tables, vec!["orders", "users"]);
    }

    #[test]
    fn test_list_tables_excludes_views() {
        let (conn, source) = create_test_source();
        conn.execute_batch("CREATE VIEW adults AS SELECT * FROM users WHERE age >= 18")
            .unwrap();
        let tables = source.list_tables().unwrap();
        assert!(!tables.contains(&"adults".to_string()));
    }

    #[test]
    fn test_describe_in_declaration_order() {
        let (_conn, source) = create_test_source();
        let columns = source.describe("orders").unwrap();

        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "user_id", "total", "placed_at", "tags"]);
        assert_eq!(columns[0].declared_type, "BIGINT");
        assert_eq!(columns[2].declared_type, "DECIMAL(10,2)");
        assert_eq!(columns[4].declared_type, "VARCHAR[]");
        assert_eq!(columns[0].position, 1);
        assert_eq!(columns[4].position, 5);
    }

    #[test]
    fn test_describe_missing_table() {
        let (_conn, source) = create_test_source();
        let result = source.describe("nope");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
    }

    #[test]
    fn test_row_count() {
        let (_conn, source) = create_test_source();
        assert_eq!(source.row_count("users").unwrap(), 3);
        assert_eq!(source.row_count("orders").unwrap(), 1);
    }

    #[test]
    fn test_row_count_sees_appends_through_shared_database() {
        let (conn, source) = create_test_source();
        conn.execute_batch("INSERT INTO users VALUES (4, 'Dana', NULL, 41)")
            .unwrap();
        assert_eq!(source.row_count("users").unwrap(), 4);
    }

    #[test]
    fn test_row_count_invalid_table() {
        let (_conn, source) = create_test_source();
        let result = source.row_count("bad\nname");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid table name"));
    }

    #[test]
    fn test_snapshot() {
        let (_conn, source) = create_test_source();
        let snapshot = source.snapshot("users").unwrap();
        assert_eq!(snapshot.table, "users");
        assert_eq!(snapshot.row_count, 3);
        let names: Vec<&str> = snapshot.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["id", "name", "email", "age"]);
    }

    #[test]
    fn test_scan_range_windows() {
        let (_conn, source) = create_test_source();
        let columns = source.describe("users").unwrap();

        let first = source
            .scan_range("users", &columns, ScanStart::Offset(0), 2)
            .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.rows[0][0], SourceValue::Int(1));
        assert_eq!(first.rows[1][1], SourceValue::Text("Bob".to_string()));
        assert_eq!(first.last_key, Some(1));

        let rest = source
            .scan_range("users", &columns, ScanStart::Offset(2), 10)
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest.rows[0][0], SourceValue::Int(3));
        assert_eq!(rest.rows[0][3], SourceValue::Null);

        let past_end = source
            .scan_range("users", &columns, ScanStart::Offset(3), 10)
            .unwrap();
        assert!(past_end.is_empty());
        assert_eq!(past_end.last_key, None);
    }

    #[test]
    fn test_scan_range_resumes_after_key() {
        let (_conn, source) = create_test_source();
        let columns = source.describe("users").unwrap();

        let first = source
            .scan_range("users", &columns, ScanStart::Offset(0), 1)
            .unwrap();
        let key = first.last_key.unwrap();

        let second = source
            .scan_range("users", &columns, ScanStart::After(key), 1)
            .unwrap();
        assert_eq!(second.rows, vec![vec![
            SourceValue::Int(2),
            SourceValue::Text("Bob".to_string()),
            SourceValue::Text("bob@example.com".to_string()),
            SourceValue::Int(25),
        ]]);

        let third = source
            .scan_range("users", &columns, ScanStart::After(second.last_key.unwrap()), 10)
            .unwrap();
        assert_eq!(third.len(), 1);
        assert_eq!(third.rows[0][1], SourceValue::Text("Charlie".to_string()));

        let done = source
            .scan_range("users", &columns, ScanStart::After(third.last_key.unwrap()), 10)
            .unwrap();
        assert!(done.is_empty());
    }

    #[test]
    fn test_keyed_pages_match_offset_pages() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE events AS SELECT range AS id, 'e' || range AS label FROM range(2500)",
        )
        .unwrap();
        let source = DuckDbSource::from_connection(conn);
        let columns = source.describe("events").unwrap();

        let mut ids = Vec::new();
        let mut start = ScanStart::Offset(700);
        loop {
            let batch = source.scan_range("events", &columns, start, 300).unwrap();
            let Some(key) = batch.last_key else { break };
            for row in batch.rows {
                match row[0] {
                    SourceValue::Int(id) => ids.push(id),
                    ref other => panic!("id should be an integer, got {:?}", other),
                }
            }
            start = ScanStart::After(key);
        }

        assert_eq!(ids, (700..2500).collect::<Vec<i64>>());
    }

    #[test]
    fn test_scan_range_follows_insertion_order() {
        let (conn, source) = create_test_source();
        conn.execute_batch("INSERT INTO users VALUES (0, 'Zed', NULL, 50)")
            .unwrap();
        let columns = source.describe("users").unwrap();

        let appended = source
            .scan_range("users", &columns, ScanStart::Offset(3), 10)
            .unwrap();
        assert_eq!(appended.len(), 1);
        assert_eq!(appended.rows[0][1], SourceValue::Text("Zed".to_string()));
    }

    #[test]
    fn test_scan_range_renders_text_carried_kinds() {
        let (_conn, source) = create_test_source();
        let columns = source.describe("orders").unwrap();
        let batch = source
            .scan_range("orders", &columns, ScanStart::Offset(0), 10)
            .unwrap();

        let row = &batch.rows[0];
        assert_eq!(row[0], SourceValue::Int(10));
        assert_eq!(row[2], SourceValue::Text("19.99".to_string()));
        assert_eq!(row[3], SourceValue::Text("2024-03-01 12:30:00".to_string()));
        match &row[4] {
            SourceValue::Text(json) => {
                let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
                assert_eq!(parsed, serde_json::json!(["a", "b"]));
            }
            other => panic!("tags should be rendered as JSON text, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_range_renders_nested_types_as_json() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE nested (
                attrs STRUCT(a INTEGER, b VARCHAR),
                counts MAP(VARCHAR, INTEGER)
            );
            INSERT INTO nested VALUES ({'a': 1, 'b': 'x'}, MAP {'k': 2});",
        )
        .unwrap();
        let source = DuckDbSource::from_connection(conn);
        let columns = source.describe("nested").unwrap();
        let batch = source
            .scan_range("nested", &columns, ScanStart::Offset(0), 10)
            .unwrap();

        let parsed: Vec<serde_json::Value> = batch.rows[0]
            .iter()
            .map(|value| match value {
                SourceValue::Text(json) => serde_json::from_str(json).unwrap(),
                other => panic!("nested value should be JSON text, got {:?}", other),
            })
            .collect();
        assert_eq!(parsed[0], serde_json::json!({"a": 1, "b": "x"}));
        assert_eq!(parsed[1], serde_json::json!({"k": 2}));
    }

    #[test]
    fn test_scan_range_keeps_temporal_edge_values() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE readings (ts TIMESTAMP, tm TIME, day DATE);
            INSERT INTO readings VALUES
                ('infinity'::TIMESTAMP, TIME '24:00:00', 'infinity'::DATE),
                ('-infinity'::TIMESTAMP, TIME '00:00:00', DATE '2024-02-29');",
        )
        .unwrap();
        let source = DuckDbSource::from_connection(conn);
        let columns = source.describe("readings").unwrap();
        let batch = source
            .scan_range("readings", &columns, ScanStart::Offset(0), 10)
            .unwrap();

        let text = |s: &str| SourceValue::Text(s.to_string());
        assert_eq!(
            batch.rows,
            vec![
                vec![text("infinity"), text("24:00:00"), text("infinity")],
                vec![text("-infinity"), text("00:00:00"), text("2024-02-29")],
            ]
        );
    }

    #[test]
    fn test_open_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = DuckDbSource::open(&temp_dir.path().join("missing.duckdb"));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_open_file_read_only() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("lake.duckdb");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch("CREATE TABLE events (id INTEGER); INSERT INTO events VALUES (1), (2);")
                .unwrap();
        }

        let source = DuckDbSource::open(&db_path).unwrap();
        assert!(format!("{:?}", source).contains("lake.duckdb"));
        assert_eq!(source.list_tables().unwrap(), vec!["events"]);
        assert_eq!(source.row_count("events").unwrap(), 2);

        let conn = source.connection().unwrap();
        assert!(conn.execute_batch("INSERT INTO events VALUES (3)").is_err());
    }

    #[test]
    fn test_build_scan_query() {
        let columns = vec![
            ColumnDescriptor::new("id", "INTEGER", 1),
            ColumnDescriptor::new("price", "DECIMAL(8,2)", 2),
            ColumnDescriptor::new("attrs", "STRUCT(a INTEGER)", 3),
        ];
        assert_eq!(
            build_scan_query("items", &columns, ScanStart::Offset(0)),
            "SELECT rowid, \"id\", CAST(\"price\" AS VARCHAR), CAST(to_json(\"attrs\") AS VARCHAR) \
             FROM \"items\" ORDER BY rowid LIMIT ? OFFSET ?"
        );
        assert_eq!(
            build_scan_query("items", &columns[..1], ScanStart::After(41)),
            "SELECT rowid, \"id\" FROM \"items\" WHERE rowid > ? ORDER BY rowid LIMIT ?"
        );
    }

    #[test]
    fn test_to_source_value_scalars() {
        assert_eq!(
            to_source_value(Value::UBigInt(u64::MAX)).unwrap(),
            SourceValue::Text(u64::MAX.to_string())
        );
        assert_eq!(to_source_value(Value::UInt(7)).unwrap(), SourceValue::Int(7));
        assert_eq!(
            to_source_value(Value::Float(1.5)).unwrap(),
            SourceValue::Float(1.5)
        );
        assert!(to_source_value(Value::Date32(1)).is_err());
    }
}
