// ABOUTME: Declared column type handling shared by the source reader and target writer
// ABOUTME: Fixed type-name pass-through table and per-column value binding kinds

/// How values of a column travel from DuckDB to PostgreSQL.
///
/// The kind decides both the expression used to select the column from the
/// source and the typed placeholder used to bind it on the target, so a column
/// is always read and written the same way within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Boolean,
    /// All signed integers plus unsigned types that fit in `i64`.
    Integer,
    Float,
    Text,
    Bytes,
    /// LIST / STRUCT / MAP / UNION / fixed arrays, rendered as JSON text.
    Json,
    /// Rendered as text by the source and cast to the warehouse type by the
    /// target (DECIMAL, UUID, INTERVAL, HUGEINT, dates and times, ...).
    ///
    /// Temporal types travel this way so `infinity` timestamps and `24:00:00`
    /// times reach the warehouse as both stores spell them.
    Cast,
}

impl ColumnKind {
    pub fn from_declared(declared: &str) -> Self {
        let upper = normalize(declared);
        if is_nested(&upper) {
            return ColumnKind::Json;
        }
        match upper.as_str() {
            "BOOLEAN" | "BOOL" | "LOGICAL" => ColumnKind::Boolean,
            "TINYINT" | "INT1" | "SMALLINT" | "INT2" | "SHORT" | "INTEGER" | "INT" | "INT4"
            | "SIGNED" | "BIGINT" | "INT8" | "LONG" | "UTINYINT" | "USMALLINT" | "UINTEGER" => {
                ColumnKind::Integer
            }
            "FLOAT" | "FLOAT4" | "REAL" | "DOUBLE" | "FLOAT8" => ColumnKind::Float,
            "VARCHAR" | "CHAR" | "BPCHAR" | "TEXT" | "STRING" => ColumnKind::Text,
            "BLOB" | "BYTEA" | "BINARY" | "VARBINARY" => ColumnKind::Bytes,
            other if other.starts_with("VARCHAR(") || other.starts_with("CHAR(") => {
                ColumnKind::Text
            }
            _ => ColumnKind::Cast,
        }
    }
}

/// Map a declared DuckDB type to the type name used in warehouse DDL.
///
/// Types are passed through verbatim except for the fixed aliases below,
/// which cover DuckDB names PostgreSQL does not understand.
pub fn warehouse_type(declared: &str) -> String {
    let upper = normalize(declared);
    if is_nested(&upper) {
        return "JSONB".to_string();
    }
    let alias = match upper.as_str() {
        "DOUBLE" | "FLOAT8" => "DOUBLE PRECISION",
        "FLOAT" | "FLOAT4" => "REAL",
        "TINYINT" | "INT1" | "UTINYINT" => "SMALLINT",
        "USMALLINT" => "INTEGER",
        "UINTEGER" => "BIGINT",
        "UBIGINT" | "HUGEINT" | "UHUGEINT" | "INT128" => "NUMERIC",
        "BLOB" | "BINARY" | "VARBINARY" => "BYTEA",
        "DATETIME" | "TIMESTAMP_S" | "TIMESTAMP_MS" | "TIMESTAMP_US" | "TIMESTAMP_NS" => {
            "TIMESTAMP"
        }
        "TIME WITH TIME ZONE" => "TIMETZ",
        "STRING" | "BIT" | "BITSTRING" => "TEXT",
        other if other.starts_with("ENUM(") => "TEXT",
        _ => return declared.trim().to_string(),
    };
    alias.to_string()
}

fn normalize(declared: &str) -> String {
    declared.trim().to_ascii_uppercase()
}

fn is_nested(upper: &str) -> bool {
    upper.ends_with(']')
        || upper.starts_with("STRUCT(")
        || upper.starts_with("MAP(")
        || upper.starts_with("UNION(")
        || upper == "LIST"
}
