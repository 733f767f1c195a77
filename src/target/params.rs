// ABOUTME: Typed parameter binding for warehouse inserts
// ABOUTME: Pairs each column kind with an explicit placeholder cast and a matching Rust value

use anyhow::{bail, Result};
use tokio_postgres::types::ToSql;

use crate::source::SourceValue;
use crate::types::ColumnKind;

pub type BoxedParam = Box<dyn ToSql + Sync + Send>;

/// Placeholder for parameter `n` of a column of `kind`.
///
/// The cast pins the parameter type so binding never depends on the declared
/// target type; PostgreSQL then applies its assignment cast to the column.
pub fn placeholder(kind: ColumnKind, warehouse_type: &str, n: usize) -> String {
    match kind {
        ColumnKind::Boolean => format!("${}::bool", n),
        ColumnKind::Integer => format!("${}::int8", n),
        ColumnKind::Float => format!("${}::float8", n),
        ColumnKind::Text => format!("${}::text", n),
        ColumnKind::Bytes => format!("${}::bytea", n),
        ColumnKind::Json => format!("${}::text::jsonb", n),
        ColumnKind::Cast => format!("${}::text::{}", n, warehouse_type),
    }
}

/// A NULL typed to match the placeholder of `kind`.
pub fn null_of(kind: ColumnKind) -> BoxedParam {
    match kind {
        ColumnKind::Boolean => Box::new(Option::<bool>::None),
        ColumnKind::Integer => Box::new(Option::<i64>::None),
        ColumnKind::Float => Box::new(Option::<f64>::None),
        ColumnKind::Bytes => Box::new(Option::<Vec<u8>>::None),
        ColumnKind::Text | ColumnKind::Json | ColumnKind::Cast => {
            Box::new(Option::<String>::None)
        }
    }
}

/// Convert a source cell into a parameter for a column of `kind`.
pub fn bind(value: SourceValue, kind: ColumnKind) -> Result<BoxedParam> {
    let param: BoxedParam = match (kind, value) {
        (_, SourceValue::Null) => null_of(kind),
        (ColumnKind::Boolean, SourceValue::Bool(b)) => Box::new(b),
        (ColumnKind::Integer, SourceValue::Int(i)) => Box::new(i),
        (ColumnKind::Float, SourceValue::Float(f)) => Box::new(f),
        (ColumnKind::Float, SourceValue::Int(i)) => Box::new(i as f64),
        (ColumnKind::Bytes, SourceValue::Bytes(b)) => Box::new(b),
        (ColumnKind::Text | ColumnKind::Json | ColumnKind::Cast, value) => match value {
            SourceValue::Text(s) => Box::new(s),
            SourceValue::Bool(b) => Box::new(b.to_string()),
            SourceValue::Int(i) => Box::new(i.to_string()),
            SourceValue::Float(f) => Box::new(f.to_string()),
            other => bail!("cannot render {:?} as text", other),
        },
        (kind, other) => bail!("value {:?} does not fit a {:?} column", other, kind),
    };
    Ok(param)
}
