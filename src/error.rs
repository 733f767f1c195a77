// ABOUTME: Error taxonomy for replication passes and per-table units
// ABOUTME: Separates pipeline-fatal failures from failures isolated to one table

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the replication pipeline.
///
/// `Config` and `Connectivity` raised before any unit starts abort the whole
/// pass. Everything raised inside a unit is caught at the unit boundary and
/// reported as that table's outcome.
#[derive(Debug, Error)]
pub enum ReplicationError {
    /// Missing or invalid connection parameters.
    #[error("configuration error: {0}")]
    Config(String),

    /// The source or target store could not be reached.
    #[error("cannot reach {store} store: {cause:#}")]
    Connectivity {
        store: &'static str,
        cause: anyhow::Error,
    },

    /// The target refused a schema change requested during reconciliation.
    #[error("schema conflict on table '{table}': {cause:#}")]
    SchemaConflict { table: String, cause: anyhow::Error },

    /// Reading rows from the source or inserting them into the target failed.
    #[error("transfer failed for table '{table}': {cause:#}")]
    Transfer { table: String, cause: anyhow::Error },

    /// Reading or writing the control ledger failed.
    #[error("ledger storage error: {cause:#}")]
    Storage { cause: anyhow::Error },

    /// A unit exceeded its time budget.
    #[error("replication of table '{table}' timed out after {after:?}")]
    Timeout { table: String, after: Duration },

    /// A unit panicked before reporting an outcome.
    #[error("replication of table '{table}' panicked: {message}")]
    Panicked { table: String, message: String },
}

impl ReplicationError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn source_unreachable(cause: impl Into<anyhow::Error>) -> Self {
        Self::Connectivity {
            store: "source",
            cause: cause.into(),
        }
    }

    pub fn target_unreachable(cause: impl Into<anyhow::Error>) -> Self {
        Self::Connectivity {
            store: "target",
            cause: cause.into(),
        }
    }

    pub fn schema_conflict(table: &str, cause: impl Into<anyhow::Error>) -> Self {
        Self::SchemaConflict {
            table: table.to_string(),
            cause: cause.into(),
        }
    }

    pub fn transfer(table: &str, cause: impl Into<anyhow::Error>) -> Self {
        Self::Transfer {
            table: table.to_string(),
            cause: cause.into(),
        }
    }

    pub fn storage(cause: impl Into<anyhow::Error>) -> Self {
        Self::Storage {
            cause: cause.into(),
        }
    }

    /// Short label used in outcome logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Connectivity { .. } => "connectivity",
            Self::SchemaConflict { .. } => "schema-conflict",
            Self::Transfer { .. } => "transfer",
            Self::Storage { .. } => "storage",
            Self::Timeout { .. } => "timeout",
            Self::Panicked { .. } => "panic",
        }
    }
}
