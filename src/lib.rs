// ABOUTME: Library root for duckdb-replicator
// ABOUTME: Exposes the source reader, target writer, ledger, reconciler and synchronizer

pub mod commands;
pub mod config;
pub mod error;
pub mod ledger;
pub mod schema;
pub mod source;
pub mod sync;
pub mod target;
pub mod transfer;
pub mod types;
pub mod utils;

pub use error::ReplicationError;
pub use source::{DuckDbSource, SourceStore};
pub use sync::{PassReport, SyncConfig, Synchronizer};
