// ABOUTME: Command implementations for the replicator CLI
// ABOUTME: Exports sync, status, and validate commands

pub mod status;
pub mod sync;
pub mod validate;

pub use status::status;
pub use sync::sync;
pub use validate::validate;
