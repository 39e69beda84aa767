//! SQLite persistence for sync: the operation log, sync metadata and the
//! record store the merge path writes through.

pub mod metadata;
pub mod model;
pub mod operation_log;
pub mod record_store;

// Re-export for convenience
pub use metadata::{resolve_device_id, SyncMetadataRepository};
pub use operation_log::{append_operation, OperationLogRepository};
pub use record_store::SqliteRecordStore;

use daybook_core::errors::Result;

/// Serializes an enum the way serde would, minus the JSON quotes, for
/// storage in a TEXT column.
pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

/// Inverse of [`enum_to_db`].
pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{value}\""))?)
}
