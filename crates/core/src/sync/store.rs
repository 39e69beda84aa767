//! Storage contracts the engine orchestrates against.
//!
//! Implemented by the SQLite crate for production and by
//! [`MemorySyncStore`](crate::sync::MemorySyncStore) for tests. Reads are
//! synchronous (pool connection), writes are async (serialized through the
//! storage writer).

use async_trait::async_trait;

use crate::errors::Result;
use crate::sync::merge::MergeDecision;
use crate::sync::model::{Operation, SyncTable};

/// Append-only log of committed local mutations.
///
/// Appending happens inside the same transaction as the table write and is
/// therefore a storage-crate concern; the engine only consumes the log.
#[async_trait]
pub trait OperationLogRepositoryTrait: Send + Sync {
    /// All operations not yet uploaded, oldest first.
    fn unsynced_operations(&self) -> Result<Vec<Operation>>;

    /// Flips `synced` after a successful upload.
    async fn mark_synced(&self, operation_ids: Vec<String>) -> Result<()>;

    /// Deletes synced operations created before `cutoff_ms`. Returns the
    /// number of rows removed.
    async fn purge_synced_older_than(&self, cutoff_ms: i64) -> Result<usize>;

    fn count_unsynced(&self) -> Result<i64>;

    fn count_synced(&self) -> Result<i64>;
}

/// Small key/value store for the device identity and pull cursor.
#[async_trait]
pub trait SyncMetadataRepositoryTrait: Send + Sync {
    /// Returns the stable device identifier, generating and persisting one
    /// on first use.
    async fn ensure_device_id(&self) -> Result<String>;

    /// Highest fully-processed remote blob timestamp, 0 when never pulled.
    fn last_processed_timestamp(&self) -> Result<i64>;

    async fn set_last_processed_timestamp(&self, timestamp: i64) -> Result<()>;

    /// RFC 3339 time of the last successful sync, if any.
    fn last_sync_time(&self) -> Result<Option<String>>;

    async fn set_last_sync_time(&self, rfc3339: String) -> Result<()>;
}

/// Record-table access the merge path needs.
#[async_trait]
pub trait RecordStoreTrait: Send + Sync {
    /// Merges one incoming operation into its table under LWW rules and
    /// returns the decision that was applied. Errors mean the snapshot could
    /// not be evaluated or written; the caller decides whether that aborts
    /// anything beyond this record.
    async fn apply_operation(&self, operation: &Operation) -> Result<MergeDecision>;

    /// Full snapshots of every live (non-deleted) record in `table`.
    fn live_records(&self, table: SyncTable) -> Result<Vec<serde_json::Value>>;

    /// Physically removes soft-deleted records last touched before
    /// `cutoff_ms`. Returns the number of rows removed. Runs outside the
    /// sync protocol proper.
    async fn purge_soft_deleted(&self, cutoff_ms: i64) -> Result<usize>;
}
