//! Sync wire models: tables, operations, blob names, stats and results.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Single-tenant placeholder segment of the remote object path.
pub const SYNC_USER_ID: &str = "default";

/// Default retention window for synced operations, in days.
pub const DEFAULT_OPERATION_RETENTION_DAYS: i64 = 7;

/// Canonical list of tables that participate in device sync.
pub const SYNC_TABLES: [SyncTable; 3] = [
    SyncTable::Entries,
    SyncTable::Categories,
    SyncTable::Goals,
];

/// The fixed set of synchronized tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTable {
    Entries,
    Categories,
    Goals,
}

impl SyncTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncTable::Entries => "entries",
            SyncTable::Categories => "categories",
            SyncTable::Goals => "goals",
        }
    }
}

impl TryFrom<&str> for SyncTable {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "entries" => Ok(SyncTable::Entries),
            "categories" => Ok(SyncTable::Categories),
            "goals" => Ok(SyncTable::Goals),
            other => Err(format!("unknown sync table '{other}'")),
        }
    }
}

/// Kind of mutation an operation describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

impl TryFrom<&str> for OperationType {
    type Error = String;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        match value {
            "create" => Ok(OperationType::Create),
            "update" => Ok(OperationType::Update),
            "delete" => Ok(OperationType::Delete),
            other => Err(format!("unknown operation type '{other}'")),
        }
    }
}

/// Per-record upload state carried in every snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Pending,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Synced => "synced",
            SyncStatus::Pending => "pending",
        }
    }
}

/// One committed local mutation, the unit of transfer between devices.
///
/// Operations are append-only and never mutated after creation except for
/// flipping `synced` once an upload succeeds. `data` is always the complete
/// post-mutation snapshot of the record, never a diff — delete operations
/// carry the full soft-deleted snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    /// Creation time in unix-epoch milliseconds.
    pub timestamp: i64,
    /// Identifier of the originating device.
    pub device_id: String,
    pub table_name: SyncTable,
    pub record_id: String,
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub data: serde_json::Value,
    #[serde(default)]
    pub synced: bool,
}

impl Operation {
    /// Builds a fresh unsynced operation with a time-ordered id.
    pub fn new(
        device_id: impl Into<String>,
        table_name: SyncTable,
        record_id: impl Into<String>,
        op_type: OperationType,
        data: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            timestamp: Utc::now().timestamp_millis(),
            device_id: device_id.into(),
            table_name,
            record_id: record_id.into(),
            op_type,
            data,
            synced: false,
        }
    }
}

/// Name of one immutable remote blob: `{device_id}_{timestamp}.json` under
/// the per-user sync prefix. The embedded timestamp is the blob's logical
/// clock value used for ordering and cursor comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteBlobName {
    pub device_id: String,
    pub timestamp: i64,
}

impl RemoteBlobName {
    pub fn new(device_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
        }
    }

    /// Full object key, e.g. `sync/default/6f2c…_1756400000123.json`.
    pub fn object_key(&self, user_id: &str) -> String {
        format!(
            "sync/{}/{}_{}.json",
            user_id, self.device_id, self.timestamp
        )
    }

    /// Parses an object key or bare file name back into a blob name.
    ///
    /// Device ids contain no underscores, so the split happens on the last
    /// `_` of the final path segment. Returns `None` for foreign objects.
    pub fn parse(key: &str) -> Option<Self> {
        let file_name = key.rsplit('/').next()?;
        let stem = file_name.strip_suffix(".json")?;
        let (device_id, raw_timestamp) = stem.rsplit_once('_')?;
        if device_id.is_empty() {
            return None;
        }
        let timestamp = raw_timestamp.parse::<i64>().ok()?;
        Some(Self {
            device_id: device_id.to_string(),
            timestamp,
        })
    }
}

/// Counters and cursor state reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub pending_ops: i64,
    pub synced_ops: i64,
    pub last_sync_time: Option<String>,
    pub last_processed_timestamp: i64,
    pub device_id: String,
}

/// Outcome status of one engine entry point invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    Success,
    Error,
}

/// Structured result returned by every sync entry point. Failures are
/// reported here rather than as propagated errors so callers can decide on
/// retry without unwinding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub status: SyncRunStatus,
    pub message: String,
    pub pushed_count: Option<usize>,
    pub pulled_count: Option<usize>,
}

impl SyncReport {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: SyncRunStatus::Success,
            message: message.into(),
            pushed_count: None,
            pulled_count: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: SyncRunStatus::Error,
            message: message.into(),
            pushed_count: None,
            pulled_count: None,
        }
    }

    /// Soft result for a rejected concurrent attempt.
    pub fn busy() -> Self {
        Self::error("Sync already in progress")
    }

    pub fn with_pushed(mut self, count: usize) -> Self {
        self.pushed_count = Some(count);
        self
    }

    pub fn with_pulled(mut self, count: usize) -> Self {
        self.pulled_count = Some(count);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncRunStatus::Success
    }
}

/// Next `updated_at` value for a local mutation: wall-clock now, nudged
/// forward so the value strictly increases per device even when two
/// mutations land in the same millisecond.
pub fn next_updated_at(previous: Option<i64>) -> i64 {
    let now = Utc::now().timestamp_millis();
    match previous {
        Some(prev) => now.max(prev + 1),
        None => now,
    }
}

/// Cutoff in unix millis for a retention window of `days_ago` days.
/// Oversized windows saturate instead of wrapping.
pub fn retention_cutoff_ms(days_ago: i64) -> i64 {
    Utc::now()
        .timestamp_millis()
        .saturating_sub(days_ago.saturating_mul(86_400_000))
}
