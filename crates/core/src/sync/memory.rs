//! In-memory doubles of the storage and transport contracts.
//!
//! Exported so the engine's own suite and downstream crates can exercise the
//! full sync protocol without SQLite or a network. `MemoryBlobStore` doubles
//! as the shared remote: point several engines at one instance and they sync
//! against each other.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{Error, Result, TransportError};
use crate::sync::merge::{decide_merge, MergeDecision, SnapshotMeta};
use crate::sync::model::{
    Operation, OperationType, RemoteBlobName, SyncStatus, SyncTable, SYNC_USER_ID,
};
use crate::sync::store::{
    OperationLogRepositoryTrait, RecordStoreTrait, SyncMetadataRepositoryTrait,
};
use crate::sync::transport::BlobTransport;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared blob store kept in a map from object key to raw bytes.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    uploads_until_failure: Mutex<Option<usize>>,
    downloads_until_failure: Mutex<Option<usize>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores raw bytes under an arbitrary key, bypassing blob naming.
    /// Lets tests plant malformed objects or foreign keys.
    pub fn put_raw(&self, key: impl Into<String>, bytes: Vec<u8>) {
        lock(&self.objects).insert(key.into(), bytes);
    }

    pub fn object_keys(&self) -> Vec<String> {
        lock(&self.objects).keys().cloned().collect()
    }

    pub fn object_count(&self) -> usize {
        lock(&self.objects).len()
    }

    pub fn clear(&self) {
        lock(&self.objects).clear();
    }

    /// After `successes` more uploads, every upload fails with a network
    /// error until reset.
    pub fn fail_uploads_after(&self, successes: usize) {
        *lock(&self.uploads_until_failure) = Some(successes);
    }

    /// After `successes` more downloads, every download fails with a
    /// network error until reset.
    pub fn fail_downloads_after(&self, successes: usize) {
        *lock(&self.downloads_until_failure) = Some(successes);
    }

    pub fn reset_failures(&self) {
        *lock(&self.uploads_until_failure) = None;
        *lock(&self.downloads_until_failure) = None;
    }

    fn spend(budget: &Mutex<Option<usize>>) -> std::result::Result<(), TransportError> {
        let mut remaining = lock(budget);
        match remaining.as_mut() {
            Some(0) => Err(TransportError::network("injected transport failure")),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl BlobTransport for MemoryBlobStore {
    async fn upload(
        &self,
        name: &RemoteBlobName,
        bytes: Vec<u8>,
    ) -> std::result::Result<(), TransportError> {
        Self::spend(&self.uploads_until_failure)?;
        lock(&self.objects).insert(name.object_key(SYNC_USER_ID), bytes);
        Ok(())
    }

    async fn list(
        &self,
        after_timestamp: Option<i64>,
        exclude_device_id: Option<&str>,
    ) -> std::result::Result<Vec<RemoteBlobName>, TransportError> {
        let objects = lock(&self.objects);
        let names = objects
            .keys()
            // Foreign or malformed keys are invisible to sync.
            .filter_map(|key| RemoteBlobName::parse(key))
            .filter(|name| match after_timestamp {
                Some(after) => name.timestamp > after,
                None => true,
            })
            .filter(|name| exclude_device_id != Some(name.device_id.as_str()))
            .collect();
        Ok(names)
    }

    async fn download(
        &self,
        name: &RemoteBlobName,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        Self::spend(&self.downloads_until_failure)?;
        let key = name.object_key(SYNC_USER_ID);
        lock(&self.objects)
            .get(&key)
            .cloned()
            .ok_or_else(|| TransportError::not_found(key))
    }
}

/// One device's local state: record tables, operation log and sync metadata
/// behind the same traits the SQLite crate implements.
#[derive(Debug, Default)]
pub struct MemorySyncStore {
    device_id: Mutex<Option<String>>,
    operations: Mutex<Vec<Operation>>,
    tables: Mutex<HashMap<SyncTable, BTreeMap<String, serde_json::Value>>>,
    last_processed_timestamp: Mutex<i64>,
    last_sync_time: Mutex<Option<String>>,
}

impl MemorySyncStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pins the device identity instead of generating one lazily.
    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        let store = Self::default();
        *lock(&store.device_id) = Some(device_id.into());
        store
    }

    /// Commits a local mutation the way the SQLite layer does: the snapshot
    /// lands in its table and the matching operation is appended to the log
    /// in the same step.
    pub fn record_local_mutation(
        &self,
        table: SyncTable,
        op_type: OperationType,
        snapshot: serde_json::Value,
    ) -> Result<Operation> {
        let record_id = snapshot
            .get("id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| Error::validation("record snapshot is missing a string 'id'"))?
            .to_string();
        let device_id = self.device_id_or_generate();

        lock(&self.tables)
            .entry(table)
            .or_default()
            .insert(record_id.clone(), snapshot.clone());

        let operation = Operation::new(device_id, table, record_id, op_type, snapshot);
        lock(&self.operations).push(operation.clone());
        Ok(operation)
    }

    /// Appends a pre-built operation without touching the record tables.
    pub fn insert_operation(&self, operation: Operation) {
        lock(&self.operations).push(operation);
    }

    pub fn record(&self, table: SyncTable, record_id: &str) -> Option<serde_json::Value> {
        lock(&self.tables).get(&table)?.get(record_id).cloned()
    }

    pub fn record_count(&self, table: SyncTable) -> usize {
        lock(&self.tables)
            .get(&table)
            .map_or(0, |records| records.len())
    }

    pub fn operations(&self) -> Vec<Operation> {
        lock(&self.operations).clone()
    }

    /// Drops all record tables, simulating local data loss while the
    /// operation log and metadata survive.
    pub fn clear_records(&self) {
        lock(&self.tables).clear();
    }

    fn device_id_or_generate(&self) -> String {
        let mut device_id = lock(&self.device_id);
        match device_id.as_ref() {
            Some(id) => id.clone(),
            None => {
                let id = Uuid::new_v4().to_string();
                *device_id = Some(id.clone());
                id
            }
        }
    }
}

#[async_trait]
impl OperationLogRepositoryTrait for MemorySyncStore {
    fn unsynced_operations(&self) -> Result<Vec<Operation>> {
        let mut pending: Vec<Operation> = lock(&self.operations)
            .iter()
            .filter(|operation| !operation.synced)
            .cloned()
            .collect();
        pending.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        Ok(pending)
    }

    async fn mark_synced(&self, operation_ids: Vec<String>) -> Result<()> {
        let ids: HashSet<String> = operation_ids.into_iter().collect();
        for operation in lock(&self.operations).iter_mut() {
            if ids.contains(&operation.id) {
                operation.synced = true;
            }
        }
        Ok(())
    }

    async fn purge_synced_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        let mut operations = lock(&self.operations);
        let before = operations.len();
        operations.retain(|operation| !(operation.synced && operation.timestamp < cutoff_ms));
        Ok(before - operations.len())
    }

    fn count_unsynced(&self) -> Result<i64> {
        let count = lock(&self.operations)
            .iter()
            .filter(|operation| !operation.synced)
            .count();
        Ok(count as i64)
    }

    fn count_synced(&self) -> Result<i64> {
        let count = lock(&self.operations)
            .iter()
            .filter(|operation| operation.synced)
            .count();
        Ok(count as i64)
    }
}

#[async_trait]
impl SyncMetadataRepositoryTrait for MemorySyncStore {
    async fn ensure_device_id(&self) -> Result<String> {
        Ok(self.device_id_or_generate())
    }

    fn last_processed_timestamp(&self) -> Result<i64> {
        Ok(*lock(&self.last_processed_timestamp))
    }

    async fn set_last_processed_timestamp(&self, timestamp: i64) -> Result<()> {
        *lock(&self.last_processed_timestamp) = timestamp;
        Ok(())
    }

    fn last_sync_time(&self) -> Result<Option<String>> {
        Ok(lock(&self.last_sync_time).clone())
    }

    async fn set_last_sync_time(&self, rfc3339: String) -> Result<()> {
        *lock(&self.last_sync_time) = Some(rfc3339);
        Ok(())
    }
}

#[async_trait]
impl RecordStoreTrait for MemorySyncStore {
    async fn apply_operation(&self, operation: &Operation) -> Result<MergeDecision> {
        let snapshot = SnapshotMeta::from_snapshot(&operation.data)?;
        let mut tables = lock(&self.tables);
        let records = tables.entry(operation.table_name).or_default();

        let local_updated_at = match records.get(&operation.record_id) {
            Some(existing) => Some(SnapshotMeta::from_snapshot(existing)?.updated_at),
            None => None,
        };

        let decision = decide_merge(local_updated_at, operation.op_type, &snapshot);
        if decision.applies() {
            let mut value = operation.data.clone();
            if let serde_json::Value::Object(fields) = &mut value {
                // Remotely-applied records never re-enter the outbox.
                fields.insert(
                    "syncStatus".to_string(),
                    serde_json::json!(SyncStatus::Synced),
                );
            }
            records.insert(operation.record_id.clone(), value);
        }
        Ok(decision)
    }

    fn live_records(&self, table: SyncTable) -> Result<Vec<serde_json::Value>> {
        let tables = lock(&self.tables);
        let Some(records) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        let mut live = Vec::new();
        for value in records.values() {
            if !SnapshotMeta::from_snapshot(value)?.deleted {
                live.push(value.clone());
            }
        }
        Ok(live)
    }

    async fn purge_soft_deleted(&self, cutoff_ms: i64) -> Result<usize> {
        let mut removed = 0;
        for records in lock(&self.tables).values_mut() {
            records.retain(|_, value| match SnapshotMeta::from_snapshot(value) {
                Ok(meta) if meta.deleted && meta.updated_at < cutoff_ms => {
                    removed += 1;
                    false
                }
                _ => true,
            });
        }
        Ok(removed)
    }
}
