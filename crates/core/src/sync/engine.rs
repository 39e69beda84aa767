//! Sync engine: push/pull orchestration over the shared blob store.
//!
//! One cycle pushes the unsynced tail of the operation log as a single
//! immutable blob, then pulls and merges other devices' blobs in ascending
//! timestamp order, advancing the cursor after each fully-processed blob so
//! a crash mid-pull resumes instead of restarting. Failures surface as
//! error-status reports; whatever was committed before the failure stays
//! committed.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, info, warn};

use crate::errors::{Error, Result};
use crate::sync::guard::SyncGuard;
use crate::sync::model::{
    retention_cutoff_ms, Operation, OperationType, RemoteBlobName, SyncReport, SyncStats,
    DEFAULT_OPERATION_RETENTION_DAYS, SYNC_TABLES, SYNC_USER_ID,
};
use crate::sync::store::{
    OperationLogRepositoryTrait, RecordStoreTrait, SyncMetadataRepositoryTrait,
};
use crate::sync::transport::BlobTransport;

/// How a pull selects remote blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullMode {
    /// Blobs newer than the cursor, excluding this device's own uploads.
    Incremental,
    /// Every blob ever written, own uploads included; the cursor is reset
    /// first so progress tracking starts over.
    Full,
}

/// Orchestrates the sync protocol against pluggable storage and transport.
///
/// The engine is cheap to share behind an [`Arc`]; all entry points take
/// `&self`. The transport is optional so local record keeping works before
/// a remote has ever been configured — sync entry points then fail fast
/// with a configuration error, before any I/O.
pub struct SyncEngine {
    operation_log: Arc<dyn OperationLogRepositoryTrait>,
    metadata: Arc<dyn SyncMetadataRepositoryTrait>,
    records: Arc<dyn RecordStoreTrait>,
    transport: Option<Arc<dyn BlobTransport>>,
    guard: SyncGuard,
}

impl SyncEngine {
    pub fn new(
        operation_log: Arc<dyn OperationLogRepositoryTrait>,
        metadata: Arc<dyn SyncMetadataRepositoryTrait>,
        records: Arc<dyn RecordStoreTrait>,
        transport: Option<Arc<dyn BlobTransport>>,
    ) -> Self {
        Self {
            operation_log,
            metadata,
            records,
            transport,
            guard: SyncGuard::new(),
        }
    }

    /// True while a sync, push or pull attempt holds the guard.
    pub fn is_syncing(&self) -> bool {
        self.guard.is_busy()
    }

    /// Push pending operations, pull newer remote blobs, then sweep the
    /// operation log's retention window.
    pub async fn incremental_sync(&self) -> SyncReport {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("[Sync] Rejected concurrent sync attempt");
            return SyncReport::busy();
        };
        match self.sync_cycle(PullMode::Incremental).await {
            Ok((pushed, pulled)) => {
                SyncReport::success(format!("Sync complete: pushed {pushed}, pulled {pulled}"))
                    .with_pushed(pushed)
                    .with_pulled(pulled)
            }
            Err(err) => self.report_failure("Sync", &err),
        }
    }

    /// Upload unsynced operations without pulling.
    pub async fn incremental_push(&self) -> SyncReport {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("[Sync] Rejected concurrent push attempt");
            return SyncReport::busy();
        };
        match self.push_phase(PushSource::OperationLog).await {
            Ok(pushed) => SyncReport::success(format!("Pushed {pushed} operation(s)"))
                .with_pushed(pushed),
            Err(err) => self.report_failure("Push", &err),
        }
    }

    /// Merge remote blobs newer than the cursor without pushing.
    pub async fn incremental_pull(&self) -> SyncReport {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("[Sync] Rejected concurrent pull attempt");
            return SyncReport::busy();
        };
        match self.pull_phase(PullMode::Incremental).await {
            Ok(pulled) => SyncReport::success(format!("Pulled {pulled} operation(s)"))
                .with_pulled(pulled),
            Err(err) => self.report_failure("Pull", &err),
        }
    }

    /// Disaster-recovery cycle: snapshot push followed by a full re-pull.
    pub async fn force_full_sync(&self) -> SyncReport {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("[Sync] Rejected concurrent full-sync attempt");
            return SyncReport::busy();
        };
        match self.sync_cycle(PullMode::Full).await {
            Ok((pushed, pulled)) => SyncReport::success(format!(
                "Full sync complete: pushed {pushed}, pulled {pulled}"
            ))
            .with_pushed(pushed)
            .with_pulled(pulled),
            Err(err) => self.report_failure("Full sync", &err),
        }
    }

    /// Re-seed a wiped remote: uploads a `create` snapshot of every live
    /// record as one blob, ignoring the operation log.
    pub async fn force_full_push(&self) -> SyncReport {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("[Sync] Rejected concurrent full-push attempt");
            return SyncReport::busy();
        };
        match self.push_phase(PushSource::LiveRecords).await {
            Ok(pushed) => SyncReport::success(format!("Pushed {pushed} record snapshot(s)"))
                .with_pushed(pushed),
            Err(err) => self.report_failure("Full push", &err),
        }
    }

    /// Rebuild local state after data loss: resets the cursor and re-merges
    /// every blob ever written, this device's own included.
    pub async fn force_full_pull(&self) -> SyncReport {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("[Sync] Rejected concurrent full-pull attempt");
            return SyncReport::busy();
        };
        match self.pull_phase(PullMode::Full).await {
            Ok(pulled) => SyncReport::success(format!("Pulled {pulled} operation(s)"))
                .with_pulled(pulled),
            Err(err) => self.report_failure("Full pull", &err),
        }
    }

    /// Log counters plus cursor and identity, readable without a remote.
    pub async fn get_sync_stats(&self) -> Result<SyncStats> {
        let device_id = self.metadata.ensure_device_id().await?;
        Ok(SyncStats {
            pending_ops: self.operation_log.count_unsynced()?,
            synced_ops: self.operation_log.count_synced()?,
            last_sync_time: self.metadata.last_sync_time()?,
            last_processed_timestamp: self.metadata.last_processed_timestamp()?,
            device_id,
        })
    }

    /// Clears the cursor so the next pull re-examines every remote blob.
    pub async fn reset_sync_state(&self) -> Result<()> {
        self.metadata.set_last_processed_timestamp(0).await?;
        info!("[Sync] Cursor reset; next pull re-downloads every remote blob");
        Ok(())
    }

    /// Removes synced operations older than `days_ago` days. Unsynced
    /// operations are never touched.
    pub async fn cleanup_synced_operations(&self, days_ago: i64) -> Result<usize> {
        let removed = self
            .operation_log
            .purge_synced_older_than(retention_cutoff_ms(days_ago))
            .await?;
        if removed > 0 {
            info!("[Sync] Removed {removed} synced operation(s) past retention");
        }
        Ok(removed)
    }

    /// Physically removes soft-deleted records older than `days_ago` days.
    /// Runs outside the sync protocol; the deletions have already propagated
    /// through the operation log.
    pub async fn purge_deleted_records(&self, days_ago: i64) -> Result<usize> {
        let removed = self
            .records
            .purge_soft_deleted(retention_cutoff_ms(days_ago))
            .await?;
        if removed > 0 {
            info!("[Sync] Purged {removed} soft-deleted record(s) past retention");
        }
        Ok(removed)
    }

    async fn sync_cycle(&self, mode: PullMode) -> Result<(usize, usize)> {
        let source = match mode {
            PullMode::Incremental => PushSource::OperationLog,
            PullMode::Full => PushSource::LiveRecords,
        };
        // Push fully completes, mark-as-synced included, before pull begins.
        let pushed = self.push_phase(source).await?;
        let pulled = self.pull_phase(mode).await?;

        // Retention is housekeeping; a failure here must not fail the cycle.
        let cutoff = retention_cutoff_ms(DEFAULT_OPERATION_RETENTION_DAYS);
        if let Err(err) = self.operation_log.purge_synced_older_than(cutoff).await {
            warn!("[Sync] Retention sweep failed: {err}");
        }

        self.metadata
            .set_last_sync_time(Utc::now().to_rfc3339())
            .await?;
        Ok((pushed, pulled))
    }

    async fn push_phase(&self, source: PushSource) -> Result<usize> {
        let transport = self.transport()?;
        let device_id = self.metadata.ensure_device_id().await?;

        let operations = match source {
            PushSource::OperationLog => self.operation_log.unsynced_operations()?,
            PushSource::LiveRecords => self.snapshot_operations(&device_id)?,
        };
        if operations.is_empty() {
            debug!("[Sync] Nothing to push");
            return Ok(0);
        }

        let name = RemoteBlobName::new(device_id, Utc::now().timestamp_millis());
        let bytes = serde_json::to_vec(&operations)?;
        transport.upload(&name, bytes).await?;

        // Upload-then-mark: a crash between the two re-uploads the same
        // operations next push, which merge idempotence makes harmless.
        if source == PushSource::OperationLog {
            let operation_ids = operations.iter().map(|op| op.id.clone()).collect();
            self.operation_log.mark_synced(operation_ids).await?;
        }

        info!(
            "[Sync] Pushed {} operation(s) as {}",
            operations.len(),
            name.object_key(SYNC_USER_ID)
        );
        Ok(operations.len())
    }

    /// Fresh `create` operations covering every live record in every table,
    /// carrying each record's own `updatedAt` so stale snapshots cannot
    /// clobber newer state on other devices.
    fn snapshot_operations(&self, device_id: &str) -> Result<Vec<Operation>> {
        let mut operations = Vec::new();
        for table in SYNC_TABLES {
            for snapshot in self.records.live_records(table)? {
                let record_id = snapshot
                    .get("id")
                    .and_then(|id| id.as_str())
                    .map(str::to_string)
                    .ok_or_else(|| {
                        Error::validation(format!(
                            "live record in '{}' is missing a string 'id'",
                            table.as_str()
                        ))
                    })?;
                operations.push(Operation::new(
                    device_id,
                    table,
                    record_id,
                    OperationType::Create,
                    snapshot,
                ));
            }
        }
        Ok(operations)
    }

    async fn pull_phase(&self, mode: PullMode) -> Result<usize> {
        let transport = self.transport()?;
        let device_id = self.metadata.ensure_device_id().await?;

        if mode == PullMode::Full {
            self.metadata.set_last_processed_timestamp(0).await?;
        }
        let cursor = self.metadata.last_processed_timestamp()?;
        let (after, exclude) = match mode {
            PullMode::Incremental => (Some(cursor), Some(device_id.as_str())),
            PullMode::Full => (None, None),
        };

        let mut blobs = transport.list(after, exclude).await?;
        // Deterministic replay even when two devices upload in the same
        // millisecond.
        blobs.sort_by(|a, b| (a.timestamp, &a.device_id).cmp(&(b.timestamp, &b.device_id)));
        if blobs.is_empty() {
            debug!("[Sync] No remote blobs newer than cursor {cursor}");
            return Ok(0);
        }

        let mut applied = 0usize;
        for blob in &blobs {
            applied += self.apply_blob(transport.as_ref(), blob).await?;
            // Per-blob cursor advance keeps a crash mid-pull resumable.
            self.metadata
                .set_last_processed_timestamp(blob.timestamp)
                .await?;
        }

        info!(
            "[Sync] Pulled {} blob(s), applied {applied} operation(s)",
            blobs.len()
        );
        Ok(applied)
    }

    /// Downloads and merges one blob. Returns how many operations mutated
    /// local state. An undecodable blob is an error — the cursor stays just
    /// before it; a single bad record inside a decodable blob is logged and
    /// skipped.
    async fn apply_blob(&self, transport: &dyn BlobTransport, blob: &RemoteBlobName) -> Result<usize> {
        let key = blob.object_key(SYNC_USER_ID);
        let bytes = transport.download(blob).await?;
        let operations: Vec<Operation> = serde_json::from_slice(&bytes)
            .map_err(|err| Error::malformed_blob(key.clone(), err.to_string()))?;

        let mut applied = 0usize;
        for operation in &operations {
            match self.records.apply_operation(operation).await {
                Ok(decision) if decision.applies() => applied += 1,
                Ok(_) => {}
                Err(err) => {
                    warn!(
                        "[Sync] Skipping operation {} for {}/{}: {err}",
                        operation.id,
                        operation.table_name.as_str(),
                        operation.record_id
                    );
                }
            }
        }
        debug!(
            "[Sync] Applied {applied}/{} operation(s) from {key}",
            operations.len()
        );
        Ok(applied)
    }

    fn report_failure(&self, phase: &str, err: &Error) -> SyncReport {
        warn!("[Sync] {phase} failed: {err}");
        SyncReport::error(format!("{phase} failed: {err}"))
    }

    fn transport(&self) -> Result<&Arc<dyn BlobTransport>> {
        self.transport
            .as_ref()
            .ok_or_else(|| Error::configuration("no remote blob store configured"))
    }
}

/// Where a push phase sources its operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PushSource {
    /// The unsynced tail of the operation log, marked synced after upload.
    OperationLog,
    /// Synthesized snapshots of live records; the log is left untouched.
    LiveRecords,
}
