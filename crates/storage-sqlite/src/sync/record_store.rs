//! Applies remote operations to the record tables.
//!
//! Each operation runs in its own writer transaction, so one bad record in
//! a batch never takes its neighbours down with it. Merged snapshots are
//! stored as already synced so they do not re-enter the operation log.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;

use daybook_core::errors::Result;
use daybook_core::records::{Category, Entry, Goal};
use daybook_core::sync::{
    decide_merge, MergeDecision, Operation, RecordStoreTrait, SnapshotMeta, SyncStatus, SyncTable,
};

use crate::categories::CategoryDB;
use crate::db::{get_connection, WriteHandle};
use crate::entries::EntryDB;
use crate::errors::StorageError;
use crate::goals::GoalDB;
use crate::schema::{categories, entries, goals};

pub struct SqliteRecordStore {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SqliteRecordStore {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

fn apply_entry(
    conn: &mut SqliteConnection,
    operation: &Operation,
    meta: &SnapshotMeta,
) -> Result<MergeDecision> {
    let local_updated_at = entries::table
        .find(&operation.record_id)
        .select(entries::updated_at)
        .first::<i64>(conn)
        .optional()
        .map_err(StorageError::from)?;
    let decision = decide_merge(local_updated_at, operation.op_type, meta);
    if decision.applies() {
        let mut incoming: Entry = serde_json::from_value(operation.data.clone())?;
        incoming.sync_status = SyncStatus::Synced;
        let row = EntryDB::from(incoming);
        diesel::insert_into(entries::table)
            .values(&row)
            .on_conflict(entries::id)
            .do_update()
            .set(&row)
            .execute(conn)
            .map_err(StorageError::from)?;
    }
    Ok(decision)
}

fn apply_category(
    conn: &mut SqliteConnection,
    operation: &Operation,
    meta: &SnapshotMeta,
) -> Result<MergeDecision> {
    let local_updated_at = categories::table
        .find(&operation.record_id)
        .select(categories::updated_at)
        .first::<i64>(conn)
        .optional()
        .map_err(StorageError::from)?;
    let decision = decide_merge(local_updated_at, operation.op_type, meta);
    if decision.applies() {
        let mut incoming: Category = serde_json::from_value(operation.data.clone())?;
        incoming.sync_status = SyncStatus::Synced;
        let row = CategoryDB::from(incoming);
        diesel::insert_into(categories::table)
            .values(&row)
            .on_conflict(categories::id)
            .do_update()
            .set(&row)
            .execute(conn)
            .map_err(StorageError::from)?;
    }
    Ok(decision)
}

fn apply_goal(
    conn: &mut SqliteConnection,
    operation: &Operation,
    meta: &SnapshotMeta,
) -> Result<MergeDecision> {
    let local_updated_at = goals::table
        .find(&operation.record_id)
        .select(goals::updated_at)
        .first::<i64>(conn)
        .optional()
        .map_err(StorageError::from)?;
    let decision = decide_merge(local_updated_at, operation.op_type, meta);
    if decision.applies() {
        let mut incoming: Goal = serde_json::from_value(operation.data.clone())?;
        incoming.sync_status = SyncStatus::Synced;
        let row = GoalDB::from(incoming);
        diesel::insert_into(goals::table)
            .values(&row)
            .on_conflict(goals::id)
            .do_update()
            .set(&row)
            .execute(conn)
            .map_err(StorageError::from)?;
    }
    Ok(decision)
}

#[async_trait]
impl RecordStoreTrait for SqliteRecordStore {
    async fn apply_operation(&self, operation: &Operation) -> Result<MergeDecision> {
        let operation = operation.clone();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<MergeDecision> {
                let meta = SnapshotMeta::from_snapshot(&operation.data)?;
                match operation.table_name {
                    SyncTable::Entries => apply_entry(conn, &operation, &meta),
                    SyncTable::Categories => apply_category(conn, &operation, &meta),
                    SyncTable::Goals => apply_goal(conn, &operation, &meta),
                }
            })
            .await
    }

    fn live_records(&self, table: SyncTable) -> Result<Vec<serde_json::Value>> {
        let mut conn = get_connection(&self.pool)?;
        match table {
            SyncTable::Entries => {
                let rows = entries::table
                    .filter(entries::deleted.eq(0))
                    .load::<EntryDB>(&mut conn)
                    .map_err(StorageError::from)?;
                rows.into_iter()
                    .map(|row| -> Result<serde_json::Value> {
                        Ok(serde_json::to_value(Entry::try_from(row)?)?)
                    })
                    .collect()
            }
            SyncTable::Categories => {
                let rows = categories::table
                    .filter(categories::deleted.eq(0))
                    .load::<CategoryDB>(&mut conn)
                    .map_err(StorageError::from)?;
                rows.into_iter()
                    .map(|row| -> Result<serde_json::Value> {
                        Ok(serde_json::to_value(Category::try_from(row)?)?)
                    })
                    .collect()
            }
            SyncTable::Goals => {
                let rows = goals::table
                    .filter(goals::deleted.eq(0))
                    .load::<GoalDB>(&mut conn)
                    .map_err(StorageError::from)?;
                rows.into_iter()
                    .map(|row| -> Result<serde_json::Value> {
                        Ok(serde_json::to_value(Goal::try_from(row)?)?)
                    })
                    .collect()
            }
        }
    }

    async fn purge_soft_deleted(&self, cutoff_ms: i64) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let mut removed = diesel::delete(
                    entries::table
                        .filter(entries::deleted.eq(1))
                        .filter(entries::updated_at.lt(cutoff_ms)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                removed += diesel::delete(
                    categories::table
                        .filter(categories::deleted.eq(1))
                        .filter(categories::updated_at.lt(cutoff_ms)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                removed += diesel::delete(
                    goals::table
                        .filter(goals::deleted.eq(1))
                        .filter(goals::updated_at.lt(cutoff_ms)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(removed)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, init, run_migrations, spawn_writer};
    use crate::entries::EntryRepository;
    use daybook_core::records::{EntryRepositoryTrait, NewEntry};
    use daybook_core::sync::OperationType;
    use serde_json::json;
    use tempfile::tempdir;

    fn setup_db() -> (
        Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        WriteHandle,
    ) {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db path");
        run_migrations(&db_path).expect("run migrations");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        (pool, writer)
    }

    fn entry_snapshot(id: &str, title: &str, updated_at: i64, deleted: bool) -> serde_json::Value {
        json!({
            "id": id,
            "categoryId": null,
            "title": title,
            "body": "from another device",
            "entryDate": "2026-08-01",
            "version": 1,
            "deviceId": "peer-device",
            "syncStatus": "pending",
            "deleted": deleted,
            "createdAt": 900,
            "updatedAt": updated_at,
        })
    }

    fn remote_op(
        id: &str,
        op_type: OperationType,
        title: &str,
        updated_at: i64,
        deleted: bool,
    ) -> Operation {
        Operation::new(
            "peer-device".to_string(),
            SyncTable::Entries,
            id.to_string(),
            op_type,
            entry_snapshot(id, title, updated_at, deleted),
        )
    }

    #[tokio::test]
    async fn an_unknown_record_is_inserted_as_synced() {
        let (pool, writer) = setup_db();
        let store = SqliteRecordStore::new(pool.clone(), writer.clone());
        let entries_repo = EntryRepository::new(pool, writer);

        let decision = store
            .apply_operation(&remote_op("r1", OperationType::Create, "hello", 1_000, false))
            .await
            .expect("apply");

        assert_eq!(decision, MergeDecision::Insert);
        let merged = entries_repo.get_entry("r1").expect("get").expect("present");
        assert_eq!(merged.title, "hello");
        assert_eq!(merged.sync_status, SyncStatus::Synced);
        assert_eq!(merged.device_id, "peer-device");
    }

    #[tokio::test]
    async fn a_stale_snapshot_loses_to_the_local_row() {
        let (pool, writer) = setup_db();
        let store = SqliteRecordStore::new(pool.clone(), writer.clone());
        let entries_repo = EntryRepository::new(pool, writer);

        let local = entries_repo
            .insert_new_entry(NewEntry {
                category_id: None,
                title: "local truth".to_string(),
                body: String::new(),
                entry_date: "2026-08-01".to_string(),
            })
            .await
            .expect("insert");

        // Stale timestamps lose; remote wall clocks are far behind here.
        let decision = store
            .apply_operation(&remote_op(
                &local.id,
                OperationType::Update,
                "stale",
                1,
                false,
            ))
            .await
            .expect("apply");

        assert_eq!(decision, MergeDecision::KeepLocal);
        let kept = entries_repo
            .get_entry(&local.id)
            .expect("get")
            .expect("present");
        assert_eq!(kept.title, "local truth");
        assert_eq!(kept.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn a_newer_snapshot_overwrites_the_whole_row() {
        let (pool, writer) = setup_db();
        let store = SqliteRecordStore::new(pool.clone(), writer.clone());
        let entries_repo = EntryRepository::new(pool, writer);

        let local = entries_repo
            .insert_new_entry(NewEntry {
                category_id: None,
                title: "old".to_string(),
                body: String::new(),
                entry_date: "2026-08-01".to_string(),
            })
            .await
            .expect("insert");

        let decision = store
            .apply_operation(&remote_op(
                &local.id,
                OperationType::Update,
                "newer",
                local.updated_at + 10_000,
                false,
            ))
            .await
            .expect("apply");

        assert_eq!(decision, MergeDecision::Overwrite);
        let merged = entries_repo
            .get_entry(&local.id)
            .expect("get")
            .expect("present");
        assert_eq!(merged.title, "newer");
        assert_eq!(merged.body, "from another device");
        assert_eq!(merged.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn a_tombstone_for_an_unknown_record_leaves_no_row() {
        let (pool, writer) = setup_db();
        let store = SqliteRecordStore::new(pool.clone(), writer.clone());
        let entries_repo = EntryRepository::new(pool, writer);

        let decision = store
            .apply_operation(&remote_op(
                "ghost",
                OperationType::Delete,
                "gone",
                5_000,
                true,
            ))
            .await
            .expect("apply");

        assert_eq!(decision, MergeDecision::DropTombstone);
        assert!(entries_repo.get_entry("ghost").expect("get").is_none());
    }

    #[tokio::test]
    async fn a_newer_tombstone_soft_deletes_the_local_row() {
        let (pool, writer) = setup_db();
        let store = SqliteRecordStore::new(pool.clone(), writer.clone());
        let entries_repo = EntryRepository::new(pool, writer);

        let local = entries_repo
            .insert_new_entry(NewEntry {
                category_id: None,
                title: "doomed".to_string(),
                body: String::new(),
                entry_date: "2026-08-01".to_string(),
            })
            .await
            .expect("insert");

        let decision = store
            .apply_operation(&remote_op(
                &local.id,
                OperationType::Delete,
                "doomed",
                local.updated_at + 1,
                true,
            ))
            .await
            .expect("apply");

        assert_eq!(decision, MergeDecision::Overwrite);
        assert!(entries_repo.list_entries().expect("list").is_empty());
        let tombstone = entries_repo
            .get_entry(&local.id)
            .expect("get")
            .expect("row kept");
        assert!(tombstone.deleted);
    }

    #[tokio::test]
    async fn a_snapshot_missing_its_timestamp_is_rejected() {
        let (pool, writer) = setup_db();
        let store = SqliteRecordStore::new(pool, writer);

        let operation = Operation::new(
            "peer-device".to_string(),
            SyncTable::Entries,
            "r1".to_string(),
            OperationType::Create,
            json!({"id": "r1", "title": "no timestamp"}),
        );

        assert!(store.apply_operation(&operation).await.is_err());
    }

    #[tokio::test]
    async fn live_records_serialize_to_wire_snapshots() {
        let (pool, writer) = setup_db();
        let store = SqliteRecordStore::new(pool.clone(), writer.clone());
        let entries_repo = EntryRepository::new(pool, writer);

        let kept = entries_repo
            .insert_new_entry(NewEntry {
                category_id: None,
                title: "kept".to_string(),
                body: String::new(),
                entry_date: "2026-08-03".to_string(),
            })
            .await
            .expect("insert");
        let doomed = entries_repo
            .insert_new_entry(NewEntry {
                category_id: None,
                title: "doomed".to_string(),
                body: String::new(),
                entry_date: "2026-08-04".to_string(),
            })
            .await
            .expect("insert");
        entries_repo.delete_entry(doomed.id).await.expect("delete");

        let live = store.live_records(SyncTable::Entries).expect("live");
        assert_eq!(live.len(), 1);
        assert_eq!(live[0]["id"], kept.id.as_str());
        assert_eq!(live[0]["entryDate"], "2026-08-03");
        assert_eq!(live[0]["updatedAt"], kept.updated_at);
        assert!(store
            .live_records(SyncTable::Categories)
            .expect("live")
            .is_empty());
    }

    #[tokio::test]
    async fn purge_drops_old_tombstones_and_keeps_live_rows() {
        let (pool, writer) = setup_db();
        let store = SqliteRecordStore::new(pool.clone(), writer.clone());
        let entries_repo = EntryRepository::new(pool, writer);

        store
            .apply_operation(&remote_op("old-live", OperationType::Create, "y", 1_000, false))
            .await
            .expect("apply");

        // Live rows are never purged, no matter how old.
        let removed = store.purge_soft_deleted(2_000).await.expect("purge");
        assert_eq!(removed, 0);
        store
            .apply_operation(&remote_op(
                "old-live",
                OperationType::Delete,
                "y",
                1_500,
                true,
            ))
            .await
            .expect("apply");
        let removed = store.purge_soft_deleted(2_000).await.expect("purge");
        assert_eq!(removed, 1);
        assert!(entries_repo.get_entry("old-live").expect("get").is_none());
    }
}
