//! Journal entry persistence.
//!
//! Every mutation runs on the writer thread and appends its sync operation
//! in the same transaction as the table write.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use daybook_core::errors::Result;
use daybook_core::records::{Entry, EntryRepositoryTrait, EntryUpdate, NewEntry};
use daybook_core::sync::{next_updated_at, Operation, OperationType, SyncStatus, SyncTable};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::entries;
use crate::sync::{append_operation, resolve_device_id};

use super::model::EntryDB;

pub struct EntryRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl EntryRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl EntryRepositoryTrait for EntryRepository {
    fn get_entry(&self, entry_id: &str) -> Result<Option<Entry>> {
        let mut conn = get_connection(&self.pool)?;
        let row = entries::table
            .find(entry_id)
            .first::<EntryDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(Entry::try_from).transpose()
    }

    fn list_entries(&self) -> Result<Vec<Entry>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = entries::table
            .filter(entries::deleted.eq(0))
            .order(entries::entry_date.desc())
            .load::<EntryDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(Entry::try_from).collect()
    }

    async fn insert_new_entry(&self, new_entry: NewEntry) -> Result<Entry> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Entry> {
                let device_id = resolve_device_id(conn)?;
                let now = next_updated_at(None);
                let row = EntryDB {
                    id: Uuid::new_v4().to_string(),
                    category_id: new_entry.category_id,
                    title: new_entry.title,
                    body: new_entry.body,
                    entry_date: new_entry.entry_date,
                    version: 1,
                    device_id: device_id.clone(),
                    sync_status: SyncStatus::Pending.as_str().to_string(),
                    deleted: 0,
                    created_at: now,
                    updated_at: now,
                };
                let inserted = diesel::insert_into(entries::table)
                    .values(&row)
                    .returning(EntryDB::as_returning())
                    .get_result::<EntryDB>(conn)
                    .map_err(StorageError::from)?;
                let entry = Entry::try_from(inserted)?;
                append_operation(
                    conn,
                    &Operation::new(
                        device_id,
                        SyncTable::Entries,
                        entry.id.clone(),
                        OperationType::Create,
                        serde_json::to_value(&entry)?,
                    ),
                )?;
                Ok(entry)
            })
            .await
    }

    async fn update_entry(&self, update: EntryUpdate) -> Result<Entry> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Entry> {
                let mut row = entries::table
                    .find(&update.id)
                    .first::<EntryDB>(conn)
                    .map_err(StorageError::from)?;
                let device_id = resolve_device_id(conn)?;
                row.category_id = update.category_id;
                row.title = update.title;
                row.body = update.body;
                row.entry_date = update.entry_date;
                row.version += 1;
                row.device_id = device_id.clone();
                row.sync_status = SyncStatus::Pending.as_str().to_string();
                row.updated_at = next_updated_at(Some(row.updated_at));
                diesel::update(entries::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                let entry = Entry::try_from(row)?;
                append_operation(
                    conn,
                    &Operation::new(
                        device_id,
                        SyncTable::Entries,
                        entry.id.clone(),
                        OperationType::Update,
                        serde_json::to_value(&entry)?,
                    ),
                )?;
                Ok(entry)
            })
            .await
    }

    async fn delete_entry(&self, entry_id: String) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let existing = entries::table
                    .find(&entry_id)
                    .first::<EntryDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                let Some(mut row) = existing else {
                    return Ok(0);
                };
                if row.deleted != 0 {
                    return Ok(0);
                }
                let device_id = resolve_device_id(conn)?;
                row.deleted = 1;
                row.version += 1;
                row.device_id = device_id.clone();
                row.sync_status = SyncStatus::Pending.as_str().to_string();
                row.updated_at = next_updated_at(Some(row.updated_at));
                let affected = diesel::update(entries::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected > 0 {
                    // Tombstones carry the full soft-deleted snapshot.
                    let entry = Entry::try_from(row)?;
                    append_operation(
                        conn,
                        &Operation::new(
                            device_id,
                            SyncTable::Entries,
                            entry.id.clone(),
                            OperationType::Delete,
                            serde_json::to_value(&entry)?,
                        ),
                    )?;
                }
                Ok(affected)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, init, run_migrations, spawn_writer};
    use crate::sync::OperationLogRepository;
    use daybook_core::errors::Error;
    use daybook_core::sync::OperationLogRepositoryTrait;
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

    fn sample_entry() -> NewEntry {
        NewEntry {
            category_id: None,
            title: "Morning pages".to_string(),
            body: "Slept well, long walk before breakfast.".to_string(),
            entry_date: "2026-06-02".to_string(),
        }
    }

    #[tokio::test]
    async fn insert_assigns_the_envelope_and_logs_a_create_operation() {
        let (pool, writer) = setup_db();
        let repo = EntryRepository::new(pool.clone(), writer.clone());
        let log = OperationLogRepository::new(pool, writer);

        let entry = repo.insert_new_entry(sample_entry()).await.expect("insert");

        assert_eq!(entry.version, 1);
        assert_eq!(entry.sync_status, SyncStatus::Pending);
        assert!(!entry.deleted);
        assert_eq!(entry.created_at, entry.updated_at);
        assert!(Uuid::parse_str(&entry.id).is_ok());
        assert!(Uuid::parse_str(&entry.device_id).is_ok());

        let ops = log.unsynced_operations().expect("unsynced");
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].table_name, SyncTable::Entries);
        assert_eq!(ops[0].op_type, OperationType::Create);
        assert_eq!(ops[0].record_id, entry.id);
        assert_eq!(ops[0].device_id, entry.device_id);
        assert_eq!(ops[0].data, serde_json::to_value(&entry).expect("json"));
    }

    #[tokio::test]
    async fn update_replaces_fields_and_bumps_the_envelope() {
        let (pool, writer) = setup_db();
        let repo = EntryRepository::new(pool.clone(), writer.clone());
        let log = OperationLogRepository::new(pool, writer);

        let entry = repo.insert_new_entry(sample_entry()).await.expect("insert");
        let updated = repo
            .update_entry(EntryUpdate {
                id: entry.id.clone(),
                category_id: Some("cat-1".to_string()),
                title: "Morning pages, revised".to_string(),
                body: entry.body.clone(),
                entry_date: entry.entry_date.clone(),
            })
            .await
            .expect("update");

        assert_eq!(updated.title, "Morning pages, revised");
        assert_eq!(updated.category_id.as_deref(), Some("cat-1"));
        assert_eq!(updated.version, 2);
        assert!(updated.updated_at > entry.updated_at);
        assert_eq!(updated.created_at, entry.created_at);

        let ops = log.unsynced_operations().expect("unsynced");
        assert_eq!(ops.len(), 2);
        let update_op = ops
            .iter()
            .find(|op| op.op_type == OperationType::Update)
            .expect("update operation logged");
        assert_eq!(update_op.data["title"], "Morning pages, revised");
    }

    #[tokio::test]
    async fn delete_soft_deletes_and_logs_the_full_snapshot() {
        let (pool, writer) = setup_db();
        let repo = EntryRepository::new(pool.clone(), writer.clone());
        let log = OperationLogRepository::new(pool, writer);

        let entry = repo.insert_new_entry(sample_entry()).await.expect("insert");
        let affected = repo.delete_entry(entry.id.clone()).await.expect("delete");
        assert_eq!(affected, 1);

        assert!(repo.list_entries().expect("list").is_empty());
        let tombstone = repo
            .get_entry(&entry.id)
            .expect("get")
            .expect("row still present");
        assert!(tombstone.deleted);
        assert_eq!(tombstone.version, 2);
        assert!(tombstone.updated_at > entry.updated_at);

        let ops = log.unsynced_operations().expect("unsynced");
        assert_eq!(ops.len(), 2);
        let delete_op = ops
            .iter()
            .find(|op| op.op_type == OperationType::Delete)
            .expect("delete operation logged");
        assert_eq!(delete_op.data["deleted"], true);
        assert_eq!(delete_op.data["title"], "Morning pages");

        // Deleting a tombstone again is a no-op.
        let again = repo.delete_entry(entry.id).await.expect("delete again");
        assert_eq!(again, 0);
        assert_eq!(log.unsynced_operations().expect("unsynced").len(), 2);
    }

    #[tokio::test]
    async fn deleting_a_missing_entry_logs_nothing() {
        let (pool, writer) = setup_db();
        let repo = EntryRepository::new(pool.clone(), writer.clone());
        let log = OperationLogRepository::new(pool, writer);

        let affected = repo
            .delete_entry("no-such-entry".to_string())
            .await
            .expect("delete");

        assert_eq!(affected, 0);
        assert_eq!(log.count_unsynced().expect("count"), 0);
    }

    #[tokio::test]
    async fn a_failed_write_rolls_back_both_the_row_and_the_operation() {
        let (pool, writer) = setup_db();
        let repo = EntryRepository::new(pool.clone(), writer.clone());
        let log = OperationLogRepository::new(pool, writer.clone());

        let outcome = writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                let device_id = resolve_device_id(conn)?;
                let now = next_updated_at(None);
                let row = EntryDB {
                    id: "doomed".to_string(),
                    category_id: None,
                    title: "Never committed".to_string(),
                    body: String::new(),
                    entry_date: "2026-06-02".to_string(),
                    version: 1,
                    device_id: device_id.clone(),
                    sync_status: SyncStatus::Pending.as_str().to_string(),
                    deleted: 0,
                    created_at: now,
                    updated_at: now,
                };
                diesel::insert_into(entries::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                let entry = Entry::try_from(row)?;
                append_operation(
                    conn,
                    &Operation::new(
                        device_id,
                        SyncTable::Entries,
                        entry.id.clone(),
                        OperationType::Create,
                        serde_json::to_value(&entry)?,
                    ),
                )?;
                Err(Error::validation("forced rollback"))
            })
            .await;

        assert!(outcome.is_err());
        assert!(repo.get_entry("doomed").expect("get").is_none());
        assert_eq!(log.count_unsynced().expect("count"), 0);
    }
}
