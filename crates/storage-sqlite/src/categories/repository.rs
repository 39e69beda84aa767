//! Category persistence, mirroring the entry repository's write-through
//! shape.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use daybook_core::errors::Result;
use daybook_core::records::{Category, CategoryRepositoryTrait, CategoryUpdate, NewCategory};
use daybook_core::sync::{next_updated_at, Operation, OperationType, SyncStatus, SyncTable};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::categories;
use crate::sync::{append_operation, resolve_device_id};

use super::model::CategoryDB;

pub struct CategoryRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl CategoryRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl CategoryRepositoryTrait for CategoryRepository {
    fn get_category(&self, category_id: &str) -> Result<Option<Category>> {
        let mut conn = get_connection(&self.pool)?;
        let row = categories::table
            .find(category_id)
            .first::<CategoryDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(Category::try_from).transpose()
    }

    fn list_categories(&self) -> Result<Vec<Category>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = categories::table
            .filter(categories::deleted.eq(0))
            .order(categories::name.asc())
            .load::<CategoryDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(Category::try_from).collect()
    }

    async fn insert_new_category(&self, new_category: NewCategory) -> Result<Category> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Category> {
                let device_id = resolve_device_id(conn)?;
                let now = next_updated_at(None);
                let row = CategoryDB {
                    id: Uuid::new_v4().to_string(),
                    name: new_category.name,
                    color: new_category.color,
                    version: 1,
                    device_id: device_id.clone(),
                    sync_status: SyncStatus::Pending.as_str().to_string(),
                    deleted: 0,
                    created_at: now,
                    updated_at: now,
                };
                let inserted = diesel::insert_into(categories::table)
                    .values(&row)
                    .returning(CategoryDB::as_returning())
                    .get_result::<CategoryDB>(conn)
                    .map_err(StorageError::from)?;
                let category = Category::try_from(inserted)?;
                append_operation(
                    conn,
                    &Operation::new(
                        device_id,
                        SyncTable::Categories,
                        category.id.clone(),
                        OperationType::Create,
                        serde_json::to_value(&category)?,
                    ),
                )?;
                Ok(category)
            })
            .await
    }

    async fn update_category(&self, update: CategoryUpdate) -> Result<Category> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Category> {
                let mut row = categories::table
                    .find(&update.id)
                    .first::<CategoryDB>(conn)
                    .map_err(StorageError::from)?;
                let device_id = resolve_device_id(conn)?;
                row.name = update.name;
                row.color = update.color;
                row.version += 1;
                row.device_id = device_id.clone();
                row.sync_status = SyncStatus::Pending.as_str().to_string();
                row.updated_at = next_updated_at(Some(row.updated_at));
                diesel::update(categories::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                let category = Category::try_from(row)?;
                append_operation(
                    conn,
                    &Operation::new(
                        device_id,
                        SyncTable::Categories,
                        category.id.clone(),
                        OperationType::Update,
                        serde_json::to_value(&category)?,
                    ),
                )?;
                Ok(category)
            })
            .await
    }

    async fn delete_category(&self, category_id: String) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let existing = categories::table
                    .find(&category_id)
                    .first::<CategoryDB>(conn)
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
                let affected = diesel::update(categories::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected > 0 {
                    let category = Category::try_from(row)?;
                    append_operation(
                        conn,
                        &Operation::new(
                            device_id,
                            SyncTable::Categories,
                            category.id.clone(),
                            OperationType::Delete,
                            serde_json::to_value(&category)?,
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

    #[tokio::test]
    async fn category_lifecycle_logs_one_operation_per_mutation() {
        let (pool, writer) = setup_db();
        let repo = CategoryRepository::new(pool.clone(), writer.clone());
        let log = OperationLogRepository::new(pool, writer);

        let category = repo
            .insert_new_category(NewCategory {
                name: "Health".to_string(),
                color: Some("#00aa55".to_string()),
            })
            .await
            .expect("insert");
        assert_eq!(category.version, 1);
        assert_eq!(category.sync_status, SyncStatus::Pending);

        let updated = repo
            .update_category(CategoryUpdate {
                id: category.id.clone(),
                name: "Health & Fitness".to_string(),
                color: category.color.clone(),
            })
            .await
            .expect("update");
        assert_eq!(updated.version, 2);
        assert!(updated.updated_at > category.updated_at);

        let affected = repo
            .delete_category(category.id.clone())
            .await
            .expect("delete");
        assert_eq!(affected, 1);
        assert!(repo.list_categories().expect("list").is_empty());

        let ops = log.unsynced_operations().expect("unsynced");
        assert_eq!(ops.len(), 3);
        assert!(ops
            .iter()
            .all(|op| op.table_name == SyncTable::Categories && op.record_id == category.id));
        for expected in [
            OperationType::Create,
            OperationType::Update,
            OperationType::Delete,
        ] {
            assert!(ops.iter().any(|op| op.op_type == expected));
        }
        let delete_op = ops
            .iter()
            .find(|op| op.op_type == OperationType::Delete)
            .expect("delete operation logged");
        assert_eq!(delete_op.data["deleted"], true);
        assert_eq!(delete_op.data["name"], "Health & Fitness");
    }

    #[tokio::test]
    async fn list_is_sorted_by_name_and_excludes_tombstones() {
        let (pool, writer) = setup_db();
        let repo = CategoryRepository::new(pool, writer);

        for name in ["Work", "Family", "Travel"] {
            repo.insert_new_category(NewCategory {
                name: name.to_string(),
                color: None,
            })
            .await
            .expect("insert");
        }
        let listed = repo.list_categories().expect("list");
        let doomed = listed
            .iter()
            .find(|category| category.name == "Travel")
            .expect("travel exists");
        repo.delete_category(doomed.id.clone()).await.expect("delete");

        let names: Vec<String> = repo
            .list_categories()
            .expect("list")
            .into_iter()
            .map(|category| category.name)
            .collect();
        assert_eq!(names, vec!["Family".to_string(), "Work".to_string()]);
    }
}
