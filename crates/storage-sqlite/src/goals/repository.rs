//! Goal persistence.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use daybook_core::errors::Result;
use daybook_core::records::{Goal, GoalRepositoryTrait, GoalUpdate, NewGoal};
use daybook_core::sync::{next_updated_at, Operation, OperationType, SyncStatus, SyncTable};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::goals;
use crate::sync::{append_operation, resolve_device_id};

use super::model::GoalDB;

pub struct GoalRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl GoalRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl GoalRepositoryTrait for GoalRepository {
    fn get_goal(&self, goal_id: &str) -> Result<Option<Goal>> {
        let mut conn = get_connection(&self.pool)?;
        let row = goals::table
            .find(goal_id)
            .first::<GoalDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(Goal::try_from).transpose()
    }

    fn list_goals(&self) -> Result<Vec<Goal>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = goals::table
            .filter(goals::deleted.eq(0))
            .order(goals::created_at.asc())
            .load::<GoalDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(Goal::try_from).collect()
    }

    async fn insert_new_goal(&self, new_goal: NewGoal) -> Result<Goal> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Goal> {
                let device_id = resolve_device_id(conn)?;
                let now = next_updated_at(None);
                let row = GoalDB {
                    id: Uuid::new_v4().to_string(),
                    title: new_goal.title,
                    target_value: new_goal.target_value,
                    unit: new_goal.unit,
                    achieved: 0,
                    version: 1,
                    device_id: device_id.clone(),
                    sync_status: SyncStatus::Pending.as_str().to_string(),
                    deleted: 0,
                    created_at: now,
                    updated_at: now,
                };
                let inserted = diesel::insert_into(goals::table)
                    .values(&row)
                    .returning(GoalDB::as_returning())
                    .get_result::<GoalDB>(conn)
                    .map_err(StorageError::from)?;
                let goal = Goal::try_from(inserted)?;
                append_operation(
                    conn,
                    &Operation::new(
                        device_id,
                        SyncTable::Goals,
                        goal.id.clone(),
                        OperationType::Create,
                        serde_json::to_value(&goal)?,
                    ),
                )?;
                Ok(goal)
            })
            .await
    }

    async fn update_goal(&self, update: GoalUpdate) -> Result<Goal> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<Goal> {
                let mut row = goals::table
                    .find(&update.id)
                    .first::<GoalDB>(conn)
                    .map_err(StorageError::from)?;
                let device_id = resolve_device_id(conn)?;
                row.title = update.title;
                row.target_value = update.target_value;
                row.unit = update.unit;
                row.achieved = i32::from(update.achieved);
                row.version += 1;
                row.device_id = device_id.clone();
                row.sync_status = SyncStatus::Pending.as_str().to_string();
                row.updated_at = next_updated_at(Some(row.updated_at));
                diesel::update(goals::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                let goal = Goal::try_from(row)?;
                append_operation(
                    conn,
                    &Operation::new(
                        device_id,
                        SyncTable::Goals,
                        goal.id.clone(),
                        OperationType::Update,
                        serde_json::to_value(&goal)?,
                    ),
                )?;
                Ok(goal)
            })
            .await
    }

    async fn delete_goal(&self, goal_id: String) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let existing = goals::table
                    .find(&goal_id)
                    .first::<GoalDB>(conn)
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
                let affected = diesel::update(goals::table.find(&row.id))
                    .set(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                if affected > 0 {
                    let goal = Goal::try_from(row)?;
                    append_operation(
                        conn,
                        &Operation::new(
                            device_id,
                            SyncTable::Goals,
                            goal.id.clone(),
                            OperationType::Delete,
                            serde_json::to_value(&goal)?,
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
    async fn goal_lifecycle_keeps_the_log_in_step() {
        let (pool, writer) = setup_db();
        let repo = GoalRepository::new(pool.clone(), writer.clone());
        let log = OperationLogRepository::new(pool, writer);

        let goal = repo
            .insert_new_goal(NewGoal {
                title: "Run 500 km".to_string(),
                target_value: Some(500.0),
                unit: Some("km".to_string()),
            })
            .await
            .expect("insert");
        assert!(!goal.achieved);
        assert_eq!(goal.version, 1);

        let achieved = repo
            .update_goal(GoalUpdate {
                id: goal.id.clone(),
                title: goal.title.clone(),
                target_value: goal.target_value,
                unit: goal.unit.clone(),
                achieved: true,
            })
            .await
            .expect("update");
        assert!(achieved.achieved);
        assert_eq!(achieved.version, 2);

        let ops = log.unsynced_operations().expect("unsynced");
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.table_name == SyncTable::Goals));
        let update_op = ops
            .iter()
            .find(|op| op.op_type == OperationType::Update)
            .expect("update operation logged");
        assert_eq!(update_op.data["achieved"], true);
        assert_eq!(update_op.data["targetValue"], 500.0);
    }

    #[tokio::test]
    async fn deleted_goals_drop_out_of_the_list_but_stay_fetchable() {
        let (pool, writer) = setup_db();
        let repo = GoalRepository::new(pool, writer);

        let goal = repo
            .insert_new_goal(NewGoal {
                title: "Read 12 books".to_string(),
                target_value: Some(12.0),
                unit: None,
            })
            .await
            .expect("insert");
        let affected = repo.delete_goal(goal.id.clone()).await.expect("delete");

        assert_eq!(affected, 1);
        assert!(repo.list_goals().expect("list").is_empty());
        let tombstone = repo.get_goal(&goal.id).expect("get").expect("row present");
        assert!(tombstone.deleted);
    }
}
