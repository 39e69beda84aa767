//! Durable operation log over the `sync_operations` table.
//!
//! Record repositories append through [`append_operation`] inside the same
//! writer transaction as the table write, so the log can never describe a
//! mutation that did not commit.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;

use daybook_core::errors::Result;
use daybook_core::sync::{Operation, OperationLogRepositoryTrait};

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_operations;

use super::model::OperationDB;
use super::{enum_from_db, enum_to_db};

fn to_operation_row(operation: &Operation) -> Result<OperationDB> {
    Ok(OperationDB {
        id: operation.id.clone(),
        timestamp: operation.timestamp,
        device_id: operation.device_id.clone(),
        table_name: enum_to_db(&operation.table_name)?,
        record_id: operation.record_id.clone(),
        op_type: enum_to_db(&operation.op_type)?,
        data: serde_json::to_string(&operation.data)?,
        synced: i32::from(operation.synced),
    })
}

fn to_operation(row: OperationDB) -> Result<Operation> {
    let table_name = enum_from_db(&row.table_name)?;
    let op_type = enum_from_db(&row.op_type)?;
    let data = serde_json::from_str(&row.data)?;
    Ok(Operation {
        id: row.id,
        timestamp: row.timestamp,
        device_id: row.device_id,
        table_name,
        record_id: row.record_id,
        op_type,
        data,
        synced: row.synced != 0,
    })
}

/// Appends one operation inside the caller's open transaction. Rolling the
/// transaction back takes the operation with it.
pub fn append_operation(conn: &mut SqliteConnection, operation: &Operation) -> Result<()> {
    let row = to_operation_row(operation)?;
    diesel::insert_into(sync_operations::table)
        .values(&row)
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

pub struct OperationLogRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl OperationLogRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl OperationLogRepositoryTrait for OperationLogRepository {
    fn unsynced_operations(&self) -> Result<Vec<Operation>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_operations::table
            .filter(sync_operations::synced.eq(0))
            .order((
                sync_operations::timestamp.asc(),
                sync_operations::id.asc(),
            ))
            .load::<OperationDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(to_operation).collect()
    }

    async fn mark_synced(&self, operation_ids: Vec<String>) -> Result<()> {
        if operation_ids.is_empty() {
            return Ok(());
        }
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                diesel::update(
                    sync_operations::table.filter(sync_operations::id.eq_any(&operation_ids)),
                )
                .set(sync_operations::synced.eq(1))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn purge_synced_older_than(&self, cutoff_ms: i64) -> Result<usize> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let removed = diesel::delete(
                    sync_operations::table
                        .filter(sync_operations::synced.eq(1))
                        .filter(sync_operations::timestamp.lt(cutoff_ms)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(removed)
            })
            .await
    }

    fn count_unsynced(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_operations::table
            .filter(sync_operations::synced.eq(0))
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }

    fn count_synced(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_operations::table
            .filter(sync_operations::synced.eq(1))
            .count()
            .get_result(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }
}
