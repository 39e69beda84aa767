//! Key/value sync metadata: device identity, pull cursor, last sync time.

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::SqliteConnection;
use uuid::Uuid;

use daybook_core::errors::{DatabaseError, Error, Result};
use daybook_core::sync::SyncMetadataRepositoryTrait;

use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_meta;

use super::model::SyncMetaDB;

const KEY_DEVICE_ID: &str = "deviceId";
const KEY_LAST_PROCESSED_TIMESTAMP: &str = "lastProcessedTimestamp";
const KEY_LAST_SYNC_TIME: &str = "lastSyncTime";

fn read_value(conn: &mut SqliteConnection, meta_key: &str) -> Result<Option<String>> {
    let row = sync_meta::table
        .find(meta_key)
        .first::<SyncMetaDB>(conn)
        .optional()
        .map_err(StorageError::from)?;
    Ok(row.map(|row| row.value))
}

fn write_value(conn: &mut SqliteConnection, meta_key: &str, value: &str) -> Result<()> {
    let row = SyncMetaDB {
        key: meta_key.to_string(),
        value: value.to_string(),
    };
    diesel::insert_into(sync_meta::table)
        .values(&row)
        .on_conflict(sync_meta::key)
        .do_update()
        .set(sync_meta::value.eq(&row.value))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

/// Reads the device id inside an open transaction, generating and storing a
/// fresh one on first use. Record repositories call this while stamping
/// rows so the id and the row land in the same transaction.
pub fn resolve_device_id(conn: &mut SqliteConnection) -> Result<String> {
    if let Some(existing) = read_value(conn, KEY_DEVICE_ID)? {
        return Ok(existing);
    }
    let device_id = Uuid::new_v4().to_string();
    write_value(conn, KEY_DEVICE_ID, &device_id)?;
    Ok(device_id)
}

pub struct SyncMetadataRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncMetadataRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncMetadataRepositoryTrait for SyncMetadataRepository {
    async fn ensure_device_id(&self) -> Result<String> {
        self.writer
            .exec(|conn: &mut SqliteConnection| -> Result<String> { resolve_device_id(conn) })
            .await
    }

    fn last_processed_timestamp(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        match read_value(&mut conn, KEY_LAST_PROCESSED_TIMESTAMP)? {
            None => Ok(0),
            Some(value) => value.parse::<i64>().map_err(|err| {
                Error::Database(DatabaseError::Internal(format!(
                    "Corrupt pull cursor '{value}': {err}"
                )))
            }),
        }
    }

    async fn set_last_processed_timestamp(&self, timestamp: i64) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                write_value(conn, KEY_LAST_PROCESSED_TIMESTAMP, &timestamp.to_string())
            })
            .await
    }

    fn last_sync_time(&self) -> Result<Option<String>> {
        let mut conn = get_connection(&self.pool)?;
        read_value(&mut conn, KEY_LAST_SYNC_TIME)
    }

    async fn set_last_sync_time(&self, rfc3339: String) -> Result<()> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<()> {
                write_value(conn, KEY_LAST_SYNC_TIME, &rfc3339)
            })
            .await
    }
}
