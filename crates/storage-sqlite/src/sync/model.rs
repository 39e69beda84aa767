//! Database rows for the sync infrastructure tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Row in `sync_operations`, the durable operation log. `data` holds the
/// record snapshot as a JSON string.
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_operations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OperationDB {
    pub id: String,
    pub timestamp: i64,
    pub device_id: String,
    pub table_name: String,
    pub record_id: String,
    pub op_type: String,
    pub data: String,
    pub synced: i32,
}

/// Row in `sync_meta`, the key/value store holding the device id, the pull
/// cursor and the last successful sync time.
#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(key))]
#[diesel(table_name = crate::schema::sync_meta)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncMetaDB {
    pub key: String,
    pub value: String,
}
