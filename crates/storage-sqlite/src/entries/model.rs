//! Database row for journal entries.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use daybook_core::errors::{Error, Result};
use daybook_core::records::Entry;
use daybook_core::sync::SyncStatus;

use crate::sync::enum_from_db;

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
#[diesel(table_name = crate::schema::entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntryDB {
    pub id: String,
    pub category_id: Option<String>,
    pub title: String,
    pub body: String,
    pub entry_date: String,
    pub version: i32,
    pub device_id: String,
    pub sync_status: String,
    pub deleted: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Entry> for EntryDB {
    fn from(entry: Entry) -> Self {
        Self {
            id: entry.id,
            category_id: entry.category_id,
            title: entry.title,
            body: entry.body,
            entry_date: entry.entry_date,
            version: entry.version,
            device_id: entry.device_id,
            sync_status: entry.sync_status.as_str().to_string(),
            deleted: i32::from(entry.deleted),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }
}

impl TryFrom<EntryDB> for Entry {
    type Error = Error;

    fn try_from(row: EntryDB) -> Result<Self> {
        let sync_status: SyncStatus = enum_from_db(&row.sync_status)?;
        Ok(Self {
            id: row.id,
            category_id: row.category_id,
            title: row.title,
            body: row.body,
            entry_date: row.entry_date,
            version: row.version,
            device_id: row.device_id,
            sync_status,
            deleted: row.deleted != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
