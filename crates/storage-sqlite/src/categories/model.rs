//! Database row for categories.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use daybook_core::errors::{Error, Result};
use daybook_core::records::Category;
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
#[diesel(table_name = crate::schema::categories)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CategoryDB {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
    pub version: i32,
    pub device_id: String,
    pub sync_status: String,
    pub deleted: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Category> for CategoryDB {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
            color: category.color,
            version: category.version,
            device_id: category.device_id,
            sync_status: category.sync_status.as_str().to_string(),
            deleted: i32::from(category.deleted),
            created_at: category.created_at,
            updated_at: category.updated_at,
        }
    }
}

impl TryFrom<CategoryDB> for Category {
    type Error = Error;

    fn try_from(row: CategoryDB) -> Result<Self> {
        let sync_status: SyncStatus = enum_from_db(&row.sync_status)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            color: row.color,
            version: row.version,
            device_id: row.device_id,
            sync_status,
            deleted: row.deleted != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
