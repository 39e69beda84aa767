//! Database row for goals.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use daybook_core::errors::{Error, Result};
use daybook_core::records::Goal;
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
#[diesel(table_name = crate::schema::goals)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct GoalDB {
    pub id: String,
    pub title: String,
    pub target_value: Option<f64>,
    pub unit: Option<String>,
    pub achieved: i32,
    pub version: i32,
    pub device_id: String,
    pub sync_status: String,
    pub deleted: i32,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Goal> for GoalDB {
    fn from(goal: Goal) -> Self {
        Self {
            id: goal.id,
            title: goal.title,
            target_value: goal.target_value,
            unit: goal.unit,
            achieved: i32::from(goal.achieved),
            version: goal.version,
            device_id: goal.device_id,
            sync_status: goal.sync_status.as_str().to_string(),
            deleted: i32::from(goal.deleted),
            created_at: goal.created_at,
            updated_at: goal.updated_at,
        }
    }
}

impl TryFrom<GoalDB> for Goal {
    type Error = Error;

    fn try_from(row: GoalDB) -> Result<Self> {
        let sync_status: SyncStatus = enum_from_db(&row.sync_status)?;
        Ok(Self {
            id: row.id,
            title: row.title,
            target_value: row.target_value,
            unit: row.unit,
            achieved: row.achieved != 0,
            version: row.version,
            device_id: row.device_id,
            sync_status,
            deleted: row.deleted != 0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
