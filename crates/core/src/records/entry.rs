//! Journal entry domain model and repository contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::sync::SyncStatus;

/// A dated journal record.
///
/// Field names map 1:1 onto the camelCase snapshot carried inside sync
/// operations, so serializing an [`Entry`] *is* the wire snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    pub category_id: Option<String>,
    pub title: String,
    pub body: String,
    /// Calendar day the entry belongs to, `YYYY-MM-DD`.
    pub entry_date: String,
    pub version: i32,
    pub device_id: String,
    pub sync_status: SyncStatus,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Payload for creating an entry. The storage layer assigns the id and the
/// sync envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntry {
    pub category_id: Option<String>,
    pub title: String,
    pub body: String,
    pub entry_date: String,
}

/// Editable fields of an existing entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryUpdate {
    pub id: String,
    pub category_id: Option<String>,
    pub title: String,
    pub body: String,
    pub entry_date: String,
}

#[async_trait]
pub trait EntryRepositoryTrait: Send + Sync {
    /// Returns the entry regardless of its soft-delete state.
    fn get_entry(&self, entry_id: &str) -> Result<Option<Entry>>;

    /// Lists live (non-deleted) entries, newest entry date first.
    fn list_entries(&self) -> Result<Vec<Entry>>;

    async fn insert_new_entry(&self, new_entry: NewEntry) -> Result<Entry>;

    async fn update_entry(&self, update: EntryUpdate) -> Result<Entry>;

    /// Soft-deletes the entry. Returns the number of rows affected.
    async fn delete_entry(&self, entry_id: String) -> Result<usize>;
}
