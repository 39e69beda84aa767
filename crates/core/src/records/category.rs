//! Category domain model and repository contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::sync::SyncStatus;

/// A label entries can be grouped under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    /// Optional display color, `#rrggbb`.
    pub color: Option<String>,
    pub version: i32,
    pub device_id: String,
    pub sync_status: SyncStatus,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub id: String,
    pub name: String,
    pub color: Option<String>,
}

#[async_trait]
pub trait CategoryRepositoryTrait: Send + Sync {
    fn get_category(&self, category_id: &str) -> Result<Option<Category>>;

    fn list_categories(&self) -> Result<Vec<Category>>;

    async fn insert_new_category(&self, new_category: NewCategory) -> Result<Category>;

    async fn update_category(&self, update: CategoryUpdate) -> Result<Category>;

    async fn delete_category(&self, category_id: String) -> Result<usize>;
}
