//! Goal domain model and repository contract.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::sync::SyncStatus;

/// A personal target tracked alongside journal entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub target_value: Option<f64>,
    pub unit: Option<String>,
    pub achieved: bool,
    pub version: i32,
    pub device_id: String,
    pub sync_status: SyncStatus,
    pub deleted: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGoal {
    pub title: String,
    pub target_value: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalUpdate {
    pub id: String,
    pub title: String,
    pub target_value: Option<f64>,
    pub unit: Option<String>,
    pub achieved: bool,
}

#[async_trait]
pub trait GoalRepositoryTrait: Send + Sync {
    fn get_goal(&self, goal_id: &str) -> Result<Option<Goal>>;

    fn list_goals(&self) -> Result<Vec<Goal>>;

    async fn insert_new_goal(&self, new_goal: NewGoal) -> Result<Goal>;

    async fn update_goal(&self, update: GoalUpdate) -> Result<Goal>;

    async fn delete_goal(&self, goal_id: String) -> Result<usize>;
}
