//! Last-write-wins conflict resolution.
//!
//! The decision is pure and table-agnostic; the storage layer evaluates it
//! against the local row and applies the resulting upsert. Only the
//! snapshot's `updatedAt` drives the comparison — `type` matters solely when
//! the local record is absent.

use serde::Deserialize;

use crate::errors::{Error, Result};
use crate::sync::model::OperationType;

/// The sync-relevant subset of a record snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMeta {
    pub updated_at: i64,
    #[serde(default)]
    pub deleted: bool,
}

impl SnapshotMeta {
    /// Extracts the merge inputs from a full snapshot. A snapshot without a
    /// numeric `updatedAt` is malformed and cannot be merged.
    pub fn from_snapshot(data: &serde_json::Value) -> Result<Self> {
        SnapshotMeta::deserialize(data)
            .map_err(|err| Error::validation(format!("invalid record snapshot: {err}")))
    }
}

/// What to do with one incoming operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Local row absent: write the snapshot as a new record.
    Insert,
    /// Incoming snapshot strictly newer: replace the local row wholesale.
    Overwrite,
    /// Local row as new or newer: keep it untouched.
    KeepLocal,
    /// Never-seen record arriving already deleted: do not materialize it.
    DropTombstone,
}

impl MergeDecision {
    /// True when the decision mutates local state.
    pub fn applies(&self) -> bool {
        matches!(self, MergeDecision::Insert | MergeDecision::Overwrite)
    }
}

/// Resolves one incoming operation against the local record version.
///
/// `local_updated_at` is `None` when no local row exists for the record.
/// In the local-present branch `update` and `delete` are handled
/// identically: the snapshot's `deleted` flag rides along with the
/// overwrite, which is what lets a newer update resurrect a record a
/// stale delete tombstoned.
pub fn decide_merge(
    local_updated_at: Option<i64>,
    op_type: OperationType,
    snapshot: &SnapshotMeta,
) -> MergeDecision {
    match local_updated_at {
        None => {
            if op_type == OperationType::Delete || snapshot.deleted {
                MergeDecision::DropTombstone
            } else {
                MergeDecision::Insert
            }
        }
        Some(local_ts) => {
            if snapshot.updated_at > local_ts {
                MergeDecision::Overwrite
            } else {
                MergeDecision::KeepLocal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(updated_at: i64, deleted: bool) -> SnapshotMeta {
        SnapshotMeta {
            updated_at,
            deleted,
        }
    }

    #[test]
    fn absent_local_inserts_live_snapshot() {
        let decision = decide_merge(None, OperationType::Create, &meta(10, false));
        assert_eq!(decision, MergeDecision::Insert);
    }

    #[test]
    fn absent_local_drops_delete_operation() {
        let decision = decide_merge(None, OperationType::Delete, &meta(10, false));
        assert_eq!(decision, MergeDecision::DropTombstone);
    }

    #[test]
    fn absent_local_drops_deleted_snapshot_regardless_of_type() {
        let decision = decide_merge(None, OperationType::Update, &meta(10, true));
        assert_eq!(decision, MergeDecision::DropTombstone);
    }

    #[test]
    fn strictly_newer_snapshot_overwrites() {
        let decision = decide_merge(Some(9), OperationType::Update, &meta(10, false));
        assert_eq!(decision, MergeDecision::Overwrite);
    }

    #[test]
    fn equal_timestamp_keeps_local() {
        let decision = decide_merge(Some(10), OperationType::Update, &meta(10, false));
        assert_eq!(decision, MergeDecision::KeepLocal);
    }

    #[test]
    fn older_snapshot_keeps_local() {
        let decision = decide_merge(Some(11), OperationType::Update, &meta(10, true));
        assert_eq!(decision, MergeDecision::KeepLocal);
    }

    #[test]
    fn present_branch_ignores_operation_type() {
        // A delete is just an overwrite whose snapshot carries deleted=true.
        let newer_delete = decide_merge(Some(9), OperationType::Delete, &meta(10, true));
        assert_eq!(newer_delete, MergeDecision::Overwrite);

        let stale_delete = decide_merge(Some(11), OperationType::Delete, &meta(10, true));
        assert_eq!(stale_delete, MergeDecision::KeepLocal);
    }

    #[test]
    fn snapshot_meta_requires_updated_at() {
        let missing = serde_json::json!({ "id": "x", "deleted": false });
        assert!(SnapshotMeta::from_snapshot(&missing).is_err());

        let valid = serde_json::json!({ "id": "x", "updatedAt": 5 });
        let parsed = SnapshotMeta::from_snapshot(&valid).expect("parse snapshot");
        assert_eq!(parsed, meta(5, false));
    }
}
