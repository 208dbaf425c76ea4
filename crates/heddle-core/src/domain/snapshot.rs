//! Durable state: the snapshot file and the checkpoint handed to `restore_state`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::task::Task;

/// What survives a restart without the task list: the completed ids and the
/// foundation gate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    pub completed_ids: BTreeSet<TaskId>,
    pub foundation_task_id: Option<TaskId>,
    pub foundation_complete: bool,
}

/// Snapshot written after every state change.
///
/// `tasks` and `lastUpdated` are the required fields; the gate fields default
/// when absent so older snapshots still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub last_updated: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foundation_task_id: Option<TaskId>,
    #[serde(default)]
    pub foundation_complete: bool,
}

impl Snapshot {
    /// The checkpoint implied by this snapshot.
    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            completed_ids: self
                .tasks
                .iter()
                .filter(|t| t.status == super::task::TaskStatus::Done)
                .map(|t| t.id.clone())
                .collect(),
            foundation_task_id: self.foundation_task_id.clone(),
            foundation_complete: self.foundation_complete,
        }
    }
}
