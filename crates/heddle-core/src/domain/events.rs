//! Scheduler events published on the event bus.
//!
//! Names mirror the wire names used by observers (`task:assigned`, ...), so a
//! serialized event can be forwarded as-is to an SSE stream or a log.

use serde::{Deserialize, Serialize};

use super::ids::{TaskId, WorkerId};
use super::task::Task;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum SchedulerEvent {
    #[serde(rename = "task:added")]
    TaskAdded { id: TaskId },

    /// Carries the whole task so the executor does not have to query back.
    #[serde(rename = "task:assigned")]
    TaskAssigned { task: Task, worker: WorkerId },

    #[serde(rename = "task:completed")]
    TaskCompleted { id: TaskId, success: bool },

    #[serde(rename = "task:readyForTesting")]
    ReadyForTesting { task: Task },

    #[serde(rename = "foundation:complete")]
    FoundationComplete { id: TaskId },

    #[serde(rename = "lock:conflict")]
    LockConflict {
        path: String,
        requested_by: WorkerId,
        held_by: WorkerId,
    },

    #[serde(rename = "stopped")]
    Stopped,
}

impl SchedulerEvent {
    /// Wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            SchedulerEvent::TaskAdded { .. } => "task:added",
            SchedulerEvent::TaskAssigned { .. } => "task:assigned",
            SchedulerEvent::TaskCompleted { .. } => "task:completed",
            SchedulerEvent::ReadyForTesting { .. } => "task:readyForTesting",
            SchedulerEvent::FoundationComplete { .. } => "foundation:complete",
            SchedulerEvent::LockConflict { .. } => "lock:conflict",
            SchedulerEvent::Stopped => "stopped",
        }
    }
}
