use serde::{Deserialize, Serialize};

use super::ids::{TaskId, WorkerId};
use super::task::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Working,
    /// Retired by `stop()`; never assigned again.
    Done,
}

/// A schedulable execution slot. The scheduler only tracks its logical state;
/// the actual work runs elsewhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    pub id: WorkerId,
    pub role: Role,
    pub status: WorkerStatus,
    pub current_task: Option<TaskId>,
}

impl Worker {
    pub fn new(id: WorkerId, role: Role) -> Self {
        Self {
            id,
            role,
            status: WorkerStatus::Idle,
            current_task: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Idle
    }

    pub fn is_working(&self) -> bool {
        self.status == WorkerStatus::Working
    }

    pub fn start(&mut self, task: TaskId) {
        self.status = WorkerStatus::Working;
        self.current_task = Some(task);
    }

    /// Back to idle unless retired.
    pub fn release(&mut self) {
        if self.status != WorkerStatus::Done {
            self.status = WorkerStatus::Idle;
        }
        self.current_task = None;
    }

    pub fn retire(&mut self) {
        self.status = WorkerStatus::Done;
        self.current_task = None;
    }
}
