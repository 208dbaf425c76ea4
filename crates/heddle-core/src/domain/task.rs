//! Task model: the unit of schedulable work.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{TaskId, WorkerId};

/// Task status.
///
/// State transitions:
/// - Backlog -> InProgress -> Testing -> Done
/// - InProgress | Testing -> Backlog (failed, retries left)
/// - InProgress | Testing -> Failed (failed, retries exhausted)
///
/// Done has no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a producer.
    Backlog,

    /// Held by a producer.
    InProgress,

    /// Produced; waiting for or held by a verifier.
    Testing,

    /// Finished successfully.
    Done,

    /// Failed. Terminal once the retry budget is spent.
    Failed,
}

impl TaskStatus {
    /// Which worker role consumes a task in this status.
    pub fn role(self) -> Role {
        match self {
            TaskStatus::Testing => Role::Verifier,
            TaskStatus::Backlog
            | TaskStatus::InProgress
            | TaskStatus::Done
            | TaskStatus::Failed => Role::Producer,
        }
    }
}

/// Worker role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Writes files.
    Producer,
    /// Checks what a producer wrote.
    Verifier,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Producer => f.write_str("producer"),
            Role::Verifier => f.write_str("verifier"),
        }
    }
}

/// Assignment priority. Declared highest first, so `Ord` sorts Critical before Low.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

/// What a caller submits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: TaskId,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    /// Explicitly marks the bootstrap task (see `FlagDetector`).
    #[serde(default)]
    pub foundation: bool,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            priority: Priority::default(),
            foundation: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn as_foundation(mut self) -> Self {
        self.foundation = true;
        self
    }
}

/// A task as tracked by the scheduler.
///
/// This is the single source of truth for task state; workers and locks only
/// refer to it by id. All transitions go through the methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub depends_on: BTreeSet<TaskId>,
    pub retry_count: u32,
    pub assigned_worker: Option<WorkerId>,
    #[serde(default)]
    pub foundation: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(spec: TaskSpec, depends_on: BTreeSet<TaskId>, now: DateTime<Utc>) -> Self {
        Self {
            id: spec.id,
            title: spec.title,
            description: spec.description,
            status: TaskStatus::Backlog,
            priority: spec.priority,
            depends_on,
            retry_count: 0,
            assigned_worker: None,
            foundation: spec.foundation,
            created_at: now,
            updated_at: now,
        }
    }

    /// Role expected to consume the task in its current status.
    pub fn role(&self) -> Role {
        self.status.role()
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_worker.is_some()
    }

    /// Whether a worker of `role` may pick this task up (ignoring dependencies).
    pub fn consumable_by(&self, role: Role, max_retries: u32) -> bool {
        if self.is_assigned() {
            return false;
        }
        match role {
            Role::Producer => match self.status {
                TaskStatus::Backlog => true,
                TaskStatus::Failed => self.retry_count < max_retries,
                _ => false,
            },
            Role::Verifier => self.status == TaskStatus::Testing,
        }
    }

    /// Bind to a worker. Producers move the task to InProgress; verifiers
    /// leave it in Testing.
    pub fn bind(&mut self, worker: WorkerId, role: Role, now: DateTime<Utc>) {
        if role == Role::Producer {
            self.status = TaskStatus::InProgress;
        }
        self.assigned_worker = Some(worker);
        self.updated_at = now;
    }

    pub fn mark_testing(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Testing;
        self.assigned_worker = None;
        self.updated_at = now;
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Done;
        self.assigned_worker = None;
        self.updated_at = now;
    }

    /// Back to the backlog after a failed attempt with retries left.
    pub fn requeue(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Backlog;
        self.assigned_worker = None;
        self.updated_at = now;
    }

    /// Permanently failed.
    pub fn mark_failed(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Failed;
        self.assigned_worker = None;
        self.updated_at = now;
    }

    /// Drop a stale binding (the worker that held it no longer exists).
    pub fn unbind_for_recovery(&mut self, now: DateTime<Utc>) {
        if self.status == TaskStatus::InProgress {
            self.status = TaskStatus::Backlog;
        }
        self.assigned_worker = None;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use ulid::Ulid;

    fn task() -> Task {
        Task::new(TaskSpec::new("US-002", "page"), BTreeSet::new(), Utc::now())
    }

    #[test]
    fn priority_orders_critical_first() {
        let mut ps = vec![Priority::Low, Priority::Critical, Priority::Medium, Priority::High];
        ps.sort();
        assert_eq!(
            ps,
            vec![Priority::Critical, Priority::High, Priority::Medium, Priority::Low]
        );
    }

    #[rstest]
    #[case::backlog(TaskStatus::Backlog, Role::Producer)]
    #[case::in_progress(TaskStatus::InProgress, Role::Producer)]
    #[case::failed(TaskStatus::Failed, Role::Producer)]
    #[case::testing(TaskStatus::Testing, Role::Verifier)]
    fn status_maps_to_role(#[case] status: TaskStatus, #[case] role: Role) {
        assert_eq!(status.role(), role);
    }

    #[test]
    fn producer_bind_moves_to_in_progress() {
        let mut t = task();
        let w = WorkerId::from_ulid(Ulid::new());
        t.bind(w, Role::Producer, Utc::now());
        assert_eq!(t.status, TaskStatus::InProgress);
        assert_eq!(t.assigned_worker, Some(w));
        assert!(!t.consumable_by(Role::Producer, 3));
    }

    #[test]
    fn verifier_bind_keeps_testing() {
        let mut t = task();
        t.mark_testing(Utc::now());
        t.bind(WorkerId::from_ulid(Ulid::new()), Role::Verifier, Utc::now());
        assert_eq!(t.status, TaskStatus::Testing);
        assert_eq!(t.role(), Role::Verifier);
    }

    #[test]
    fn requeue_and_fail_release_the_worker() {
        let mut t = task();
        t.bind(WorkerId::from_ulid(Ulid::new()), Role::Producer, Utc::now());
        t.requeue(Utc::now());
        assert_eq!(t.status, TaskStatus::Backlog);
        assert!(!t.is_assigned());

        t.retry_count = 3;
        t.mark_failed(Utc::now());
        assert!(!t.is_assigned());
        assert!(!t.consumable_by(Role::Producer, 3));
    }

    #[test]
    fn failed_with_budget_left_is_still_consumable() {
        let mut t = task();
        t.status = TaskStatus::Failed;
        t.retry_count = 1;
        assert!(t.consumable_by(Role::Producer, 3));
        assert!(!t.consumable_by(Role::Producer, 1));
    }

    #[test]
    fn task_serializes_camel_case() {
        let v = serde_json::to_value(task()).unwrap();
        assert_eq!(v["status"], "backlog");
        assert_eq!(v["retryCount"], 0);
        assert!(v.get("dependsOn").is_some());
        assert!(v["assignedWorker"].is_null());
    }
}
