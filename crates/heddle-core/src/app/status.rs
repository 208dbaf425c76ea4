//! Status view returned by `Orchestrator::get_status`.

use serde::{Deserialize, Serialize};

use crate::domain::{Role, Task, TaskStatus, Worker, WorkerStatus};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCounts {
    pub total: usize,
    pub backlog: usize,
    pub in_progress: usize,
    pub testing: usize,
    pub done: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn tally<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            counts.total += 1;
            match task.status {
                TaskStatus::Backlog => counts.backlog += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Testing => counts.testing += 1,
                TaskStatus::Done => counts.done += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub workers: Vec<Worker>,
    pub tasks: TaskCounts,
    pub locks: usize,
    pub allowed_producers: usize,
    pub foundation_complete: bool,
}

impl SchedulerStatus {
    pub fn working(&self, role: Role) -> usize {
        self.workers
            .iter()
            .filter(|w| w.role == role && w.status == WorkerStatus::Working)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskSpec;
    use chrono::Utc;
    use std::collections::BTreeSet;

    #[test]
    fn tally_counts_each_status() {
        let mut tasks: Vec<Task> = ["A", "B", "C", "D"]
            .iter()
            .map(|id| Task::new(TaskSpec::new(*id, *id), BTreeSet::new(), Utc::now()))
            .collect();
        tasks[0].mark_done(Utc::now());
        tasks[1].mark_testing(Utc::now());
        tasks[2].mark_failed(Utc::now());

        let counts = TaskCounts::tally(&tasks);
        assert_eq!(
            counts,
            TaskCounts {
                total: 4,
                backlog: 1,
                in_progress: 0,
                testing: 1,
                done: 1,
                failed: 1,
            }
        );
    }
}
