//! Task store: every task the scheduler knows about, in insertion order.
//!
//! Tasks are never deleted. Lookups go through an id index; selection scans
//! in insertion order so ties on priority are broken by arrival.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use super::dependency::{self, DependencyGraph};
use crate::domain::{HeddleError, Role, Task, TaskId, TaskSpec, TaskStatus};

#[derive(Debug, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    completed: BTreeSet<TaskId>,
    graph: DependencyGraph,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new task in Backlog, or straight in Done when its id was
    /// already completed in a previous run.
    pub fn insert(
        &mut self,
        spec: TaskSpec,
        depends_on: BTreeSet<TaskId>,
        now: DateTime<Utc>,
    ) -> Result<&Task, HeddleError> {
        self.check_new(&spec.id, &depends_on)?;
        let mut task = Task::new(spec, depends_on, now);
        if self.completed.contains(&task.id) {
            task.mark_done(now);
        }
        Ok(self.push(task))
    }

    /// Re-register a task recovered from a snapshot.
    ///
    /// Bindings are dropped because the workers that held them are gone.
    pub fn insert_recovered(
        &mut self,
        mut task: Task,
        now: DateTime<Utc>,
    ) -> Result<&Task, HeddleError> {
        self.check_new(&task.id, &task.depends_on)?;
        if task.is_assigned() || task.status == TaskStatus::InProgress {
            task.unbind_for_recovery(now);
        }
        if task.status == TaskStatus::Done {
            self.completed.insert(task.id.clone());
        } else if self.completed.contains(&task.id) {
            task.mark_done(now);
        }
        Ok(self.push(task))
    }

    /// Check that every task in `tasks` could be recovered in order, without
    /// touching the store.
    pub fn validate_recovered(&self, tasks: &[Task]) -> Result<(), HeddleError> {
        let mut seen = HashSet::new();
        let mut graph = self.graph.clone();
        for task in tasks {
            if self.index.contains_key(&task.id) || !seen.insert(&task.id) {
                return Err(HeddleError::DuplicateTask(task.id.clone()));
            }
            check_edges(&graph, &task.id, &task.depends_on)?;
            for dep in &task.depends_on {
                graph.add_dependency(task.id.clone(), dep.clone());
            }
        }
        Ok(())
    }

    fn check_new(&self, id: &TaskId, depends_on: &BTreeSet<TaskId>) -> Result<(), HeddleError> {
        if self.index.contains_key(id) {
            return Err(HeddleError::DuplicateTask(id.clone()));
        }
        check_edges(&self.graph, id, depends_on)
    }

    fn push(&mut self, task: Task) -> &Task {
        for dep in &task.depends_on {
            self.graph.add_dependency(task.id.clone(), dep.clone());
        }
        let pos = self.tasks.len();
        self.index.insert(task.id.clone(), pos);
        self.tasks.push(task);
        &self.tasks[pos]
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn get_mut(&mut self, id: &TaskId) -> Option<&mut Task> {
        self.index.get(id).map(|&i| &mut self.tasks[i])
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn completed(&self) -> &BTreeSet<TaskId> {
        &self.completed
    }

    pub fn mark_completed(&mut self, id: TaskId) {
        self.completed.insert(id);
    }

    /// Merge a completed-id set from a checkpoint. Known tasks that are not
    /// currently held by a worker are moved to Done.
    pub fn restore_completed(&mut self, ids: impl IntoIterator<Item = TaskId>, now: DateTime<Utc>) {
        for id in ids {
            if let Some(task) = self.get_mut(&id) {
                if !task.is_assigned() {
                    task.mark_done(now);
                }
            }
            self.completed.insert(id);
        }
    }

    /// Tasks that list `id` as a dependency.
    pub fn dependents(&self, id: &TaskId) -> Vec<TaskId> {
        self.graph.dependents(id)
    }

    pub fn is_eligible(&self, task: &Task) -> bool {
        dependency::is_eligible(task, &self.completed)
    }

    /// Highest-priority unassigned task that `role` may pick up and whose
    /// dependencies are all complete. Ties go to the earliest inserted.
    pub fn next_eligible(&self, role: Role, max_retries: u32) -> Option<&Task> {
        self.tasks
            .iter()
            .filter(|t| t.consumable_by(role, max_retries) && self.is_eligible(t))
            .min_by_key(|t| t.priority)
    }
}

fn check_edges(
    graph: &DependencyGraph,
    id: &TaskId,
    depends_on: &BTreeSet<TaskId>,
) -> Result<(), HeddleError> {
    if depends_on.contains(id) {
        return Err(HeddleError::SelfDependency(id.clone()));
    }
    if let Some(cycle) = graph.would_create_cycle(id, depends_on) {
        return Err(HeddleError::DependencyCycle(cycle));
    }
    Ok(())
}
