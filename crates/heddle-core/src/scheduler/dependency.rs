//! Dependency graph and eligibility.
//!
//! Design:
//! - Forward edges: task -> tasks it depends on (waits for)
//! - Reverse edges: task -> tasks that depend on it (waiting tasks)
//! - Invariant: edges and reverse_edges are kept in sync
//! - Invariant: the graph is acyclic; `would_create_cycle` is checked before
//!   any insert

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::domain::{Task, TaskId};

/// True iff every dependency of `task` is in `completed`.
pub fn is_eligible(task: &Task, completed: &BTreeSet<TaskId>) -> bool {
    task.depends_on.iter().all(|dep| completed.contains(dep))
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// task -> tasks it waits for
    edges: HashMap<TaskId, HashSet<TaskId>>,

    /// task -> tasks waiting for it
    reverse_edges: HashMap<TaskId, HashSet<TaskId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// `task` waits for `depends_on`.
    pub fn add_dependency(&mut self, task: TaskId, depends_on: TaskId) {
        self.reverse_edges
            .entry(depends_on.clone())
            .or_default()
            .insert(task.clone());
        self.edges.entry(task).or_default().insert(depends_on);
    }

    /// Tasks that list `task` as a dependency.
    pub fn dependents(&self, task: &TaskId) -> Vec<TaskId> {
        self.reverse_edges
            .get(task)
            .map(|waiting| waiting.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Would making `task` wait for each of `deps` close a loop?
    ///
    /// Returns the offending path, starting and ending at `task`.
    pub fn would_create_cycle<'a>(
        &self,
        task: &TaskId,
        deps: impl IntoIterator<Item = &'a TaskId>,
    ) -> Option<Vec<TaskId>> {
        for dep in deps {
            if dep == task {
                return Some(vec![task.clone(), task.clone()]);
            }
            if let Some(mut path) = self.path_between(dep, task) {
                path.insert(0, task.clone());
                return Some(path);
            }
        }
        None
    }

    /// Forward path `from -> ... -> to`, if one exists.
    fn path_between(&self, from: &TaskId, to: &TaskId) -> Option<Vec<TaskId>> {
        let mut visited = HashSet::new();
        let mut prev: HashMap<TaskId, TaskId> = HashMap::new();
        let mut stack = vec![from.clone()];
        visited.insert(from.clone());

        while let Some(node) = stack.pop() {
            if &node == to {
                let mut path = vec![node.clone()];
                let mut current = node;
                while let Some(p) = prev.get(&current) {
                    path.push(p.clone());
                    current = p.clone();
                }
                path.reverse();
                return Some(path);
            }
            for dep in self.edges.get(&node).into_iter().flatten() {
                if visited.insert(dep.clone()) {
                    prev.insert(dep.clone(), node.clone());
                    stack.push(dep.clone());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TaskSpec;
    use chrono::Utc;

    fn id(s: &str) -> TaskId {
        TaskId::new(s)
    }

    #[test]
    fn add_dependency_creates_both_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(id("B"), id("A")); // B waits for A

        assert_eq!(graph.dependents(&id("A")), vec![id("B")]);
        assert!(graph.dependents(&id("B")).is_empty());
        // The forward edge is what a cycle check walks.
        assert!(graph.would_create_cycle(&id("A"), [&id("B")]).is_some());
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let graph = DependencyGraph::new();
        let cycle = graph.would_create_cycle(&id("A"), [&id("A")]);
        assert_eq!(cycle, Some(vec![id("A"), id("A")]));
    }

    #[test]
    fn closing_a_loop_reports_the_path() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(id("B"), id("A"));
        graph.add_dependency(id("C"), id("B"));

        // A waiting for C closes A <- B <- C <- A.
        let cycle = graph.would_create_cycle(&id("A"), [&id("C")]).unwrap();
        assert_eq!(cycle, vec![id("A"), id("C"), id("B"), id("A")]);
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        let mut graph = DependencyGraph::new();
        graph.add_dependency(id("B"), id("A"));
        graph.add_dependency(id("C"), id("A"));
        graph.add_dependency(id("D"), id("B"));

        assert!(graph.would_create_cycle(&id("D"), [&id("C")]).is_none());
        graph.add_dependency(id("D"), id("C"));
        assert!(graph.would_create_cycle(&id("E"), [&id("D")]).is_none());
    }

    #[test]
    fn eligibility_needs_every_dependency_done() {
        let task = Task::new(
            TaskSpec::new("C", "c"),
            [id("A"), id("B")].into_iter().collect(),
            Utc::now(),
        );
        let mut completed = BTreeSet::new();
        assert!(!is_eligible(&task, &completed));
        completed.insert(id("A"));
        assert!(!is_eligible(&task, &completed));
        completed.insert(id("B"));
        assert!(is_eligible(&task, &completed));
    }
}
