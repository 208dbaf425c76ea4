//! Worker pool: the logical worker slots and their bindings.

use crate::domain::{Role, TaskId, Worker, WorkerId};

#[derive(Debug, Default)]
pub struct WorkerPool {
    workers: Vec<Worker>,
}

impl WorkerPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: WorkerId, role: Role) {
        self.workers.push(Worker::new(id, role));
    }

    pub fn get(&self, id: &WorkerId) -> Option<&Worker> {
        self.workers.iter().find(|w| &w.id == id)
    }

    pub fn get_mut(&mut self, id: &WorkerId) -> Option<&mut Worker> {
        self.workers.iter_mut().find(|w| &w.id == id)
    }

    /// First idle worker of `role`, in creation order.
    pub fn idle(&self, role: Role) -> Option<WorkerId> {
        self.workers
            .iter()
            .find(|w| w.role == role && w.is_idle())
            .map(|w| w.id)
    }

    pub fn working_count(&self, role: Role) -> usize {
        self.workers
            .iter()
            .filter(|w| w.role == role && w.is_working())
            .count()
    }

    pub fn count(&self, role: Role) -> usize {
        self.workers.iter().filter(|w| w.role == role).count()
    }

    /// Whether `worker` is currently bound to `task`.
    pub fn is_bound(&self, worker: &WorkerId, task: &TaskId) -> bool {
        self.get(worker)
            .is_some_and(|w| w.is_working() && w.current_task.as_ref() == Some(task))
    }

    pub fn start(&mut self, worker: &WorkerId, task: TaskId) {
        if let Some(w) = self.get_mut(worker) {
            w.start(task);
        }
    }

    pub fn release(&mut self, worker: &WorkerId) {
        if let Some(w) = self.get_mut(worker) {
            w.release();
        }
    }

    pub fn retire_all(&mut self) {
        for w in &mut self.workers {
            w.retire();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkerStatus;
    use ulid::Ulid;

    fn pool(producers: usize, verifiers: usize) -> WorkerPool {
        let mut pool = WorkerPool::new();
        for _ in 0..producers {
            pool.add(WorkerId::from_ulid(Ulid::new()), Role::Producer);
        }
        for _ in 0..verifiers {
            pool.add(WorkerId::from_ulid(Ulid::new()), Role::Verifier);
        }
        pool
    }

    #[test]
    fn idle_workers_are_handed_out_by_role() {
        let mut pool = pool(2, 1);
        let p1 = pool.idle(Role::Producer).unwrap();
        pool.start(&p1, TaskId::new("A"));

        let p2 = pool.idle(Role::Producer).unwrap();
        assert_ne!(p1, p2);
        pool.start(&p2, TaskId::new("B"));

        assert!(pool.idle(Role::Producer).is_none());
        assert!(pool.idle(Role::Verifier).is_some());
        assert_eq!(pool.working_count(Role::Producer), 2);
        assert!(pool.is_bound(&p1, &TaskId::new("A")));
        assert!(!pool.is_bound(&p1, &TaskId::new("B")));
    }

    #[test]
    fn retired_workers_stay_retired() {
        let mut pool = pool(1, 1);
        let p = pool.idle(Role::Producer).unwrap();
        pool.start(&p, TaskId::new("A"));
        pool.retire_all();
        pool.release(&p);

        assert!(pool.iter().all(|w| w.status == WorkerStatus::Done));
        assert!(pool.idle(Role::Producer).is_none());
    }
}
