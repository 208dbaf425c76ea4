//! Orchestrator - the public face of the scheduler.
//!
//! All mutable state lives in one `SchedulerCore` behind a single async
//! mutex. Every operation takes the lock, mutates synchronously, publishes
//! events, hands a snapshot to the background writer and re-runs assignment
//! before releasing it. Nothing is awaited while the lock is held.
//!
//! Bad reports (unknown ids, duplicate completions, reports for tasks with no
//! running attempt) are logged and ignored: a late worker must never be able
//! to corrupt the schedule.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, warn};

use crate::app::builder::OrchestratorBuilder;
use crate::app::config::SchedulerConfig;
use crate::app::events::EventBus;
use crate::app::persist::SnapshotWriter;
use crate::app::status::{SchedulerStatus, TaskCounts};
use crate::domain::{
    HeddleError, Role, SchedulerEvent, SchedulerState, Snapshot, Task, TaskId, TaskSpec,
    TaskStatus, WorkerId,
};
use crate::ports::{Clock, IdGenerator, SnapshotStore};
use crate::scheduler::{
    FoundationDetector, FoundationGate, LockGrant, LockManager, RetryDecision, RetryPolicy,
    TaskStore, WorkerPool,
};

pub struct Orchestrator {
    core: Mutex<SchedulerCore>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    id_generator: Box<dyn IdGenerator>,
}

struct SchedulerCore {
    store: TaskStore,
    pool: WorkerPool,
    locks: LockManager,
    gate: FoundationGate,
    retry: RetryPolicy,
    max_producers: usize,
    writer: Option<SnapshotWriter>,
    stopped: bool,
}

impl Orchestrator {
    /// Orchestrator with default ports for `config`.
    pub fn new(config: SchedulerConfig) -> Result<Self, HeddleError> {
        OrchestratorBuilder::new(config).build()
    }

    pub fn builder(config: SchedulerConfig) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    pub(crate) fn from_parts(
        config: SchedulerConfig,
        clock: Arc<dyn Clock>,
        id_generator: Box<dyn IdGenerator>,
        detector: Box<dyn FoundationDetector>,
        snapshot_store: Option<Arc<dyn SnapshotStore>>,
    ) -> Self {
        let mut pool = WorkerPool::new();
        for _ in 0..config.max_producers {
            pool.add(id_generator.generate_worker_id(), Role::Producer);
        }
        for _ in 0..config.verifiers {
            pool.add(id_generator.generate_worker_id(), Role::Verifier);
        }

        let core = SchedulerCore {
            store: TaskStore::new(),
            pool,
            locks: LockManager::new(config.lease_ttl()),
            gate: FoundationGate::new(config.foundation_gate, config.max_producers, detector),
            retry: RetryPolicy::new(config.max_retries),
            max_producers: config.max_producers,
            writer: snapshot_store.map(SnapshotWriter::spawn),
            stopped: false,
        };

        Self {
            core: Mutex::new(core),
            events: EventBus::new(config.event_capacity),
            clock,
            id_generator,
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    /// Register a task.
    ///
    /// Unknown dependency ids are allowed (the task simply waits for them).
    /// While a foundation task is bound and unfinished, every new task also
    /// waits for it.
    pub async fn add_task(
        &self,
        spec: TaskSpec,
        depends_on: impl IntoIterator<Item = TaskId>,
    ) -> Result<(), HeddleError> {
        let mut depends_on: BTreeSet<TaskId> = depends_on.into_iter().collect();
        let now = self.clock.now();
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        if let Some(foundation) = core.gate.pending_foundation() {
            if foundation != &spec.id {
                depends_on.insert(foundation.clone());
            }
        }

        let task = core.store.insert(spec, depends_on, now)?.clone();
        if task.status != TaskStatus::Done {
            let working = core.pool.working_count(Role::Producer);
            core.gate.maybe_bind_foundation(&task, working);
        }
        info!(task = %task.id, status = ?task.status, deps = task.depends_on.len(), "task added");
        self.events.publish(SchedulerEvent::TaskAdded { id: task.id });

        core.assign(&self.events, now);
        core.persist(now);
        Ok(())
    }

    /// Report the end of an attempt. Success finishes the task; failure
    /// spends one retry.
    pub async fn complete_task(&self, id: &TaskId, success: bool) {
        let now = self.clock.now();
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        let Some(task) = core.store.get(id) else {
            warn!(task = %id, success, "completion for unknown task ignored");
            return;
        };
        let running = matches!(task.status, TaskStatus::InProgress | TaskStatus::Testing);
        if !running || !task.is_assigned() {
            warn!(task = %id, status = ?task.status, success, "completion for task with no running attempt ignored");
            return;
        }

        core.end_attempt(id);

        if success {
            if let Some(task) = core.store.get_mut(id) {
                task.mark_done(now);
            }
            core.store.mark_completed(id.clone());
            info!(task = %id, unblocks = core.store.dependents(id).len(), "task done");
            if core.gate.complete(id) {
                self.events
                    .publish(SchedulerEvent::FoundationComplete { id: id.clone() });
            }
        } else {
            let retry = core.retry;
            if let Some(task) = core.store.get_mut(id) {
                match retry.record_failure(task, now) {
                    RetryDecision::Retry => {
                        info!(task = %id, retry_count = task.retry_count, "task failed; requeued")
                    }
                    RetryDecision::GiveUp => {
                        warn!(task = %id, retry_count = task.retry_count, "task failed permanently")
                    }
                }
            }
        }

        self.events.publish(SchedulerEvent::TaskCompleted {
            id: id.clone(),
            success,
        });
        core.assign(&self.events, now);
        core.persist(now);
    }

    /// Hand a produced task over to the verifiers.
    pub async fn move_to_testing(&self, id: &TaskId) {
        let now = self.clock.now();
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        match core.store.get(id) {
            Some(task) if task.status == TaskStatus::InProgress => {}
            Some(task) => {
                warn!(task = %id, status = ?task.status, "move to testing ignored; task is not in progress");
                return;
            }
            None => {
                warn!(task = %id, "move to testing for unknown task ignored");
                return;
            }
        }

        core.end_attempt(id);
        let Some(task) = core.store.get_mut(id) else {
            return;
        };
        task.mark_testing(now);
        let task = task.clone();
        info!(task = %id, "task ready for testing");
        self.events.publish(SchedulerEvent::ReadyForTesting { task });

        core.assign(&self.events, now);
        core.persist(now);
    }

    /// Try to lease `path` for `worker` working on `task`.
    ///
    /// Returns false on conflict (and publishes `lock:conflict`), and also
    /// when `worker` is not currently bound to `task`.
    pub async fn acquire_file_lock(&self, path: &str, worker: &WorkerId, task: &TaskId) -> bool {
        let now = self.clock.now();
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        if core.stopped {
            warn!(path, worker = %worker, "lock request after stop refused");
            return false;
        }
        if !core.pool.is_bound(worker, task) {
            warn!(path, worker = %worker, task = %task, "lock request from worker not bound to task refused");
            return false;
        }

        match core.locks.acquire(path, *worker, task, now) {
            LockGrant::Conflict { held_by } => {
                debug!(path, requested_by = %worker, held_by = %held_by, "file lock conflict");
                self.events.publish(SchedulerEvent::LockConflict {
                    path: path.to_string(),
                    requested_by: *worker,
                    held_by,
                });
                false
            }
            LockGrant::Granted | LockGrant::Renewed | LockGrant::Reclaimed { .. } => true,
        }
    }

    /// Give `path` back early. False if `worker` did not hold it.
    pub async fn release_file_lock(&self, path: &str, worker: &WorkerId) -> bool {
        self.core.lock().await.locks.release(path, *worker)
    }

    /// Rehydrate the completed set and gate state from a checkpoint.
    pub async fn restore_state(&self, state: SchedulerState) {
        let now = self.clock.now();
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        info!(
            completed = state.completed_ids.len(),
            foundation = ?state.foundation_task_id,
            foundation_complete = state.foundation_complete,
            "restoring scheduler state"
        );
        core.store.restore_completed(state.completed_ids.iter().cloned(), now);
        core.gate.restore(&state);
        core.sync_gate(&self.events);

        core.assign(&self.events, now);
        core.persist(now);
    }

    /// Rehydrate the full task list from a snapshot. Tasks that were in
    /// progress go back to the backlog; tasks in testing wait for a verifier.
    ///
    /// A snapshot with duplicate ids or a dependency cycle is rejected as a
    /// whole and nothing is changed.
    pub async fn restore_from_snapshot(&self, snapshot: Snapshot) -> Result<(), HeddleError> {
        let now = self.clock.now();
        let state = snapshot.state();
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        core.store.validate_recovered(&snapshot.tasks)?;
        core.store.restore_completed(state.completed_ids.iter().cloned(), now);
        core.gate.restore(&state);
        for task in snapshot.tasks {
            let id = core.store.insert_recovered(task, now)?.id.clone();
            self.events.publish(SchedulerEvent::TaskAdded { id });
        }
        core.sync_gate(&self.events);
        info!(tasks = core.store.len(), "restored from snapshot");

        core.assign(&self.events, now);
        core.persist(now);
        Ok(())
    }

    pub async fn get_state(&self) -> SchedulerState {
        self.core.lock().await.state()
    }

    pub async fn get_status(&self) -> SchedulerStatus {
        let core = self.core.lock().await;
        SchedulerStatus {
            workers: core.pool.iter().cloned().collect(),
            tasks: TaskCounts::tally(core.store.iter()),
            locks: core.locks.len(),
            allowed_producers: core.gate.allowed_producer_limit(),
            foundation_complete: core.gate.foundation_complete(),
        }
    }

    /// True when nothing can make further progress: every task is Done or
    /// permanently Failed, or waits on a permanently Failed task.
    pub async fn is_complete(&self) -> bool {
        self.core.lock().await.is_complete()
    }

    pub async fn allowed_producer_limit(&self) -> usize {
        self.core.lock().await.gate.allowed_producer_limit()
    }

    pub async fn task(&self, id: &TaskId) -> Option<Task> {
        self.core.lock().await.store.get(id).cloned()
    }

    pub async fn tasks(&self) -> Vec<Task> {
        self.core.lock().await.store.iter().cloned().collect()
    }

    /// Grow the pool by one worker. A new producer also raises the
    /// post-foundation limit if the pool now exceeds it.
    pub async fn add_worker(&self, role: Role) -> WorkerId {
        let now = self.clock.now();
        let id = self.id_generator.generate_worker_id();
        let mut guard = self.core.lock().await;
        let core = &mut *guard;

        core.pool.add(id, role);
        if role == Role::Producer {
            let producers = core.pool.count(Role::Producer);
            if producers > core.max_producers {
                core.max_producers = producers;
                core.gate.set_max_producers(producers);
            }
        }
        info!(worker = %id, %role, "worker added");

        core.assign(&self.events, now);
        core.persist(now);
        id
    }

    /// Release every lock, retire every worker, publish `stopped` and flush
    /// the last snapshot. Running work is not interrupted; later reports are
    /// still recorded but nothing new is assigned.
    pub async fn stop(&self) {
        let now = self.clock.now();
        let writer = {
            let mut guard = self.core.lock().await;
            let core = &mut *guard;
            if core.stopped {
                debug!("stop called twice");
                return;
            }
            core.stopped = true;
            let released = core.locks.release_everything();
            core.pool.retire_all();
            info!(released_locks = released, "scheduler stopped");
            self.events.publish(SchedulerEvent::Stopped);
            core.persist(now);
            core.writer.take()
        };
        if let Some(writer) = writer {
            writer.shutdown().await;
        }
    }
}

impl SchedulerCore {
    /// Bind eligible tasks to idle workers until one side runs out.
    fn assign(&mut self, events: &EventBus, now: DateTime<Utc>) -> usize {
        if self.stopped {
            return 0;
        }
        let max_retries = self.retry.max_retries;
        let mut assigned = 0;

        while let Some(worker) = self.pool.idle(Role::Producer) {
            if self.pool.working_count(Role::Producer) >= self.gate.allowed_producer_limit() {
                break;
            }
            let Some(task) = self.store.next_eligible(Role::Producer, max_retries) else {
                break;
            };
            let id = task.id.clone();
            self.bind(&id, worker, Role::Producer, events, now);
            assigned += 1;
        }

        while let Some(worker) = self.pool.idle(Role::Verifier) {
            let Some(task) = self.store.next_eligible(Role::Verifier, max_retries) else {
                break;
            };
            let id = task.id.clone();
            self.bind(&id, worker, Role::Verifier, events, now);
            assigned += 1;
        }

        assigned
    }

    fn bind(
        &mut self,
        id: &TaskId,
        worker: WorkerId,
        role: Role,
        events: &EventBus,
        now: DateTime<Utc>,
    ) {
        let Some(task) = self.store.get_mut(id) else {
            return;
        };
        task.bind(worker, role, now);
        let task = task.clone();
        self.pool.start(&worker, id.clone());
        info!(task = %id, worker = %worker, %role, "task assigned");
        events.publish(SchedulerEvent::TaskAssigned { task, worker });
    }

    /// Free the worker holding `id` and drop its locks.
    fn end_attempt(&mut self, id: &TaskId) {
        if let Some(worker) = self.store.get(id).and_then(|t| t.assigned_worker) {
            self.pool.release(&worker);
        }
        let released = self.locks.release_all(id);
        if released > 0 {
            debug!(task = %id, released, "file locks released");
        }
    }

    /// Unlock the gate if its task is already in the completed set.
    fn sync_gate(&mut self, events: &EventBus) {
        let Some(foundation) = self.gate.foundation_task_id().cloned() else {
            return;
        };
        if self.store.completed().contains(&foundation) && self.gate.complete(&foundation) {
            events.publish(SchedulerEvent::FoundationComplete { id: foundation });
        }
    }

    /// Done, or failed with no retries left.
    fn is_settled(&self, task: &Task) -> bool {
        task.status == TaskStatus::Done || self.retry.is_exhausted(task)
    }

    fn is_complete(&self) -> bool {
        let mut doomed: HashSet<&TaskId> = self
            .store
            .iter()
            .filter(|t| self.retry.is_exhausted(t))
            .map(|t| &t.id)
            .collect();

        // Anything waiting on a doomed task is doomed too.
        loop {
            let before = doomed.len();
            for task in self.store.iter() {
                if !self.is_settled(task)
                    && !task.is_assigned()
                    && task.depends_on.iter().any(|d| doomed.contains(d))
                {
                    doomed.insert(&task.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }

        self.store
            .iter()
            .all(|t| self.is_settled(t) || doomed.contains(&t.id))
    }

    fn state(&self) -> SchedulerState {
        SchedulerState {
            completed_ids: self.store.completed().clone(),
            foundation_task_id: self.gate.foundation_task_id().cloned(),
            foundation_complete: self.gate.foundation_complete(),
        }
    }

    fn persist(&self, now: DateTime<Utc>) {
        let Some(writer) = &self.writer else {
            return;
        };
        writer.submit(Snapshot {
            tasks: self.store.iter().cloned().collect(),
            last_updated: now,
            foundation_task_id: self.gate.foundation_task_id().cloned(),
            foundation_complete: self.gate.foundation_complete(),
        });
    }
}
